//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),
}

pub type Result<T> = std::result::Result<T, QueueError>;
