//! Reconciler error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("exchange error: {0}")]
    Exchange(#[from] vigil_exchange::ExchangeError),

    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
