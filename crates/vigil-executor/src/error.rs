//! Executor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("exchange error: {0}")]
    Exchange(#[from] vigil_exchange::ExchangeError),

    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error("core error: {0}")]
    Core(#[from] vigil_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
