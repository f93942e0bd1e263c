//! Monitor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("exchange error: {0}")]
    Exchange(#[from] vigil_exchange::ExchangeError),

    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error("executor error: {0}")]
    Executor(#[from] vigil_executor::ExecutorError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
