//! Application-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] vigil_telemetry::TelemetryError),

    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error("exchange error: {0}")]
    Exchange(#[from] vigil_exchange::ExchangeError),
}

pub type AppResult<T> = Result<T, AppError>;
