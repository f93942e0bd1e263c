//! Store error types.

use thiserror::Error;
use vigil_core::SignalId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("signal not found: {0}")]
    SignalNotFound(SignalId),

    #[error("position not found: {0}")]
    PositionNotFound(uuid::Uuid),

    #[error("signal {0} already terminal, refusing status change")]
    TerminalStatus(SignalId),

    #[error("open position already exists for {0}")]
    DuplicateOpenPosition(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
