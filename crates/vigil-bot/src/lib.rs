//! Application wiring for the vigil execution core.
//!
//! Assembles the queue, risk gate, executor, monitor, reconciler, and
//! telemetry into one process, backed by an in-process paper exchange.

pub mod app;
pub mod config;
pub mod error;
pub mod paper;
pub mod pipeline;

pub use app::Application;
pub use config::{AppConfig, PaperConfig};
pub use error::{AppError, AppResult};
pub use paper::PaperExchange;
pub use pipeline::ExecutionPipeline;
