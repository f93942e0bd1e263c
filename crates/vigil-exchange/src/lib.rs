//! Exchange client capability consumed by the execution core.
//!
//! The exchange itself is a black box: all calls are synchronous RPCs to a
//! remote venue. This crate defines the trait surface the core programs
//! against, the wire structs those calls return, and a typed error taxonomy
//! that distinguishes idempotent conflicts from genuine failures.
//!
//! `MockExchangeClient` (mockall) is exported for tests in the consuming
//! crates.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ExchangeClient, MockExchangeClient};
pub use error::{ExchangeError, Result};
pub use types::{
    AccountBalance, AlgoKind, AlgoOrder, AlgoOrderRequest, ExchangePosition, InstrumentSpec,
    MarginMode, OpenOrder, OrderState, OrderStatus, PlacedOrder, TradeFill,
};
