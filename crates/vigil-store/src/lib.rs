//! Durable store capability for signals and positions.
//!
//! Persistence technology is out of scope for the core; this crate defines
//! the query shapes the core needs and ships `MemoryStore`, an in-process
//! implementation used by the binary and by tests.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use store::Store;
