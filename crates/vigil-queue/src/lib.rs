//! Signal admission queue.
//!
//! A bounded FIFO buffer between signal producers and the risk gate +
//! order executor. Guarantees:
//! - submissions are accepted only while trading is RUNNING
//! - same-symbol, same-side repeats inside the dedup window are dropped
//! - at capacity, the oldest entry is evicted for the newest (drop-oldest)
//! - a single worker dequeues strictly FIFO, one signal at a time, with a
//!   minimum inter-processing delay while the queue is non-empty
//!
//! A malformed signal (invalid price fields) is fatal for that signal
//! only; it is logged, marked FAILED, and never blocks the queue.

pub mod error;
pub mod queue;
pub mod worker;

pub use error::{QueueError, Result};
pub use queue::{QueueConfig, SignalQueue, SubmitOutcome};
pub use worker::SignalProcessor;
