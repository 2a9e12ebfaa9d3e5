//! Batching Pipeline
//!
//! ```text
//! process(event) ──► BatchAccumulator ──seal──► BatchSink::submit(batch)
//!                                                  │
//!                              UploadDispatcher ◄──┘  (one task per batch)
//!                                     │
//!                              UploadCoordinator::deliver
//! ```

mod accumulator;
mod dispatcher;

pub use accumulator::BatchAccumulator;
pub use dispatcher::{DispatchRecord, DispatchSnapshot, DispatchStats, UploadDispatcher};

use crate::types::Batch;

/// Receives sealed batches from the accumulator.
///
/// `submit` is called while the accumulator's buffer lock is held, so it
/// must hand the batch off without blocking.
pub trait BatchSink: Send + Sync {
    fn submit(&self, batch: Batch);
}
