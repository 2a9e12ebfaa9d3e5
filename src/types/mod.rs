//! Shared data structures for the telemetry uplink
//!
//! - `Event`: one immutable unit of telemetry produced by the client
//! - `Batch`: a sealed, ordered group of events delivered as a single unit

mod event;
mod batch;

pub use event::*;
pub use batch::*;
