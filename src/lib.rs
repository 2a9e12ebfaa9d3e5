//! Telemetry Uplink: batched telemetry delivery
//!
//! Collects client telemetry events into batches and delivers each batch to
//! a remote collector without ever dropping it silently.
//!
//! ## Architecture
//!
//! - **BatchAccumulator**: thread-safe buffer, seals a batch at the size threshold or on flush
//! - **UploadDispatcher**: one async delivery task per sealed batch
//! - **UploadCoordinator**: primary API channel → secondary object-store channel → local file
//! - **ChannelUploader**: bounded retry with exponential backoff over one transport
//! - **LocalFallbackStore**: atomic on-disk copy when both channels are exhausted

pub mod config;
pub mod delivery;
pub mod pipeline;
pub mod storage;
pub mod testing;
pub mod types;
pub mod uplink;

// Re-export configuration
pub use config::UplinkConfig;

// Re-export commonly used types
pub use types::{Batch, BatchCodecError, Event};

// Re-export delivery components
pub use delivery::{
    AttemptError, BackoffPolicy, ChannelError, ChannelKind, ChannelUploader,
    CombinedChannelFailure, RetryPolicy, Transport, UploadCoordinator, UploadError, UploadReport,
};

// Re-export pipeline components
pub use pipeline::{BatchAccumulator, BatchSink, DispatchSnapshot, UploadDispatcher};

// Re-export storage
pub use storage::{LocalFallbackStore, StoreError};

pub use uplink::{Uplink, UplinkError};
