//! Delivery: getting a sealed batch to the collector
//!
//! ## Architecture
//!
//! - **BackoffPolicy**: `min(base * 2^n, cap)` delay between retries
//! - **ChannelUploader**: bounded retry loop over one `Transport`
//! - **ApiTransport**: primary channel, HTTP POST to the collector API
//! - **ObjectStoreTransport**: secondary channel, object write to a bucket
//! - **UploadCoordinator**: primary → secondary → local fallback store
//!
//! Transport and response failures are absorbed by the retry loop. Only
//! channel exhaustion and the terminal persistence failure leave this
//! module.

pub mod api;
pub mod backoff;
pub mod channel;
pub mod coordinator;
pub mod error;
pub mod object_store;

pub use api::ApiTransport;
pub use backoff::{BackoffPolicy, Sleeper, TokioSleeper};
pub use channel::{ChannelReceipt, ChannelUploader, RetryPolicy, Transport};
pub use coordinator::{UploadCoordinator, UploadReport};
pub use error::{
    AttemptError, ChannelError, ChannelKind, CombinedChannelFailure, DeliveryOutcome, UploadError,
};
pub use object_store::ObjectStoreTransport;
