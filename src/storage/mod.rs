//! Local durable storage for batches no channel would accept

pub mod fallback;

pub use fallback::{LocalFallbackStore, StoreError};
