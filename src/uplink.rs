//! Uplink: wires configuration into a running batching pipeline
//!
//! One explicit instance per client, built from an [`UplinkConfig`]. Tests
//! and embedders that need fake channels build the pieces themselves with
//! [`Uplink::from_parts`].

use crate::config::{ConfigError, UplinkConfig};
use crate::delivery::{
    ApiTransport, ChannelUploader, ObjectStoreTransport, RetryPolicy, UploadCoordinator,
};
use crate::pipeline::{BatchAccumulator, BatchSink, DispatchSnapshot, UploadDispatcher};
use crate::storage::{LocalFallbackStore, StoreError};
use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Errors raised while building an uplink
#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to open fallback store: {0}")]
    Store(#[from] StoreError),
    #[error("no tokio runtime is running; build the uplink from inside one")]
    NoRuntime,
}

pub struct Uplink {
    accumulator: BatchAccumulator,
    dispatcher: Arc<UploadDispatcher>,
}

impl Uplink {
    /// Validate `config` and build the full pipeline. Fails with
    /// [`UplinkError::NoRuntime`] outside a tokio runtime.
    pub fn from_config(config: &UplinkConfig) -> Result<Self, UplinkError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| UplinkError::NoRuntime)?;

        let api = ApiTransport::new(&config.api)?;
        let api_endpoint = api.endpoint().to_string();
        let primary = ChannelUploader::new(
            Arc::new(api),
            RetryPolicy::from_config(&config.retry, Duration::from_secs(config.api.timeout_secs)),
        );
        let secondary = ChannelUploader::new(
            Arc::new(ObjectStoreTransport::new(&config.storage)?),
            RetryPolicy::from_config(
                &config.retry,
                Duration::from_secs(config.storage.timeout_secs),
            ),
        );
        let store = LocalFallbackStore::open(&config.fallback.dir)?;

        info!(
            api = %api_endpoint,
            bucket = %config.storage.bucket,
            threshold = config.batching.threshold,
            max_retries = config.retry.max_retries,
            fallback_dir = %config.fallback.dir.display(),
            "Telemetry uplink ready"
        );

        let coordinator = Arc::new(UploadCoordinator::new(primary, secondary, store));
        let dispatcher = Arc::new(UploadDispatcher::with_handle(coordinator, runtime));
        Ok(Self::from_parts(config.batching.threshold, dispatcher))
    }

    pub fn from_parts(threshold: usize, dispatcher: Arc<UploadDispatcher>) -> Self {
        let sink: Arc<dyn BatchSink> = dispatcher.clone();
        Self {
            accumulator: BatchAccumulator::new(threshold, sink),
            dispatcher,
        }
    }

    pub fn process(&self, event: Event) {
        self.accumulator.process(event);
    }

    pub fn flush(&self) -> bool {
        self.accumulator.flush()
    }

    pub fn accumulator(&self) -> &BatchAccumulator {
        &self.accumulator
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.dispatcher.stats()
    }

    /// Flush the buffer and wait for every in-flight delivery.
    pub async fn shutdown(&self) -> DispatchSnapshot {
        self.flush();
        debug!(
            in_flight = self.dispatcher.in_flight(),
            "Waiting for batch deliveries"
        );
        self.dispatcher.shutdown().await
    }
}
