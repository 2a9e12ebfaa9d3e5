//! Upload Coordinator: fixed fallback chain for one batch
//!
//! primary channel → secondary channel → local fallback store.
//!
//! Each step starts only after the previous one has given up. The local
//! store is written at most once per batch, with the batch exactly as it
//! was sealed.

use super::channel::{ChannelReceipt, ChannelUploader};
use super::error::{ChannelError, CombinedChannelFailure, UploadError};
use crate::storage::LocalFallbackStore;
use crate::types::Batch;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Where a batch ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadReport {
    DeliveredPrimary {
        attempts: u32,
    },
    DeliveredSecondary {
        attempts: u32,
        primary: ChannelError,
    },
    /// Degraded but not lost: both channels failed, the batch is on disk.
    PersistedLocally {
        path: PathBuf,
        channels: CombinedChannelFailure,
    },
}

impl UploadReport {
    pub const fn label(&self) -> &'static str {
        match self {
            UploadReport::DeliveredPrimary { .. } => "delivered-primary",
            UploadReport::DeliveredSecondary { .. } => "delivered-secondary",
            UploadReport::PersistedLocally { .. } => "persisted-locally",
        }
    }
}

pub struct UploadCoordinator {
    primary: ChannelUploader,
    secondary: ChannelUploader,
    store: LocalFallbackStore,
}

impl UploadCoordinator {
    pub const fn new(
        primary: ChannelUploader,
        secondary: ChannelUploader,
        store: LocalFallbackStore,
    ) -> Self {
        Self {
            primary,
            secondary,
            store,
        }
    }

    pub const fn store(&self) -> &LocalFallbackStore {
        &self.store
    }

    /// Deliver one batch through the fallback chain.
    pub async fn deliver(&self, batch: Batch) -> Result<UploadReport, UploadError> {
        let primary = match self.primary.attempt_delivery(&batch).await {
            Ok(ChannelReceipt { attempts, .. }) => {
                debug!(batch_id = %batch.id(), events = batch.len(), attempts, "Batch delivered via primary channel");
                return Ok(UploadReport::DeliveredPrimary { attempts });
            }
            Err(e) => fatal_if_unencodable(&batch, e)?,
        };

        info!(
            batch_id = %batch.id(),
            error = %primary,
            "Primary channel failed, falling back to secondary"
        );

        let secondary = match self.secondary.attempt_delivery(&batch).await {
            Ok(ChannelReceipt { attempts, .. }) => {
                info!(batch_id = %batch.id(), events = batch.len(), attempts, "Batch delivered via secondary channel");
                return Ok(UploadReport::DeliveredSecondary { attempts, primary });
            }
            Err(e) => fatal_if_unencodable(&batch, e)?,
        };

        let channels = CombinedChannelFailure { primary, secondary };

        match self.store.persist(&batch).await {
            Ok(path) => {
                warn!(
                    batch_id = %batch.id(),
                    events = batch.len(),
                    path = %path.display(),
                    error = %channels,
                    "All channels failed; batch persisted to local fallback store"
                );
                Ok(UploadReport::PersistedLocally { path, channels })
            }
            Err(source) => {
                error!(
                    batch_id = %batch.id(),
                    events = batch.len(),
                    error = %source,
                    channels = %channels,
                    "All channels failed and local fallback write failed; batch lost"
                );
                Err(UploadError::Persistence { channels, source })
            }
        }
    }
}

/// An unencodable batch cannot go anywhere, local disk included.
fn fatal_if_unencodable(batch: &Batch, e: ChannelError) -> Result<ChannelError, UploadError> {
    if let ChannelError::Serialization { .. } = e {
        error!(batch_id = %batch.id(), events = batch.len(), error = %e, "Batch could not be serialized; batch lost");
        return Err(UploadError::Serialization(e));
    }
    Ok(e)
}
