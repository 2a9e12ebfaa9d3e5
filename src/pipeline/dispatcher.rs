//! Upload Dispatcher: runs each sealed batch's delivery as its own task
//!
//! `submit` only spawns; it never waits. Deliveries for different batches
//! run concurrently and may finish in any order. Outcomes are counted in
//! [`DispatchStats`] and, when a receiver is attached, forwarded on an
//! unbounded channel.

use super::BatchSink;
use crate::delivery::{UploadCoordinator, UploadError, UploadReport};
use crate::types::Batch;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::debug;
use uuid::Uuid;

/// Outcome of one dispatched batch.
#[derive(Debug)]
pub struct DispatchRecord {
    pub batch_id: Uuid,
    pub events: usize,
    pub result: Result<UploadReport, UploadError>,
}

/// Counters across all dispatched batches.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    delivered_primary: AtomicU64,
    delivered_secondary: AtomicU64,
    persisted_locally: AtomicU64,
    lost: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub submitted: u64,
    pub delivered_primary: u64,
    pub delivered_secondary: u64,
    pub persisted_locally: u64,
    pub lost: u64,
}

impl DispatchSnapshot {
    /// Batches whose delivery has finished, whatever the outcome.
    pub const fn completed(&self) -> u64 {
        self.delivered_primary + self.delivered_secondary + self.persisted_locally + self.lost
    }

    pub const fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.completed())
    }
}

impl std::fmt::Display for DispatchSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Uplink: {} batches ({} primary, {} secondary, {} persisted locally, {} lost)",
            self.submitted,
            self.delivered_primary,
            self.delivered_secondary,
            self.persisted_locally,
            self.lost
        )
    }
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered_primary: self.delivered_primary.load(Ordering::Relaxed),
            delivered_secondary: self.delivered_secondary.load(Ordering::Relaxed),
            persisted_locally: self.persisted_locally.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: &Result<UploadReport, UploadError>) {
        let counter = match result {
            Ok(UploadReport::DeliveredPrimary { .. }) => &self.delivered_primary,
            Ok(UploadReport::DeliveredSecondary { .. }) => &self.delivered_secondary,
            Ok(UploadReport::PersistedLocally { .. }) => &self.persisted_locally,
            Err(_) => &self.lost,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// [`BatchSink`] that delivers every batch through an [`UploadCoordinator`]
/// on a tokio runtime.
pub struct UploadDispatcher {
    coordinator: Arc<UploadCoordinator>,
    runtime: Handle,
    tracker: TaskTracker,
    stats: Arc<DispatchStats>,
    outcomes: Option<mpsc::UnboundedSender<DispatchRecord>>,
}

impl UploadDispatcher {
    /// Captures the current runtime handle so later `submit` calls may come
    /// from plain threads.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime; use [`Self::with_handle`] with
    /// `Handle::try_current()` to handle that case.
    pub fn new(coordinator: Arc<UploadCoordinator>) -> Self {
        Self::with_handle(coordinator, Handle::current())
    }

    pub fn with_handle(coordinator: Arc<UploadCoordinator>, runtime: Handle) -> Self {
        Self {
            coordinator,
            runtime,
            tracker: TaskTracker::new(),
            stats: Arc::new(DispatchStats::default()),
            outcomes: None,
        }
    }

    /// Forward every outcome to the returned receiver.
    #[must_use]
    pub fn with_outcomes(mut self) -> (Self, mpsc::UnboundedReceiver<DispatchRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outcomes = Some(tx);
        (self, rx)
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Deliveries spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Close the tracker and wait until every spawned delivery has finished.
    pub async fn shutdown(&self) -> DispatchSnapshot {
        self.tracker.close();
        self.tracker.wait().await;
        self.stats()
    }
}

impl BatchSink for UploadDispatcher {
    fn submit(&self, batch: Batch) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let coordinator = Arc::clone(&self.coordinator);
        let stats = Arc::clone(&self.stats);
        let outcomes = self.outcomes.clone();
        let batch_id = batch.id();
        let events = batch.len();

        debug!(batch_id = %batch_id, events, "Dispatching batch");

        self.tracker.spawn_on(
            async move {
                let result = coordinator.deliver(batch).await;
                stats.record(&result);
                if let Some(tx) = outcomes {
                    let _ = tx.send(DispatchRecord {
                        batch_id,
                        events,
                        result,
                    });
                }
            },
            &self.runtime,
        );
    }
}
