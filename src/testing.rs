//! Test doubles for transports, backoff sleeps, and batch sinks.
//!
//! Used by unit tests and the integration suites in `tests/` to drive the
//! delivery pipeline without a network or a real clock.

use crate::delivery::{AttemptError, ChannelKind, DeliveryOutcome, Sleeper, Transport};
use crate::pipeline::BatchSink;
use crate::types::Batch;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Transport that replays a scripted list of outcomes, then repeats a
/// fixed outcome once the script runs out.
pub struct ScriptedTransport {
    kind: ChannelKind,
    script: Mutex<VecDeque<DeliveryOutcome>>,
    then: DeliveryOutcome,
    latency: Duration,
    calls: AtomicU32,
    bodies: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    /// Replay `script`; every call after it runs out succeeds.
    pub fn new(kind: ChannelKind, script: Vec<DeliveryOutcome>) -> Self {
        Self {
            kind,
            script: Mutex::new(script.into()),
            then: Ok(()),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok(kind: ChannelKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn always_failing(kind: ChannelKind, error: AttemptError) -> Self {
        let mut transport = Self::new(kind, Vec::new());
        transport.then = Err(error);
        transport
    }

    /// Fail `n` times with `error`, then succeed.
    pub fn failing_times(kind: ChannelKind, n: usize, error: &AttemptError) -> Self {
        Self::new(kind, (0..n).map(|_| Err(error.clone())).collect())
    }

    /// Delay every send by `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Bodies received, in call order.
    pub fn bodies(&self) -> Vec<Vec<u8>> {
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, _batch: &Batch, body: Vec<u8>) -> DeliveryOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(body);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.then.clone())
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delay);
        tokio::task::yield_now().await;
    }
}

/// Sink that keeps every submitted batch in submission order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<Batch>>,
}

impl CollectingSink {
    pub fn batches(&self) -> Vec<Batch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BatchSink for CollectingSink {
    fn submit(&self, batch: Batch) {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
    }
}
