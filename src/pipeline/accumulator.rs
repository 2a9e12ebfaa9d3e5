//! Batch Accumulator: buffers events and seals them into batches
//!
//! `process` and `flush` never wait on the network. The buffer append and
//! the seal-and-swap happen under one mutex, and the sealed batch is
//! handed to the sink before the lock is released, so seal order equals
//! submission order and no event can straddle two batches.

use super::BatchSink;
use crate::types::{Batch, Event};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

pub struct BatchAccumulator {
    buffer: Mutex<Vec<Event>>,
    threshold: usize,
    sink: Arc<dyn BatchSink>,
}

impl BatchAccumulator {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: usize, sink: Arc<dyn BatchSink>) -> Self {
        let threshold = threshold.max(1);
        Self {
            buffer: Mutex::new(Vec::with_capacity(threshold)),
            threshold,
            sink,
        }
    }

    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Append an event, sealing and submitting the buffer once it reaches
    /// the threshold.
    pub fn process(&self, event: Event) {
        let mut buffer = self.lock();
        buffer.push(event);
        if buffer.len() >= self.threshold {
            self.seal_and_submit(&mut buffer);
        }
    }

    /// Seal and submit whatever is buffered. Returns `false` (and submits
    /// nothing) when the buffer is empty.
    pub fn flush(&self) -> bool {
        let mut buffer = self.lock();
        if buffer.is_empty() {
            return false;
        }
        self.seal_and_submit(&mut buffer);
        true
    }

    /// Events buffered but not yet sealed.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn seal_and_submit(&self, buffer: &mut Vec<Event>) {
        let events = std::mem::replace(buffer, Vec::with_capacity(self.threshold));
        let batch = Batch::seal(events);
        trace!(batch_id = %batch.id(), events = batch.len(), "Batch sealed");
        self.sink.submit(batch);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        // Appends cannot leave the buffer half-written, so a poisoned lock
        // still guards a consistent Vec.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CollectingSink;
    use serde_json::{json, Map};

    fn event(i: usize) -> Event {
        let mut payload = Map::new();
        payload.insert("i".to_string(), json!(i));
        Event::now("tick", payload)
    }

    fn seq(batch: &Batch) -> Vec<u64> {
        batch
            .events()
            .iter()
            .map(|e| e.payload()["i"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_seals_exactly_at_threshold() {
        let sink = Arc::new(CollectingSink::default());
        let acc = BatchAccumulator::new(3, sink.clone());

        acc.process(event(0));
        acc.process(event(1));
        assert!(sink.batches().is_empty());
        assert_eq!(acc.pending(), 2);

        acc.process(event(2));
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(acc.pending(), 0);

        for i in 3..10 {
            acc.process(event(i));
        }
        let batches = sink.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(seq(&batches[0]), vec![0, 1, 2]);
        assert_eq!(seq(&batches[1]), vec![3, 4, 5]);
        assert_eq!(seq(&batches[2]), vec![6, 7, 8]);
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn test_flush_submits_buffered_events_in_order() {
        let sink = Arc::new(CollectingSink::default());
        let acc = BatchAccumulator::new(100, sink.clone());

        for i in 0..5 {
            acc.process(event(i));
        }
        assert!(acc.flush());

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(seq(&batches[0]), vec![0, 1, 2, 3, 4]);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let sink = Arc::new(CollectingSink::default());
        let acc = BatchAccumulator::new(2, sink.clone());

        assert!(!acc.flush());
        acc.process(event(0));
        acc.process(event(1));
        assert!(!acc.flush());
        assert_eq!(sink.batches().len(), 1);
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let sink = Arc::new(CollectingSink::default());
        let acc = BatchAccumulator::new(0, sink.clone());
        assert_eq!(acc.threshold(), 1);

        acc.process(event(0));
        assert_eq!(sink.batches().len(), 1);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 1_000;

        let sink = Arc::new(CollectingSink::default());
        let acc = Arc::new(BatchAccumulator::new(64, sink.clone()));

        std::thread::scope(|s| {
            for p in 0..PRODUCERS {
                let acc = &acc;
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        acc.process(event(p * PER_PRODUCER + i));
                    }
                });
            }
        });
        acc.flush();

        let batches = sink.batches();
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 64));
        assert!(batches[..batches.len() - 1].iter().all(|b| b.len() == 64));

        let mut seen: Vec<u64> = batches.iter().flat_map(seq).collect();
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    }
}
