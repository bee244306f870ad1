/*!
 * Slot Pipeline Coordinator
 * Bounds the number of slots in flight across carriers
 *
 * # Design
 *
 * One cache-aligned bucket per pipeline position (`tti mod depth`), each with
 * its own mutex and condvar, so carriers finishing different slots never
 * contend. A bucket cycles
 * `idle -> occupied(pending = nof_carriers) -> completed -> idle`.
 *
 * Carrier results are buffered in the bucket and the aggregated
 * `SlotResult` is published only when the last carrier reports back. The
 * bucket stays completed until the consumer takes that result, so a consumer
 * that falls behind stalls `start_slot` and at most `depth` results are ever
 * queued.
 */

use crate::core::limits::{MAX_PIPELINE_DEPTH, TTI_MODULUS};
use crate::core::{SchedError, SchedResult, TtiPoint};
use crate::sched::{CarrierSlotResult, SlotResult};
use flume::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace};

#[derive(Default)]
struct BucketState {
    pending: usize,
    tti: Option<TtiPoint>,
    results: Vec<CarrierSlotResult>,
    /// Published result not yet taken by the consumer
    completed: bool,
}

impl BucketState {
    #[inline]
    fn is_busy(&self) -> bool {
        self.pending > 0 || self.completed
    }
}

#[repr(C, align(64))]
struct Bucket {
    state: Mutex<BucketState>,
    released: Condvar,
}

impl Bucket {
    fn new() -> Self {
        Self {
            state: Mutex::new(BucketState::default()),
            released: Condvar::new(),
        }
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub slots_started: u64,
    pub slots_completed: u64,
    /// `start_slot` calls that had to wait for their bucket
    pub backpressure_waits: u64,
    /// Completed slots not yet taken by the consumer
    pub results_queued: usize,
}

pub struct SlotPipeline {
    buckets: Box<[Bucket]>,
    results_tx: Sender<SlotResult>,
    results_rx: Receiver<SlotResult>,
    slots_started: AtomicU64,
    slots_completed: AtomicU64,
    backpressure_waits: AtomicU64,
}

impl SlotPipeline {
    /// Create a pipeline admitting up to `depth` slots in flight
    pub fn new(depth: usize) -> SchedResult<Self> {
        if depth == 0 || depth > MAX_PIPELINE_DEPTH {
            return Err(SchedError::InvalidConfig(format!(
                "pipeline depth {depth} outside 1..={MAX_PIPELINE_DEPTH}"
            )));
        }
        if TTI_MODULUS as usize % depth != 0 {
            return Err(SchedError::InvalidConfig(format!(
                "pipeline depth {depth} does not divide the TTI range {TTI_MODULUS}"
            )));
        }
        // Never more queued results than completed buckets
        let (results_tx, results_rx) = flume::bounded(depth);
        Ok(Self {
            buckets: (0..depth).map(|_| Bucket::new()).collect(),
            results_tx,
            results_rx,
            slots_started: AtomicU64::new(0),
            slots_completed: AtomicU64::new(0),
            backpressure_waits: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_index(&self, tti: TtiPoint) -> usize {
        tti.to_uint() as usize % self.buckets.len()
    }

    /// Occupy the bucket of `tti` with `nof_carriers` pending carriers
    ///
    /// Blocks while the previous occupant of the bucket still has carriers
    /// pending or its result has not been taken yet.
    pub fn start_slot(&self, tti: TtiPoint, nof_carriers: usize) -> SchedResult<()> {
        if nof_carriers == 0 {
            return Err(SchedError::InvalidConfig(
                "a slot must cover at least one carrier".into(),
            ));
        }
        let idx = self.bucket_index(tti);
        let bucket = &self.buckets[idx];

        let mut state = bucket.state.lock();
        if state.is_busy() {
            self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
            debug!(
                tti = tti.to_uint(),
                bucket = idx,
                pending = state.pending,
                completed = state.completed,
                "pipeline full, waiting for bucket"
            );
            while state.is_busy() {
                bucket.released.wait(&mut state);
            }
        }

        state.pending = nof_carriers;
        state.tti = Some(tti);
        state.results.clear();
        state.results.reserve(nof_carriers);
        self.slots_started.fetch_add(1, Ordering::Relaxed);
        trace!(tti = tti.to_uint(), bucket = idx, nof_carriers, "slot started");
        Ok(())
    }

    /// Report one carrier's result for `tti`
    ///
    /// The last carrier publishes the aggregated slot. The bucket is released
    /// once the consumer takes it.
    pub fn finish_carrier(&self, tti: TtiPoint, result: CarrierSlotResult) -> SchedResult<()> {
        let idx = self.bucket_index(tti);
        let bucket = &self.buckets[idx];

        let mut state = bucket.state.lock();
        if state.pending == 0 || state.tti != Some(tti) {
            return Err(SchedError::PipelineUnderflow {
                bucket: idx,
                tti: tti.to_uint(),
            });
        }

        state.results.push(result);
        state.pending -= 1;
        if state.pending > 0 {
            return Ok(());
        }

        let mut carriers = std::mem::take(&mut state.results);
        carriers.sort_unstable_by_key(|r| r.cc);
        state.tti = None;
        let slot = SlotResult {
            tti_rx: tti,
            carriers,
        };
        if let Err(e) = self.results_tx.try_send(slot) {
            // Free the bucket anyway so the pipeline keeps moving
            bucket.released.notify_all();
            error!(tti = tti.to_uint(), bucket = idx, error = %e, "completed slot dropped");
            return Err(SchedError::PipelineOverflow {
                bucket: idx,
                tti: tti.to_uint(),
            });
        }
        state.completed = true;
        self.slots_completed.fetch_add(1, Ordering::Relaxed);
        bucket.released.notify_all();
        trace!(tti = tti.to_uint(), bucket = idx, "slot completed");
        Ok(())
    }

    fn release(&self, taken: &SlotResult) {
        let idx = self.bucket_index(taken.tti_rx);
        let bucket = &self.buckets[idx];
        let mut state = bucket.state.lock();
        state.completed = false;
        bucket.released.notify_all();
        trace!(tti = taken.tti_rx.to_uint(), bucket = idx, "slot taken");
    }

    /// Block until every started slot has finished on every carrier
    ///
    /// Completed results stay queued until taken.
    pub fn wait_all(&self) {
        for bucket in self.buckets.iter() {
            let mut state = bucket.state.lock();
            while state.pending > 0 {
                bucket.released.wait(&mut state);
            }
        }
    }

    /// Carriers still pending in the bucket of `tti`
    pub fn pending(&self, tti: TtiPoint) -> usize {
        self.buckets[self.bucket_index(tti)].state.lock().pending
    }

    /// Whether `start_slot(tti, ..)` would proceed without waiting
    pub fn is_available(&self, tti: TtiPoint) -> bool {
        !self.buckets[self.bucket_index(tti)].state.lock().is_busy()
    }

    /// No slot in flight and no result waiting for the consumer
    pub fn is_idle(&self) -> bool {
        self.buckets.iter().all(|b| !b.state.lock().is_busy())
    }

    /// Take the oldest completed slot, if any, releasing its bucket
    pub fn take_result(&self) -> Option<SlotResult> {
        let taken = self.results_rx.try_recv().ok()?;
        self.release(&taken);
        Some(taken)
    }

    /// Block until a slot completes, then take it
    ///
    /// Returns `None` only if the result channel has disconnected.
    pub fn recv_result(&self) -> Option<SlotResult> {
        let taken = self.results_rx.recv().ok()?;
        self.release(&taken);
        Some(taken)
    }

    /// Take every completed slot published so far, in completion order
    pub fn drain_results(&self) -> Vec<SlotResult> {
        std::iter::from_fn(|| self.take_result()).collect()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            slots_started: self.slots_started.load(Ordering::Relaxed),
            slots_completed: self.slots_completed.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
            results_queued: self.results_rx.len(),
        }
    }
}

impl std::fmt::Debug for SlotPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPipeline")
            .field("depth", &self.depth())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn carrier(cc: usize, tti: TtiPoint) -> CarrierSlotResult {
        CarrierSlotResult::empty(cc, tti)
    }

    #[test]
    fn test_invalid_depth() {
        assert!(SlotPipeline::new(0).is_err());
        assert!(SlotPipeline::new(MAX_PIPELINE_DEPTH + 1).is_err());
        assert!(SlotPipeline::new(3).is_err());
        assert_eq!(SlotPipeline::new(4).unwrap().depth(), 4);
    }

    #[test]
    fn test_publish_after_last_carrier() {
        let pipeline = SlotPipeline::new(4).unwrap();
        let tti = TtiPoint::new(7);
        pipeline.start_slot(tti, 2).unwrap();

        pipeline.finish_carrier(tti, carrier(1, tti)).unwrap();
        assert_eq!(pipeline.pending(tti), 1);
        assert!(pipeline.drain_results().is_empty());

        pipeline.finish_carrier(tti, carrier(0, tti)).unwrap();
        assert!(!pipeline.is_idle());
        let results = pipeline.drain_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tti_rx, tti);
        let ccs: Vec<_> = results[0].carriers.iter().map(|c| c.cc).collect();
        assert_eq!(ccs, vec![0, 1]);
        assert!(pipeline.is_idle());
    }

    #[test]
    fn test_underflow_rejected() {
        let pipeline = SlotPipeline::new(2).unwrap();
        let tti = TtiPoint::new(3);
        assert_eq!(
            pipeline.finish_carrier(tti, carrier(0, tti)),
            Err(SchedError::PipelineUnderflow { bucket: 1, tti: 3 })
        );

        pipeline.start_slot(tti, 1).unwrap();
        pipeline.finish_carrier(tti, carrier(0, tti)).unwrap();
        assert!(pipeline.finish_carrier(tti, carrier(0, tti)).is_err());
    }

    #[test]
    fn test_other_tti_in_bucket_rejected() {
        let pipeline = SlotPipeline::new(2).unwrap();
        pipeline.start_slot(TtiPoint::new(0), 1).unwrap();
        // tti 2 maps to the same bucket but was never started
        let tti = TtiPoint::new(2);
        assert!(pipeline.finish_carrier(tti, carrier(0, tti)).is_err());
        assert_eq!(pipeline.pending(TtiPoint::new(0)), 1);
    }

    #[test]
    fn test_zero_carriers_rejected() {
        let pipeline = SlotPipeline::new(1).unwrap();
        assert!(pipeline.start_slot(TtiPoint::new(0), 0).is_err());
    }

    #[test]
    fn test_start_blocks_until_bucket_released() {
        let pipeline = Arc::new(SlotPipeline::new(1).unwrap());
        let first = TtiPoint::new(0);
        pipeline.start_slot(first, 1).unwrap();

        let waiter = {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                pipeline.start_slot(TtiPoint::new(1), 1).unwrap();
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        assert_eq!(pipeline.stats().slots_started, 1);

        pipeline.finish_carrier(first, carrier(0, first)).unwrap();
        // Finished but not yet taken: the bucket is still held
        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        assert_eq!(pipeline.take_result().map(|r| r.tti_rx), Some(first));
        waiter.join().unwrap();
        assert_eq!(pipeline.pending(TtiPoint::new(1)), 1);
        assert_eq!(pipeline.stats().backpressure_waits, 1);
    }

    #[test]
    fn test_undrained_consumer_stalls_start() {
        let pipeline = Arc::new(SlotPipeline::new(2).unwrap());
        for raw in 0..2 {
            let tti = TtiPoint::new(raw);
            pipeline.start_slot(tti, 1).unwrap();
            pipeline.finish_carrier(tti, carrier(0, tti)).unwrap();
        }
        assert_eq!(pipeline.stats().results_queued, 2);
        assert!(!pipeline.is_available(TtiPoint::new(2)));

        let producer = {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                for raw in 2..500 {
                    let tti = TtiPoint::new(raw);
                    pipeline.start_slot(tti, 1).unwrap();
                    pipeline.finish_carrier(tti, carrier(0, tti)).unwrap();
                }
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!producer.is_finished());
        let stats = pipeline.stats();
        assert_eq!(stats.slots_started, 2);
        assert_eq!(stats.results_queued, 2);
        assert_eq!(stats.backpressure_waits, 1);

        let mut taken = Vec::new();
        while taken.len() < 500 {
            let result = pipeline.recv_result().unwrap();
            assert!(pipeline.stats().results_queued <= 2);
            taken.push(result.tti_rx.to_uint());
        }
        producer.join().unwrap();
        assert_eq!(taken, (0..500).collect::<Vec<_>>());
        assert!(pipeline.is_idle());
    }

    #[test]
    fn test_wait_all_leaves_buckets_reusable() {
        let pipeline = Arc::new(SlotPipeline::new(2).unwrap());
        let tti = TtiPoint::new(0);
        pipeline.start_slot(tti, 1).unwrap();

        let finisher = {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                pipeline.finish_carrier(tti, carrier(0, tti)).unwrap();
            })
        };
        pipeline.wait_all();
        finisher.join().unwrap();
        assert_eq!(pipeline.pending(tti), 0);
        assert_eq!(pipeline.drain_results().len(), 1);
        assert!(pipeline.is_idle());

        pipeline.start_slot(TtiPoint::new(1), 1).unwrap();
        assert_eq!(pipeline.stats().slots_started, 2);
    }
}
