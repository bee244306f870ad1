/*!
 * Slot Runner
 * Drives one slot through the scheduler and the pipeline coordinator
 *
 * Serial mode allocates carriers inline on the calling thread. Parallel mode
 * submits one job per carrier to the worker pool and returns as soon as the
 * slot is started, so up to `pipeline_depth` slots overlap.
 *
 * The runner is the pipeline's consumer: completed slots are handed back from
 * `run_slot` and `drain`. When the next slot's bucket is still held, the
 * runner takes completed slots until it frees up instead of blocking on
 * itself.
 */

use super::coordinator::SlotPipeline;
use super::workers::WorkerPool;
use crate::core::{CcIdx, SchedResult, TtiPoint};
use crate::sched::{CarrierSlotResult, MacScheduler, SlotResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// How carriers of one slot are allocated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Serial,
    ParallelCarriers,
}

pub struct SlotRunner {
    sched: Arc<MacScheduler>,
    pipeline: Arc<SlotPipeline>,
    workers: Option<WorkerPool>,
    failures: Arc<AtomicU64>,
}

impl SlotRunner {
    /// Build a runner sized from the scheduler configuration
    pub fn new(sched: Arc<MacScheduler>, mode: RunMode) -> SchedResult<Self> {
        let pipeline = Arc::new(SlotPipeline::new(sched.config().pipeline_depth)?);
        let workers = match mode {
            RunMode::Serial => None,
            RunMode::ParallelCarriers => Some(WorkerPool::new(sched.config().nof_workers)?),
        };
        Ok(Self {
            sched,
            pipeline,
            workers,
            failures: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn mode(&self) -> RunMode {
        if self.workers.is_some() {
            RunMode::ParallelCarriers
        } else {
            RunMode::Serial
        }
    }

    pub fn scheduler(&self) -> &Arc<MacScheduler> {
        &self.sched
    }

    pub fn pipeline(&self) -> &Arc<SlotPipeline> {
        &self.pipeline
    }

    /// Carrier allocations that failed and were reported empty
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Start the slot received at `tti_rx` and allocate every carrier
    ///
    /// Returns the slots completed since the previous call, in completion
    /// order. Blocks while the slot's pipeline bucket still has carriers in
    /// flight.
    pub fn run_slot(&self, tti_rx: TtiPoint) -> SchedResult<Vec<SlotResult>> {
        let mut completed = Vec::new();
        while !self.pipeline.is_available(tti_rx) {
            debug!(tti = tti_rx.to_uint(), "bucket held, taking completed slots");
            match self.pipeline.recv_result() {
                Some(result) => completed.push(result),
                None => break,
            }
        }

        let nof_carriers = self.sched.nof_carriers();
        self.pipeline.start_slot(tti_rx, nof_carriers)?;

        match &self.workers {
            None => {
                for cc in 0..nof_carriers {
                    run_carrier(&self.sched, &self.pipeline, &self.failures, tti_rx, cc)?;
                }
            }
            Some(workers) => {
                for cc in 0..nof_carriers {
                    let sched = Arc::clone(&self.sched);
                    let pipeline = Arc::clone(&self.pipeline);
                    let failures = Arc::clone(&self.failures);
                    workers.spawn(move || {
                        if let Err(e) = run_carrier(&sched, &pipeline, &failures, tti_rx, cc) {
                            error!(tti = tti_rx.to_uint(), cc, error = %e, "carrier result rejected by pipeline");
                        }
                    });
                }
            }
        }
        completed.extend(self.pipeline.drain_results());
        Ok(completed)
    }

    /// Wait until every started slot has finished on every carrier and take
    /// the remaining results
    pub fn drain(&self) -> Vec<SlotResult> {
        self.pipeline.wait_all();
        self.pipeline.drain_results()
    }
}

/// Allocate one carrier and always report it, so the bucket is released
fn run_carrier(
    sched: &MacScheduler,
    pipeline: &SlotPipeline,
    failures: &AtomicU64,
    tti_rx: TtiPoint,
    cc: CcIdx,
) -> SchedResult<()> {
    let result = sched.run_slot(tti_rx, cc).unwrap_or_else(|e| {
        failures.fetch_add(1, Ordering::Relaxed);
        error!(tti = tti_rx.to_uint(), cc, error = %e, "carrier allocation failed");
        CarrierSlotResult::empty(cc, tti_rx)
    });
    pipeline.finish_carrier(tti_rx, result)
}

impl std::fmt::Debug for SlotRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRunner")
            .field("mode", &self.mode())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
