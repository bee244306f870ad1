/*!
 * Pipeline Module
 * Slot pipelining across carriers: bucket coordinator, worker pool and
 * slot runner
 */

mod coordinator;
mod runner;
mod workers;

// Re-export public API
pub use coordinator::{PipelineStats, SlotPipeline};
pub use runner::{RunMode, SlotRunner};
pub use workers::WorkerPool;
