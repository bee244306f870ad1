/*!
 * MAC Slot Scheduler Library
 * Per-slot radio resource allocation driven by an external priority feed,
 * with a cooperative task substrate and a slot pipeline across carriers
 */

pub mod core;
pub mod feed;
pub mod monitoring;
pub mod pipeline;
pub mod sched;
pub mod tasks;

// Re-exports
pub use crate::core::{SchedError, SchedResult, SlotContext, TtiPoint};
pub use feed::{HintBroadcaster, PriorityFeed, PriorityReceiver, ZmqHintBridge};
pub use monitoring::{init_tracing, SchedStats};
pub use pipeline::{RunMode, SlotPipeline, SlotRunner, WorkerPool};
pub use sched::{
    AlgorithmKind, CarrierSlotResult, CellConfig, MacScheduler, SchedConfig, SlotResult,
    UeConfig,
};
pub use tasks::{TaskScheduler, TaskSchedulerConfig};
