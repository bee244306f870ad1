/*!
 * Error Types
 * Centralized error handling with thiserror and miette diagnostics
 *
 * Only configuration-class and pool-exhaustion failures live here. Transient
 * per-grant allocation outcomes are `sched::AllocError` and never leave the
 * per-user loop.
 */

use super::types::{CcIdx, Rnti};
use miette::Diagnostic;
use thiserror::Error;

/// Common result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

/// Unified scheduler error type with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SchedError {
    #[error("Timer pool exhausted: all {capacity} timers are in use")]
    #[diagnostic(
        code(tasks::timer_pool_exhausted),
        help("The timer pool is sized at startup. Increase `tasks.timer_pool_size`.")
    )]
    TimerPoolExhausted { capacity: usize },

    #[error("Task queue {queue} is full (capacity {capacity})")]
    #[diagnostic(
        code(tasks::queue_full),
        help("External producers outpace the driving thread. Increase `tasks.extern_queue_capacity`.")
    )]
    TaskQueueFull { queue: usize, capacity: usize },

    #[error("Task queue {0} is closed")]
    #[diagnostic(
        code(tasks::queue_closed),
        help("The task scheduler was stopped; no further tasks are accepted.")
    )]
    TaskQueueClosed(usize),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(config::invalid),
        help("Check the scheduler configuration against the documented limits.")
    )]
    InvalidConfig(String),

    #[error("Configuration could not be loaded: {0}")]
    #[diagnostic(code(config::load_failed))]
    ConfigLoad(String),

    #[error("User 0x{0:x} not found")]
    #[diagnostic(
        code(sched::user_not_found),
        help("The user may have detached or was never attached.")
    )]
    UserNotFound(Rnti),

    #[error("User 0x{0:x} already exists")]
    #[diagnostic(code(sched::user_exists))]
    UserExists(Rnti),

    #[error("Carrier {0} is not configured")]
    #[diagnostic(
        code(sched::unknown_carrier),
        help("Carrier indices must be below the number of configured cells.")
    )]
    UnknownCarrier(CcIdx),

    #[error("HARQ process {pid} of user 0x{rnti:x} on carrier {cc} is out of range")]
    #[diagnostic(code(sched::invalid_harq))]
    InvalidHarq { rnti: Rnti, cc: CcIdx, pid: u32 },

    #[error("Pipeline bucket {bucket} finished more carriers than were started (tti {tti})")]
    #[diagnostic(
        code(pipeline::underflow),
        help("Every `finish_carrier` call must be matched by a carrier counted in `start_slot`.")
    )]
    PipelineUnderflow { bucket: usize, tti: u32 },

    #[error("Completed slot {tti} could not be queued for the consumer (bucket {bucket})")]
    #[diagnostic(
        code(pipeline::overflow),
        help("Each bucket holds at most one completed slot; take results before the bucket is reused.")
    )]
    PipelineOverflow { bucket: usize, tti: u32 },

    #[error("Priority feed transport error: {0}")]
    #[diagnostic(
        code(feed::transport),
        help("The external priority source is best-effort; the scheduler keeps running on the last known index.")
    )]
    FeedTransport(String),
}

impl From<zeromq::ZmqError> for SchedError {
    fn from(err: zeromq::ZmqError) -> Self {
        SchedError::FeedTransport(err.to_string())
    }
}

impl From<serde_json::Error> for SchedError {
    fn from(err: serde_json::Error) -> Self {
        SchedError::ConfigLoad(err.to_string())
    }
}

impl From<std::io::Error> for SchedError {
    fn from(err: std::io::Error) -> Self {
        SchedError::ConfigLoad(err.to_string())
    }
}
