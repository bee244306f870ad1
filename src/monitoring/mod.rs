/*!
 * Monitoring
 * Structured tracing and scheduler counters
 */

mod stats;
mod tracer;

pub use stats::{AtomicSchedStats, SchedStats};
pub use tracer::{init_tracing, SlotSpan};
