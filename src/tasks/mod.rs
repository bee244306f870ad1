/*!
 * Task Module
 * Timer service, deferred tasks and cross-thread task injection for the
 * slot-driving thread
 */

mod deferred;
mod multiqueue;
mod scheduler;
mod timers;
mod types;

// Re-export public API
pub use deferred::DeferredQueue;
pub use multiqueue::{QueueFactory, TaskMultiqueue, TaskQueueHandle};
pub use scheduler::{ExtTaskSchedHandle, TaskQueue, TaskSchedHandle, TaskScheduler};
pub use timers::{TimerService, UniqueTimer};
pub use types::{LocalTask, QueueId, SendTask, TaskSchedulerConfig, TimerId};
