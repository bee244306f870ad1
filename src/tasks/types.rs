/*!
 * Task Types
 * Callback aliases and task scheduler configuration
 */

use crate::core::limits::{DEFAULT_EXTERN_QUEUE_CAPACITY, DEFAULT_TIMER_POOL_SIZE};
use crate::core::{SchedError, SchedResult};
use serde::{Deserialize, Serialize};

/// Callback that runs on the driving thread only
pub type LocalTask = Box<dyn FnOnce() + 'static>;

/// Callback injected from another thread
pub type SendTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of an external task queue
pub type QueueId = usize;

/// Timer identifier (index into the pre-allocated pool)
pub type TimerId = u32;

/// Work posted onto an external queue
pub(crate) enum ExternalTask {
    /// Run on the driving thread at the next poll
    Run(SendTask),
    /// Arm a one-shot timer on the driving thread
    Defer { delay: u32, task: SendTask },
}

/// Task scheduler sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSchedulerConfig {
    /// Capacity of each external queue created without an explicit size
    pub extern_queue_capacity: usize,
    /// Number of pre-allocated timers
    pub timer_pool_size: usize,
}

impl Default for TaskSchedulerConfig {
    fn default() -> Self {
        Self {
            extern_queue_capacity: DEFAULT_EXTERN_QUEUE_CAPACITY,
            timer_pool_size: DEFAULT_TIMER_POOL_SIZE,
        }
    }
}

impl TaskSchedulerConfig {
    pub fn validate(&self) -> SchedResult<()> {
        if self.extern_queue_capacity == 0 {
            return Err(SchedError::InvalidConfig(
                "tasks.extern_queue_capacity must be non-zero".into(),
            ));
        }
        if self.timer_pool_size == 0 {
            return Err(SchedError::InvalidConfig(
                "tasks.timer_pool_size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
