/*!
 * Task Scheduler
 *
 * Single-threaded cooperative orchestrator composing the timer service, the
 * deferred task queue and the external multiqueue.
 *
 * Two handle types restrict capability by caller context:
 * - [`TaskSchedHandle`] for code on the driving thread (`!Send`): timers,
 *   deferred same-thread work, background-result notifications.
 * - [`ExtTaskSchedHandle`] for other threads (`Send + Sync`): new external
 *   queues, background-result notifications, deferred callbacks posted to the
 *   driving thread. It cannot drive timers directly.
 */

use super::deferred::DeferredQueue;
use super::multiqueue::{QueueFactory, TaskMultiqueue, TaskQueueHandle};
use super::timers::{TimerService, UniqueTimer};
use super::types::{ExternalTask, QueueId, TaskSchedulerConfig};
use crate::core::SchedResult;
use std::rc::Rc;
use tracing::{debug, info, warn};

struct SchedulerCore {
    timers: TimerService,
    deferred: DeferredQueue,
    background: TaskQueueHandle<ExternalTask>,
}

impl SchedulerCore {
    /// Never blocks: the driving thread is the consumer of the background
    /// queue. A full queue is returned as `TaskQueueFull` and the task is not
    /// queued.
    fn notify_background_task_result<F>(&self, task: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.background
            .try_push(ExternalTask::Run(Box::new(task)))
            .inspect_err(|e| warn!(error = %e, "background result not queued"))
    }
}

/// Driving-thread task orchestrator
pub struct TaskScheduler {
    core: Rc<SchedulerCore>,
    external: TaskMultiqueue<ExternalTask>,
}

impl TaskScheduler {
    pub fn new(config: TaskSchedulerConfig) -> SchedResult<Self> {
        config.validate()?;

        let external = TaskMultiqueue::new(config.extern_queue_capacity);
        // Always present; carries background-result notifications
        let background = external.add_queue()?;

        info!(
            extern_queue_capacity = config.extern_queue_capacity,
            timer_pool_size = config.timer_pool_size,
            "task scheduler initialized"
        );

        Ok(Self {
            core: Rc::new(SchedulerCore {
                timers: TimerService::new(config.timer_pool_size),
                deferred: DeferredQueue::new(),
                background,
            }),
            external,
        })
    }

    /// Handle for code running on the driving thread
    pub fn handle(&self) -> TaskSchedHandle {
        TaskSchedHandle {
            core: Rc::clone(&self.core),
        }
    }

    /// Handle for code running on other threads
    pub fn ext_handle(&self) -> ExtTaskSchedHandle {
        ExtTaskSchedHandle {
            factory: self.external.factory(),
            background: self.core.background.clone(),
        }
    }

    pub fn timers(&self) -> &TimerService {
        &self.core.timers
    }

    pub fn create_timer(&self) -> SchedResult<UniqueTimer> {
        self.core.timers.create_timer()
    }

    pub fn defer_callback<F>(&self, delay: u32, func: F) -> SchedResult<()>
    where
        F: FnOnce() + 'static,
    {
        self.core.timers.defer_callback(delay, func)
    }

    pub fn defer_task<F>(&self, func: F)
    where
        F: FnOnce() + 'static,
    {
        self.core.deferred.push(Box::new(func));
    }

    pub fn notify_background_task_result<F>(&self, task: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.notify_background_task_result(task)
    }

    pub fn make_task_queue(&self) -> SchedResult<TaskQueue> {
        self.external.add_queue().map(TaskQueue)
    }

    /// Advance all timers by one tic. Driving thread only.
    pub fn tic(&self) {
        self.core.timers.step();
    }

    /// Drain deferred tasks and every external queue without blocking
    ///
    /// Used in time-critical polling loops. Returns the number of external
    /// tasks processed.
    pub fn run_pending_tasks(&mut self) -> SchedResult<usize> {
        self.run_all_internal_tasks();
        let mut processed = 0;
        while let Some(task) = self.external.try_pop() {
            self.dispatch(task)?;
            self.run_all_internal_tasks();
            processed += 1;
        }
        Ok(processed)
    }

    /// Block until one external task is available and run it
    ///
    /// Returns `false` once the scheduler has been stopped.
    pub fn run_next_task(&mut self) -> SchedResult<bool> {
        match self.external.wait_pop() {
            Some(task) => {
                self.dispatch(task)?;
                self.run_all_internal_tasks();
                Ok(true)
            }
            None => {
                self.run_all_internal_tasks();
                Ok(false)
            }
        }
    }

    /// Close every external queue; blocked and future waits return
    pub fn stop(&mut self) {
        self.external.stop();
        info!("task scheduler stopped");
    }

    pub fn nof_pending_deferred(&self) -> usize {
        self.core.deferred.len()
    }

    fn dispatch(&self, task: ExternalTask) -> SchedResult<()> {
        match task {
            ExternalTask::Run(func) => {
                func();
                Ok(())
            }
            ExternalTask::Defer { delay, task } => self.core.timers.defer_callback(delay, task),
        }
    }

    fn run_all_internal_tasks(&self) {
        let ran = self.core.deferred.run_all();
        if ran > 0 {
            debug!(ran, "deferred tasks drained");
        }
    }
}

/// Producer handle for a user-created external queue
#[derive(Clone)]
pub struct TaskQueue(TaskQueueHandle<ExternalTask>);

impl TaskQueue {
    pub fn id(&self) -> QueueId {
        self.0.id()
    }

    /// Enqueue a task, failing if the queue is full
    pub fn try_push<F>(&self, func: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.try_push(ExternalTask::Run(Box::new(func)))
    }

    /// Enqueue a task, blocking while the queue is full
    pub fn push<F>(&self, func: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.push(ExternalTask::Run(Box::new(func)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Task scheduler handle for code running within the driving thread
#[derive(Clone)]
pub struct TaskSchedHandle {
    core: Rc<SchedulerCore>,
}

impl TaskSchedHandle {
    pub fn create_timer(&self) -> SchedResult<UniqueTimer> {
        self.core.timers.create_timer()
    }

    pub fn defer_callback<F>(&self, delay: u32, func: F) -> SchedResult<()>
    where
        F: FnOnce() + 'static,
    {
        self.core.timers.defer_callback(delay, func)
    }

    pub fn defer_task<F>(&self, func: F)
    where
        F: FnOnce() + 'static,
    {
        self.core.deferred.push(Box::new(func));
    }

    pub fn notify_background_task_result<F>(&self, task: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.notify_background_task_result(task)
    }
}

/// Task scheduler handle for code running outside the driving thread
#[derive(Clone)]
pub struct ExtTaskSchedHandle {
    factory: QueueFactory<ExternalTask>,
    background: TaskQueueHandle<ExternalTask>,
}

impl ExtTaskSchedHandle {
    pub fn make_task_queue(&self) -> SchedResult<TaskQueue> {
        self.factory.make_queue().map(TaskQueue)
    }

    pub fn make_task_queue_with_capacity(&self, capacity: usize) -> SchedResult<TaskQueue> {
        self.factory
            .make_queue_with_capacity(capacity)
            .map(TaskQueue)
    }

    /// Hand a background result to the driving thread
    ///
    /// Blocks while the background queue is full. Must not be called from
    /// the driving thread, which is the queue's consumer.
    pub fn notify_background_task_result<F>(&self, task: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.background.push(ExternalTask::Run(Box::new(task)))
    }

    /// Arm a one-shot timer on the driving thread at its next poll
    ///
    /// Blocks while the background queue is full.
    pub fn defer_callback<F>(&self, delay: u32, func: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.background.push(ExternalTask::Defer {
            delay,
            task: Box::new(func),
        })
    }
}
