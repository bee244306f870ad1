/*!
 * Deferred Task Queue
 * Driving-thread-only callbacks drained to empty before the thread yields
 */

use super::types::LocalTask;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Ordered queue of same-thread callbacks
///
/// Drained as a queue rather than a fixed pass: a task that enqueues further
/// tasks has them run in the same drain.
#[derive(Default)]
pub struct DeferredQueue {
    tasks: RefCell<VecDeque<LocalTask>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: LocalTask) {
        self.tasks.borrow_mut().push_back(task);
    }

    /// Run tasks until the queue is empty, returning how many ran
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow ends before the task runs so it can enqueue more work
            let next = self.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}
