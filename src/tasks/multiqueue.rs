/*!
 * External Task Multiqueue
 *
 * Multi-producer, single-consumer queues that let foreign threads inject work
 * onto the driving thread.
 *
 * # Design
 *
 * Each external queue is a bounded `flume` channel. Capabilities are split by
 * type:
 * - [`TaskMultiqueue`] is the single consumer; it is owned by the task
 *   scheduler and is not `Clone`.
 * - [`QueueFactory`] is a cloneable, thread-safe capability to register new
 *   queues.
 * - [`TaskQueueHandle`] is the producer side of one queue.
 *
 * New queues may be registered while the consumer is blocked; the registry
 * pokes a control channel so the consumer rebuilds its selector.
 */

use super::types::QueueId;
use crate::core::{SchedError, SchedResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

struct RegisteredQueue<T> {
    id: QueueId,
    rx: flume::Receiver<T>,
}

struct Registry<T> {
    queues: Mutex<Vec<RegisteredQueue<T>>>,
    generation: AtomicU64,
    running: AtomicBool,
    next_id: AtomicUsize,
    default_capacity: usize,
    control_tx: flume::Sender<()>,
}

impl<T> Registry<T> {
    fn add_queue(&self, capacity: usize) -> SchedResult<TaskQueueHandle<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if !self.running.load(Ordering::Acquire) {
            return Err(SchedError::TaskQueueClosed(id));
        }

        let capacity = capacity.max(1);
        let (tx, rx) = flume::bounded(capacity);
        self.queues.lock().push(RegisteredQueue { id, rx });
        self.generation.fetch_add(1, Ordering::AcqRel);
        // Wake a blocked consumer so it starts watching the new queue
        let _ = self.control_tx.send(());

        debug!(queue = id, capacity, "external task queue created");
        Ok(TaskQueueHandle { id, capacity, tx })
    }
}

/// Thread-safe capability to create external queues
pub struct QueueFactory<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for QueueFactory<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> QueueFactory<T> {
    /// Create a queue with the default capacity
    pub fn make_queue(&self) -> SchedResult<TaskQueueHandle<T>> {
        self.registry.add_queue(self.registry.default_capacity)
    }

    pub fn make_queue_with_capacity(&self, capacity: usize) -> SchedResult<TaskQueueHandle<T>> {
        self.registry.add_queue(capacity)
    }
}

/// Producer side of one external queue
pub struct TaskQueueHandle<T> {
    id: QueueId,
    capacity: usize,
    tx: flume::Sender<T>,
}

impl<T> Clone for TaskQueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            capacity: self.capacity,
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskQueueHandle<T> {
    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue without blocking; a full queue is reported, not waited on
    pub fn try_push(&self, item: T) -> SchedResult<()> {
        self.tx.try_send(item).map_err(|e| match e {
            flume::TrySendError::Full(_) => SchedError::TaskQueueFull {
                queue: self.id,
                capacity: self.capacity,
            },
            flume::TrySendError::Disconnected(_) => SchedError::TaskQueueClosed(self.id),
        })
    }

    /// Enqueue, blocking while the queue is full
    pub fn push(&self, item: T) -> SchedResult<()> {
        self.tx
            .send(item)
            .map_err(|_| SchedError::TaskQueueClosed(self.id))
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

enum Wake<T> {
    Task(T),
    Control,
    Disconnected(usize),
}

/// Single consumer over every registered external queue
pub struct TaskMultiqueue<T> {
    registry: Arc<Registry<T>>,
    control_rx: flume::Receiver<()>,
    local: Vec<(QueueId, flume::Receiver<T>)>,
    seen_generation: u64,
    cursor: usize,
}

impl<T> TaskMultiqueue<T> {
    /// Create an empty multiqueue; queues made without explicit size get `default_capacity`
    pub fn new(default_capacity: usize) -> Self {
        let (control_tx, control_rx) = flume::unbounded();
        Self {
            registry: Arc::new(Registry {
                queues: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
                running: AtomicBool::new(true),
                next_id: AtomicUsize::new(0),
                default_capacity: default_capacity.max(1),
                control_tx,
            }),
            control_rx,
            local: Vec::new(),
            seen_generation: 0,
            cursor: 0,
        }
    }

    pub fn factory(&self) -> QueueFactory<T> {
        QueueFactory {
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn add_queue(&self) -> SchedResult<TaskQueueHandle<T>> {
        self.registry.add_queue(self.registry.default_capacity)
    }

    pub fn is_running(&self) -> bool {
        self.registry.running.load(Ordering::Acquire)
    }

    pub fn nof_queues(&self) -> usize {
        self.registry.queues.lock().len()
    }

    fn refresh(&mut self) {
        while self.control_rx.try_recv().is_ok() {}

        let generation = self.registry.generation.load(Ordering::Acquire);
        if generation == self.seen_generation {
            return;
        }

        let mut queues = self.registry.queues.lock();
        queues.retain(|q| !(q.rx.is_disconnected() && q.rx.is_empty()));
        self.local = queues.iter().map(|q| (q.id, q.rx.clone())).collect();
        self.seen_generation = generation;
        if self.cursor >= self.local.len() {
            self.cursor = 0;
        }
    }

    fn drop_queue(&mut self, idx: usize) {
        let (id, _) = self.local.remove(idx);
        self.registry.queues.lock().retain(|q| q.id != id);
        self.registry.generation.fetch_add(1, Ordering::AcqRel);
        debug!(queue = id, "external task queue disconnected");
    }

    /// Pop one task without blocking, rotating across queues
    pub fn try_pop(&mut self) -> Option<T> {
        if !self.is_running() {
            return None;
        }
        self.refresh();

        let n = self.local.len();
        for k in 0..n {
            let i = (self.cursor + k) % n;
            if let Ok(item) = self.local[i].1.try_recv() {
                self.cursor = (i + 1) % n;
                return Some(item);
            }
        }
        None
    }

    /// Block until a task is available or the multiqueue is stopped
    pub fn wait_pop(&mut self) -> Option<T> {
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if !self.is_running() {
                return None;
            }

            let woke = {
                let mut selector =
                    flume::Selector::new().recv(&self.control_rx, |_| Wake::Control);
                for (idx, (_, rx)) in self.local.iter().enumerate() {
                    selector = selector.recv(rx, move |res| match res {
                        Ok(item) => Wake::Task(item),
                        Err(_) => Wake::Disconnected(idx),
                    });
                }
                selector.wait()
            };

            match woke {
                Wake::Task(item) => return Some(item),
                Wake::Control => continue,
                Wake::Disconnected(idx) => self.drop_queue(idx),
            }
        }
    }

    /// Stop accepting and delivering tasks; blocked and future pops return `None`
    pub fn stop(&mut self) {
        self.registry.running.store(false, Ordering::Release);
        self.registry.queues.lock().clear();
        self.registry.generation.fetch_add(1, Ordering::AcqRel);
        self.local.clear();
        let _ = self.registry.control_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_try_pop_round_robin_across_queues() {
        let mut mq = TaskMultiqueue::<u32>::new(8);
        let a = mq.add_queue().unwrap();
        let b = mq.add_queue().unwrap();

        a.try_push(1).unwrap();
        a.try_push(2).unwrap();
        b.try_push(10).unwrap();

        assert_eq!(mq.try_pop(), Some(1));
        assert_eq!(mq.try_pop(), Some(10));
        assert_eq!(mq.try_pop(), Some(2));
        assert_eq!(mq.try_pop(), None);
    }

    #[test]
    fn test_full_queue_is_reported() {
        let mq = TaskMultiqueue::<u32>::new(1);
        let q = mq.add_queue().unwrap();
        q.try_push(1).unwrap();
        assert_eq!(
            q.try_push(2),
            Err(SchedError::TaskQueueFull {
                queue: q.id(),
                capacity: 1
            })
        );
    }

    #[test]
    fn test_wait_pop_sees_queue_created_while_blocked() {
        let mut mq = TaskMultiqueue::<u32>::new(4);
        let factory = mq.factory();

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let q = factory.make_queue().unwrap();
            q.push(7).unwrap();
        });

        assert_eq!(mq.wait_pop(), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn test_stop_closes_producers() {
        let mut mq = TaskMultiqueue::<u32>::new(4);
        let q = mq.add_queue().unwrap();
        mq.stop();

        assert_eq!(mq.try_pop(), None);
        assert_eq!(mq.wait_pop(), None);
        assert_eq!(q.try_push(1), Err(SchedError::TaskQueueClosed(q.id())));
        assert!(mq.factory().make_queue().is_err());
    }

    #[test]
    fn test_dropped_producer_queue_is_pruned() {
        let mut mq = TaskMultiqueue::<u32>::new(4);
        let keep = mq.add_queue().unwrap();
        let gone = mq.add_queue().unwrap();
        drop(gone);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            keep.push(3).unwrap();
            keep
        });

        assert_eq!(mq.wait_pop(), Some(3));
        assert_eq!(mq.nof_queues(), 1);
        drop(handle.join().unwrap());
    }
}
