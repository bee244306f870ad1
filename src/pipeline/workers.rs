/*!
 * Worker Pool
 * Explicitly owned thread pool for per-carrier slot allocation
 */

use crate::core::{SchedError, SchedResult};
use tracing::info;

/// Named rayon pool; threads are `mac-worker-{i}`
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(nof_workers: usize) -> SchedResult<Self> {
        if nof_workers == 0 {
            return Err(SchedError::InvalidConfig(
                "worker pool needs at least one thread".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nof_workers)
            .thread_name(|i| format!("mac-worker-{i}"))
            .build()
            .map_err(|e| SchedError::InvalidConfig(format!("worker pool: {e}")))?;

        info!(nof_workers, "carrier worker pool started");
        Ok(Self { pool })
    }

    pub fn nof_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` with a scope whose spawned jobs all finish before returning
    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&rayon::Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(op)
    }

    /// Fire-and-forget job
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("nof_workers", &self.nof_workers())
            .finish()
    }
}
