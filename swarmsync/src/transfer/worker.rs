//! Worker pools for the expensive parts of a transfer.
//!
//! Signature matching, block copying and digest verification run on a
//! [`WorkerPool`] so the manager lock is only held for bookkeeping. Jobs are
//! submitted after the manager releases its lock, which makes the
//! [`InlineWorkerPool`] safe for deterministic tests.

use std::fmt;

use tokio::runtime::Handle;
use tracing::debug;

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs off the caller's thread.
pub trait WorkerPool: Send + Sync {
    /// Queue `job` for execution.
    fn execute(&self, job: Job);
}

/// Runs jobs on a rayon thread pool.
pub struct RayonWorkerPool {
    pool: Option<rayon::ThreadPool>,
}

impl RayonWorkerPool {
    /// Use rayon's global pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Build a dedicated pool with `threads` workers (0 = one per CPU).
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("swarmsync-worker-{}", i))
            .build()?;
        debug!(threads = pool.current_num_threads(), "Created transfer worker pool");
        Ok(Self { pool: Some(pool) })
    }
}

impl WorkerPool for RayonWorkerPool {
    fn execute(&self, job: Job) {
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }
}

impl fmt::Debug for RayonWorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayonWorkerPool")
            .field(
                "threads",
                &self
                    .pool
                    .as_ref()
                    .map_or_else(rayon::current_num_threads, |p| p.current_num_threads()),
            )
            .finish()
    }
}

/// Runs jobs on a tokio runtime's blocking thread pool.
#[derive(Debug, Clone)]
pub struct TokioWorkerPool {
    handle: Handle,
}

impl TokioWorkerPool {
    /// Dispatch through the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Dispatch through the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl WorkerPool for TokioWorkerPool {
    fn execute(&self, job: Job) {
        // Detached; results flow back through the manager.
        drop(self.handle.spawn_blocking(job));
    }
}

/// Runs jobs immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineWorkerPool;

impl WorkerPool for InlineWorkerPool {
    fn execute(&self, job: Job) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_inline_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        InlineWorkerPool.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rayon_pool_runs_jobs() {
        let pool = RayonWorkerPool::new(2).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                tx.send(i).unwrap();
            }));
        }
        let mut seen: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rayon_global_pool_runs_jobs() {
        let (tx, rx) = mpsc::channel();
        RayonWorkerPool::global().execute(Box::new(move || {
            tx.send(42).unwrap();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_tokio_pool_runs_jobs() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let pool = TokioWorkerPool::new(runtime.handle().clone());
        let (tx, rx) = mpsc::channel();
        pool.execute(Box::new(move || {
            tx.send("done").unwrap();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "done");
    }

    #[test]
    fn test_tokio_current_outside_runtime() {
        assert!(TokioWorkerPool::current().is_none());
    }
}
