//! Rayon thread pool configuration for fit evaluation.
//!
//! Use [WorkerPool::install] to evaluate many fits with a fixed number of
//! threads, or rely on Rayon's default (all CPU cores).

use rayon::ThreadPoolBuilder;

/// How many worker threads evaluate fits in parallel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPool {
    /// Number of worker threads. If 0, use the global Rayon pool.
    pub workers: usize,
}

impl WorkerPool {
    pub fn with_workers(n: usize) -> Self {
        Self { workers: n }
    }

    /// Run a closure on a pool with this worker count. Falls back to the
    /// global pool if a dedicated one cannot be built.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.workers == 0 {
            return f();
        }
        match ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(f),
            Err(err) => {
                tracing::warn!(workers = self.workers, error = %err, "pool.build_failed; using global pool");
                f()
            }
        }
    }
}
