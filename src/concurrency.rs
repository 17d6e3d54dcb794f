//! Bounded-width task pools for the build stages.
//!
//! Every build stage dispatches one task per shard, bucket or segment onto a
//! [`StagePool`]. The pool owns its own rayon threads, so at most `width`
//! tasks of a stage run at once, and [`StagePool::run`] blocks until every
//! task has finished. The first error any task returns fails the whole
//! stage; the next stage never starts on partial output.

use crate::error::Result;
use rayon::prelude::*;
use tracing::{debug, warn};

/// A fixed-width worker pool for one build stage.
pub struct StagePool {
    /// Stage name, used in log events.
    name: &'static str,
    /// Dedicated worker threads.
    pool: rayon::ThreadPool,
    /// Number of worker threads.
    width: usize,
}

impl StagePool {
    /// Create a pool for the named stage with `width` worker threads.
    ///
    /// A width of zero is treated as one.
    pub fn new(name: &'static str, width: usize) -> Result<Self> {
        let width = width.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(move |i| format!("{}-{}", name, i))
            .build()?;
        Ok(Self { name, pool, width })
    }

    /// Stage name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum number of concurrently running tasks.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `task` once per item and wait for all of them.
    ///
    /// Results come back in input order. Each task owns its item; shared
    /// state must be passed by reference and guarded by the caller. Parallel
    /// loops inside a task run on this pool's threads as well.
    ///
    /// # Errors
    /// Returns the first error produced by any task.
    pub fn run<I, T, F>(&self, items: Vec<I>, task: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T> + Send + Sync,
    {
        debug!(stage = self.name, tasks = items.len(), width = self.width, "dispatching stage");
        let result: Result<Vec<T>> = self
            .pool
            .install(|| items.into_par_iter().with_max_len(1).map(&task).collect());
        if let Err(ref err) = result {
            warn!(stage = self.name, error = %err, "stage task failed");
        }
        result
    }

    /// Run a closure on the pool, so its parallel iterators use this pool's threads.
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IvfPqError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_keep_input_order() {
        let pool = StagePool::new("order", 3).unwrap();
        let out = pool.run((0..20).collect(), |i: usize| Ok(i * 2)).unwrap();
        assert_eq!(out, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_width_bounds_concurrency() {
        let pool = StagePool::new("bounded", 2).unwrap();
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        pool.run((0..12).collect(), |_: usize| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_task_fails_stage() {
        let pool = StagePool::new("failing", 4).unwrap();
        let result = pool.run((0..10).collect(), |i: usize| {
            if i == 6 {
                Err(IvfPqError::BucketNotFound(i))
            } else {
                Ok(i)
            }
        });
        assert!(matches!(result, Err(IvfPqError::BucketNotFound(6))));
    }

    #[test]
    fn test_zero_width_clamped() {
        let pool = StagePool::new("tiny", 0).unwrap();
        assert_eq!(pool.width(), 1);
        assert_eq!(pool.name(), "tiny");
        let out = pool.run(vec![1, 2, 3], |x: i32| Ok(x + 1)).unwrap();
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[test]
    fn test_empty_stage() {
        let pool = StagePool::new("empty", 2).unwrap();
        let out: Vec<usize> = pool.run(Vec::<usize>::new(), Ok).unwrap();
        assert!(out.is_empty());
    }
}
