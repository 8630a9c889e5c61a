//! Bounded parallel execution of independent jobs.
//!
//! Every parallel phase of a build (content loading, asset copying, page and
//! tag rendering) goes through [`ParallelExecutor::run`] with its own job,
//! result and error types.
//!
//! ## Model
//!
//! ```text
//!            ┌──────────┐
//!  jobs ───▶ │  queue   │ ◀── worker 0 ─┐
//!            │ (shared) │ ◀── worker 1 ─┼──▶ barrier ──▶ (results, errors)
//!            └──────────┘ ◀── worker N ─┘
//! ```
//!
//! `min(jobs, parallelism)` workers are started on a dedicated
//! [rayon](https://docs.rs/rayon) pool, each draining the shared queue until it
//! is empty. The call returns only after every worker has finished. A failing
//! job never stops its siblings, and neither results nor errors preserve
//! submission order. A job that panics is recorded in
//! [`PoolOutcome::panics`]; its worker moves on to the next job.

use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

/// Everything a run produced, in no particular order.
#[derive(Debug)]
pub struct PoolOutcome<R, E> {
    pub results: Vec<R>,
    pub errors: Vec<E>,
    /// Messages of jobs that panicked.
    pub panics: Vec<String>,
    /// Number of workers that were started.
    pub workers: usize,
}

impl<R, E> PoolOutcome<R, E> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
            panics: Vec::new(),
            workers: 0,
        }
    }

    /// Jobs that returned an error or panicked.
    pub fn failed(&self) -> usize {
        self.errors.len() + self.panics.len()
    }
}

/// A worker pool with a fixed upper bound on concurrency.
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    parallelism: usize,
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(available_parallelism())
    }
}

impl ParallelExecutor {
    /// Executor capped at `parallelism` workers (at least one).
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Workers started for a batch of `jobs` jobs.
    pub fn worker_count(&self, jobs: usize) -> usize {
        jobs.min(self.parallelism)
    }

    /// Run `work` over every job and wait for all of them.
    ///
    /// `work` returns `Ok(Some(r))` to contribute a result, `Ok(None)` to
    /// contribute nothing, or `Err(e)` to record an error. A panic inside
    /// `work` is caught and recorded as well.
    pub fn run<J, R, E, F>(&self, jobs: Vec<J>, work: F) -> Result<PoolOutcome<R, E>, ThreadPoolBuildError>
    where
        J: Send,
        R: Send,
        E: Send,
        F: Fn(J) -> Result<Option<R>, E> + Sync,
    {
        let workers = self.worker_count(jobs.len());
        if workers == 0 {
            return Ok(PoolOutcome::empty());
        }

        let total = jobs.len();
        let queue = Mutex::new(jobs.into_iter());
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("scribe-worker-{i}"))
            .build()?;

        tracing::debug!(jobs = total, workers, "starting worker pool");

        let per_worker: Vec<PoolOutcome<R, E>> = pool.broadcast(|_| {
            let mut local = PoolOutcome::empty();
            loop {
                // Hold the lock only long enough to take one job
                let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                let Some(job) = next else { break };
                match panic::catch_unwind(AssertUnwindSafe(|| work(job))) {
                    Ok(Ok(Some(result))) => local.results.push(result),
                    Ok(Ok(None)) => {}
                    Ok(Err(err)) => local.errors.push(err),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(%message, "job panicked");
                        local.panics.push(message);
                    }
                }
            }
            local
        });

        let mut outcome = PoolOutcome {
            results: Vec::with_capacity(total),
            errors: Vec::new(),
            panics: Vec::new(),
            workers: per_worker.len(),
        };
        for local in per_worker {
            outcome.results.extend(local.results);
            outcome.errors.extend(local.errors);
            outcome.panics.extend(local.panics);
        }
        Ok(outcome)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Number of CPUs the process may use, falling back to one.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
