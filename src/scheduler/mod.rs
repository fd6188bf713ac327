//! Delayed-execution schedulers.
//!
//! A [`Scheduler`] accepts a zero-argument unit of [`Work`] and runs it,
//! asynchronously, no earlier than the requested delay. Schedulers are
//! shared: one instance may serve many executors.
//!
//! - [`TokioScheduler`] sleeps on the Tokio timer, then runs the work on the
//!   blocking pool so user code and atomic units may block freely.
//! - [`ManualScheduler`] queues work until its owner drains it; every
//!   requested delay is recorded. Deterministic, for tests and simulations.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::config::ConfigError;

/// A unit of work handed to a [`Scheduler`].
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Runs work after a delay.
///
/// Implementations may run the work on any thread. Dropping the work without
/// running it is allowed (e.g. during shutdown); the executor surfaces that to
/// the caller as [`ExecutorError::Abandoned`](crate::ExecutorError::Abandoned).
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, work: Work);
}

/// [`Scheduler`] backed by a Tokio runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use resilex::scheduler::{Scheduler, TokioScheduler};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let scheduler = TokioScheduler::current()?;
///     scheduler.schedule_after(Duration::from_millis(10), Box::new(|| println!("tick")));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Binds the scheduler to the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Binds the scheduler to the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRuntime`] when called outside a Tokio runtime.
    pub fn current() -> Result<Self, ConfigError> {
        let handle = Handle::try_current().map_err(ConfigError::NoRuntime)?;
        Ok(Self::new(handle))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, work: Work) {
        debug!(?delay, "scheduling work on tokio runtime");
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = tokio::task::spawn_blocking(work).await {
                error!(error = %e, "scheduled work did not run to completion");
            }
        });
    }
}

/// [`Scheduler`] that only runs work when told to.
///
/// Work is queued in submission order and the requested delay is recorded
/// but never waited for. Work scheduled while draining is appended to the
/// queue, so [`run_until_idle`](Self::run_until_idle) runs a whole retry
/// chain without ever nesting calls.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use resilex::scheduler::{ManualScheduler, Scheduler};
///
/// let scheduler = ManualScheduler::new();
/// scheduler.schedule_after(Duration::from_secs(2), Box::new(|| {}));
/// assert_eq!(scheduler.pending(), 1);
/// assert_eq!(scheduler.run_until_idle(), 1);
/// assert_eq!(scheduler.delays(), vec![Duration::from_secs(2)]);
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Work>>,
    delays: Mutex<Vec<Duration>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued, not yet run, units of work.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Every delay requested so far, in scheduling order.
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.delays).clone()
    }

    /// Runs the oldest queued unit of work. Returns `false` if none was queued.
    pub fn run_next(&self) -> bool {
        // The lock is released before running so the work may schedule more.
        let next = lock(&self.queue).pop_front();
        match next {
            Some(work) => {
                work();
                true
            }
            None => false,
        }
    }

    /// Runs queued work until the queue is empty, returning how many units ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Drops all queued work without running it.
    pub fn clear(&self) {
        lock(&self.queue).clear();
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, work: Work) {
        lock(&self.delays).push(delay);
        lock(&self.queue).push_back(work);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn manual_runs_in_submission_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            scheduler.schedule_after(Duration::ZERO, Box::new(move || order.lock().unwrap().push(i)));
        }
        assert_eq!(scheduler.run_until_idle(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn manual_runs_work_scheduled_while_draining() {
        let scheduler = Arc::new(ManualScheduler::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = Arc::clone(&scheduler);
        let inner_count = Arc::clone(&count);
        scheduler.schedule_after(
            Duration::ZERO,
            Box::new(move || {
                inner_count.fetch_add(1, Ordering::SeqCst);
                let c = Arc::clone(&inner_count);
                inner_scheduler.schedule_after(
                    Duration::from_secs(1),
                    Box::new(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        assert_eq!(scheduler.run_until_idle(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(
            scheduler.delays(),
            vec![Duration::ZERO, Duration::from_secs(1)]
        );
    }

    #[test]
    fn manual_run_next_on_empty_queue() {
        let scheduler = ManualScheduler::new();
        assert!(!scheduler.run_next());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn manual_clear_drops_work() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        scheduler.schedule_after(
            Duration::ZERO,
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        scheduler.clear();
        assert_eq!(scheduler.run_until_idle(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tokio_scheduler_requires_runtime() {
        assert!(matches!(
            TokioScheduler::current(),
            Err(ConfigError::NoRuntime(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tokio_scheduler_runs_after_delay() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let start = tokio::time::Instant::now();
        scheduler.schedule_after(
            Duration::from_millis(20),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        rx.await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
