//! The resilient executor: retries failing tasks with back-off.
//!
//! Every submitted task moves through the following loop:
//!
//! ```text
//! submit ──▶ scheduler.schedule_after(strategy.next_delay())
//!                 │
//!                 ▼
//!            begin atomic unit ── fails ──▶ resolve Err(Configuration)
//!                 │
//!                 ▼
//!            run task ── Ok ──▶ commit ── Ok ──▶ reset failures, resolve Ok(value)
//!                 │                 │
//!                 └── Err / panic ──┴──▶ rollback, increment failures
//!                                          │
//!                          ceiling reached? ├── no ──▶ schedule again
//!                                          └── yes ─▶ failure handler in its own
//!                                                     unit, resolve Err(RetriesExhausted)
//! ```
//!
//! A retry is always a fresh unit of work handed back to the scheduler, never
//! a nested call, so a long retry chain neither grows the stack nor blocks a
//! thread while it waits.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::BoxError;
use crate::atomic_unit::{AtomicUnit, AtomicUnitProvider};
use crate::backoff::BackoffStrategy;
use crate::scheduler::Scheduler;

pub mod handle;

pub use handle::{TaskHandle, TaskState};

use handle::StateCell;

/// Why a task resolved without a value.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// No atomic unit could be opened, so the task was never run.
    #[error("no atomic unit could be opened: {source}")]
    Configuration {
        #[source]
        source: BoxError,
    },

    /// Every permitted attempt failed. `source` is the error of the last one.
    #[error("task failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("task was cancelled")]
    Cancelled,

    /// The scheduler dropped the task without running it.
    #[error("task was abandoned by the scheduler")]
    Abandoned,
}

impl ExecutorError {
    /// The error that made the last attempt fail, if the task got that far.
    pub fn attempt_error(&self) -> Option<&BoxError> {
        match self {
            Self::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A task that panicked instead of returning.
///
/// Panics are treated like any other attempt failure: the attempt is rolled
/// back and retried.
#[derive(Debug, Error)]
#[error("task panicked: {message}")]
pub struct TaskPanicked {
    pub message: String,
}

type Task<T> = Box<dyn Fn() -> Result<T, BoxError> + Send + Sync>;
type FailureHandler = Box<dyn FnOnce(&BoxError) -> Result<(), BoxError> + Send>;

// The sending half of a task's handle, plus what the handle observes.
struct Completion<T> {
    tx: oneshot::Sender<Result<T, ExecutorError>>,
    cancel: CancellationToken,
    state: Arc<StateCell>,
}

impl<T> Completion<T> {
    fn resolve(self, state: TaskState, outcome: Result<T, ExecutorError>) {
        self.state.set(state);
        if self.tx.send(outcome).is_err() {
            debug!(?state, "task resolved after its handle was dropped");
        }
    }

    fn cancelled(self) {
        debug!("task cancelled before its next attempt");
        self.resolve(TaskState::Cancelled, Err(ExecutorError::Cancelled));
    }
}

// Everything one submitted task needs, moved from attempt to attempt.
struct Submission<T> {
    task: Task<T>,
    on_failure: FailureHandler,
    completion: Completion<T>,
    // Attempts of this task alone; the strategy's counter is executor-wide.
    attempts: u32,
}

struct Inner {
    strategy: Box<dyn BackoffStrategy>,
    scheduler: Arc<dyn Scheduler>,
    units: Arc<dyn AtomicUnitProvider>,
}

/// Runs tasks on a [`Scheduler`], retrying failures according to a
/// [`BackoffStrategy`] and wrapping every attempt in an atomic unit.
///
/// The executor owns its strategy, so all tasks submitted through one
/// executor share one failure counter. Use one executor per call site.
/// Cloning is cheap and yields a handle to the same executor.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use resilex::{ResilientExecutor, TaskState};
/// use resilex::atomic_unit::NoopAtomicUnits;
/// use resilex::backoff::PolynomialBackoff;
/// use resilex::scheduler::ManualScheduler;
///
/// let scheduler = Arc::new(ManualScheduler::new());
/// let executor = ResilientExecutor::new(
///     Box::new(PolynomialBackoff::default()),
///     scheduler.clone(),
///     Arc::new(NoopAtomicUnits),
/// );
///
/// let mut handle = executor.submit(|| Ok(21 * 2));
/// assert_eq!(handle.state(), TaskState::Pending);
///
/// scheduler.run_until_idle();
/// assert_eq!(handle.try_result().unwrap().unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct ResilientExecutor {
    inner: Arc<Inner>,
}

impl ResilientExecutor {
    pub fn new(
        strategy: Box<dyn BackoffStrategy>,
        scheduler: Arc<dyn Scheduler>,
        units: Arc<dyn AtomicUnitProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                strategy,
                scheduler,
                units,
            }),
        }
    }

    /// The back-off strategy driving this executor.
    pub fn strategy(&self) -> &dyn BackoffStrategy {
        self.inner.strategy.as_ref()
    }

    /// Runs `task` with retries; a terminal failure is only logged.
    pub fn execute<F>(&self, task: F)
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.submit(task);
    }

    /// Runs `task` with retries and calls `on_failure` once they are exhausted.
    pub fn execute_with<F, H>(&self, task: F, on_failure: H)
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
        H: FnOnce(&BoxError) -> Result<(), BoxError> + Send + 'static,
    {
        self.submit_with(task, on_failure);
    }

    /// Schedules `task` and returns a handle to its eventual result.
    ///
    /// When every attempt fails the default handler logs the last error at
    /// `warn` level and the handle resolves to
    /// [`ExecutorError::RetriesExhausted`].
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.submit_with(task, log_failure)
    }

    /// Schedules `task` and returns a handle to its eventual result.
    ///
    /// The first attempt is scheduled after the strategy's current delay,
    /// which is zero unless earlier tasks on this executor are still failing.
    /// Once the retry ceiling is reached `on_failure` runs, inside its own
    /// atomic unit, with the last attempt's error. Whatever `on_failure`
    /// returns, the handle resolves to [`ExecutorError::RetriesExhausted`]
    /// carrying that same attempt error.
    pub fn submit_with<T, F, H>(&self, task: F, on_failure: H) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
        H: FnOnce(&BoxError) -> Result<(), BoxError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let state = Arc::new(StateCell::new());
        let handle = TaskHandle::new(rx, cancel.clone(), Arc::clone(&state));

        self.schedule(Submission {
            task: Box::new(task),
            on_failure: Box::new(on_failure),
            completion: Completion { tx, cancel, state },
            attempts: 0,
        });
        handle
    }

    fn schedule<T: Send + 'static>(&self, submission: Submission<T>) {
        if submission.completion.cancel.is_cancelled() {
            return self.cancelled(submission);
        }

        let delay = self.inner.strategy.next_delay();
        debug!(
            ?delay,
            strategy = self.inner.strategy.name(),
            "scheduling attempt"
        );
        let executor = self.clone();
        self.inner
            .scheduler
            .schedule_after(delay, Box::new(move || executor.attempt(submission)));
    }

    fn attempt<T: Send + 'static>(&self, mut submission: Submission<T>) {
        if submission.completion.cancel.is_cancelled() {
            return self.cancelled(submission);
        }

        let unit = match self.inner.units.begin() {
            Ok(unit) => unit,
            Err(e) => {
                error!(error = %e, "could not open an atomic unit; task will not run");
                return submission.completion.resolve(
                    TaskState::Failed,
                    Err(ExecutorError::Configuration { source: e }),
                );
            }
        };

        submission.attempts += 1;
        submission.completion.state.set(TaskState::Attempting);
        match run_in_unit(unit, || (submission.task)()) {
            Ok(value) => {
                self.inner.strategy.reset_failures();
                submission
                    .completion
                    .resolve(TaskState::Succeeded, Ok(value));
            }
            Err(e) => self.attempt_failed(submission, e),
        }
    }

    fn attempt_failed<T: Send + 'static>(&self, submission: Submission<T>, cause: BoxError) {
        let strategy = &self.inner.strategy;
        strategy.increment_failures();

        if !strategy.has_retries_been_exceeded() {
            info!(
                failures = strategy.failures(),
                delay = strategy.delay(),
                unit = %strategy.time_unit(),
                error = %cause,
                "attempt failed; will retry"
            );
            submission.completion.state.set(TaskState::RetryScheduled);
            return self.schedule(submission);
        }

        info!(
            strategy = strategy.name(),
            max_retries = strategy.max_retries(),
            "maximum retries exceeded; will not try again"
        );
        let Submission {
            on_failure,
            completion,
            attempts,
            ..
        } = submission;
        self.run_failure_handler(on_failure, &cause);
        completion.resolve(
            TaskState::Failed,
            Err(ExecutorError::RetriesExhausted {
                attempts,
                source: cause,
            }),
        );
    }

    // A task that recorded failures leaves the counter clean for the next one.
    fn cancelled<T>(&self, submission: Submission<T>) {
        if submission.attempts > 0 {
            self.inner.strategy.reset_failures();
        }
        submission.completion.cancelled();
    }

    fn run_failure_handler(&self, on_failure: FailureHandler, cause: &BoxError) {
        let unit = match self.inner.units.begin() {
            Ok(unit) => unit,
            Err(e) => {
                error!(error = %e, "could not open an atomic unit for the failure handler");
                return;
            }
        };
        if let Err(e) = run_in_unit(unit, || on_failure(cause)) {
            warn!(error = %e, "error executing failure handler");
        }
    }
}

impl fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("strategy", &self.inner.strategy)
            .finish_non_exhaustive()
    }
}

fn log_failure(e: &BoxError) -> Result<(), BoxError> {
    warn!(error = %e, "failed to execute task using scheduler");
    Ok(())
}

// Commits after successful work; rolls back if the work or the commit fails.
fn run_in_unit<R>(
    mut unit: Box<dyn AtomicUnit>,
    work: impl FnOnce() -> Result<R, BoxError>,
) -> Result<R, BoxError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(work))
        .unwrap_or_else(|payload| Err(Box::new(panicked(payload)) as BoxError))
        .and_then(|value| unit.commit().map(|()| value));

    if outcome.is_err() {
        if let Err(e) = unit.rollback() {
            error!(error = %e, "error performing roll-back");
        }
    }
    outcome
}

fn panicked(payload: Box<dyn Any + Send>) -> TaskPanicked {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    };
    TaskPanicked { message }
}
