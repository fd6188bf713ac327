//! Caller-side view of one submitted task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;

use super::ExecutorError;

/// Lifecycle of a submitted task.
///
/// ```text
/// Pending ─▶ Attempting ─┬─▶ Succeeded
///                ▲       ├─▶ RetryScheduled ─┐
///                └───────┼───────────────────┘
///                        └─▶ Failed
/// ```
///
/// `Cancelled` may be entered from any non-terminal state once the handle
/// has been cancelled and the executor next looks at the task.
///
/// `Abandoned` is recorded by the handle itself, the first time it finds that
/// the scheduler dropped the task without resolving it. Until the handle is
/// polled, waited on or asked via [`TaskHandle::try_result`], the state keeps
/// the last value the executor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Attempting = 1,
    RetryScheduled = 2,
    Succeeded = 3,
    Failed = 4,
    Cancelled = 5,
    Abandoned = 6,
}

impl TaskState {
    /// Returns `true` for states the task never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Abandoned
        )
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Attempting,
            2 => Self::RetryScheduled,
            3 => Self::Succeeded,
            4 => Self::Failed,
            5 => Self::Cancelled,
            6 => Self::Abandoned,
            _ => Self::Pending,
        }
    }
}

// Shared between the handle and the retry chain.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TaskState::Pending as u8))
    }

    pub(crate) fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// The result container returned by
/// [`ResilientExecutor::submit`](super::ResilientExecutor::submit).
///
/// A handle resolves exactly once: with the task's value after a successful
/// attempt, or with an [`ExecutorError`] once the task is given up. It can be
/// `.await`ed, waited on from synchronous code with [`wait`](Self::wait), or
/// polled without blocking with [`try_result`](Self::try_result).
///
/// Dropping the handle does not stop the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, ExecutorError>>,
    cancel: CancellationToken,
    state: Arc<StateCell>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        rx: oneshot::Receiver<Result<T, ExecutorError>>,
        cancel: CancellationToken,
        state: Arc<StateCell>,
    ) -> Self {
        Self { rx, cancel, state }
    }

    /// Current lifecycle state of the task.
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Asks the executor to stop the task.
    ///
    /// The request is honoured before the next attempt starts; an attempt
    /// already running is allowed to finish. A task stopped this way resolves
    /// to [`ExecutorError::Cancelled`] and its failure handler does not run.
    /// If it had already failed at least once, the executor's failure counter
    /// is reset.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Blocks the calling thread until the task resolves.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context; use
    /// `.await` there instead.
    pub fn wait(self) -> Result<T, ExecutorError> {
        let Self { rx, state, .. } = self;
        match rx.blocking_recv() {
            Ok(outcome) => outcome,
            Err(_) => Self::abandoned_with(&state),
        }
    }

    /// Returns the outcome if the task has already resolved, without waiting.
    pub fn try_result(&mut self) -> Option<Result<T, ExecutorError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(self.abandoned()),
        }
    }

    fn abandoned(&self) -> Result<T, ExecutorError> {
        Self::abandoned_with(&self.state)
    }

    fn abandoned_with(state: &StateCell) -> Result<T, ExecutorError> {
        state.set(TaskState::Abandoned);
        Err(ExecutorError::Abandoned)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, ExecutorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let received = Pin::new(&mut self.rx).poll(cx);
        received.map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => self.abandoned(),
        })
    }
}
