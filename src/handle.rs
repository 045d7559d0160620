use crate::error::PoolError;
use crate::task::TaskCell;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_intrusive::channel::shared::OneshotBroadcastReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A handle to a task submitted to the `WorkerPoolManager`.
///
/// The executing worker is the sole writer of the underlying one-shot result
/// cell; handles are readers. Handles are cheap to clone, and every clone (or
/// repeated call on the same handle) observes the identical terminal outcome.
///
/// `await_result` is a deliberate synchronous wait point: the caller parks
/// until the task is terminal. Callers that never need the outcome should
/// prefer fire-and-forget submission and avoid the wait entirely.
#[derive(Clone)]
pub struct TaskHandle<R: Send + Clone + 'static> {
  pub(crate) task_id: u64,
  pub(crate) cancellation_token: CancellationToken,
  pub(crate) cell: Arc<TaskCell>,
  pub(crate) result_receiver: OneshotBroadcastReceiver<Result<R, PoolError>>,
}

impl<R: Send + Clone + 'static> fmt::Debug for TaskHandle<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskHandle")
      .field("task_id", &self.task_id)
      .finish_non_exhaustive()
  }
}

impl<R: Send + Clone + 'static> TaskHandle<R> {
  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Checks if cancellation has been requested for this task via its token.
  pub fn is_cancellation_requested(&self) -> bool {
    self.cancellation_token.is_cancelled()
  }

  /// Requests cancellation of this task.
  ///
  /// Returns `true` if the request arrived before any worker claimed the
  /// task: the action will then never execute, and the handle resolves to
  /// `PoolError::Cancelled`. Returns `false` if the task had already started
  /// (or finished); in that case cancellation is best-effort and cooperative,
  /// via the token the action received.
  pub fn cancel(&self) -> bool {
    let before_start = self.cell.try_cancel_early();
    self.cancellation_token.cancel();
    if before_start {
      debug!(task_id = %self.task_id, "TaskHandle: Task cancelled before it started.");
    } else {
      debug!(task_id = %self.task_id, "TaskHandle: Cancellation requested; task may already be running.");
    }
    before_start
  }

  /// Waits until the task reaches a terminal state and returns its outcome.
  ///
  /// # Errors
  /// Returns `PoolError::TaskFailed` if the action panicked,
  /// `PoolError::Cancelled` if the task was cancelled, and
  /// `PoolError::ResultChannelClosed` if the result cell was dropped without
  /// a terminal write (e.g. the pool was dropped with the task still queued).
  pub async fn await_result(&self) -> Result<R, PoolError> {
    match self.result_receiver.receive().await {
      Some(outcome) => outcome,
      None => {
        warn!(task_id = %self.task_id, "Result cell closed without a terminal write.");
        Err(PoolError::ResultChannelClosed)
      }
    }
  }

  /// Like [`await_result`](Self::await_result), but gives up with
  /// `PoolError::Timeout` once `timeout` elapses. The task itself is not
  /// cancelled by a timed-out wait and may still be awaited again.
  pub async fn await_result_timeout(&self, timeout: Duration) -> Result<R, PoolError> {
    match tokio::time::timeout(timeout, self.await_result()).await {
      Ok(outcome) => outcome,
      Err(_elapsed) => Err(PoolError::Timeout),
    }
  }
}
