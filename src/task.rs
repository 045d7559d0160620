use crate::error::PoolError;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_intrusive::channel::shared::OneshotBroadcastSender;
use tokio_util::sync::CancellationToken;

/// The type of future a worker drives to completion for one task.
/// It must be `Send` and `'static`, and produce a result of type `R`.
pub type TaskFuture<R> = Pin<Box<dyn Future<Output = R> + Send + 'static>>;

/// A boxed task action, invoked by the claiming worker with the task's own
/// cancellation token to produce the future to run.
///
/// Taking the token as a parameter makes cooperative cancellation explicit in
/// the signature: an action that wants to stop early checks the token itself.
/// Actions that ignore it are still raced against the token between their
/// await points.
pub(crate) type TaskAction<R> = Box<dyn FnOnce(CancellationToken) -> TaskFuture<R> + Send + 'static>;

const PHASE_QUEUED: u8 = 0;
const PHASE_RUNNING: u8 = 1;
const PHASE_CANCELLED_EARLY: u8 = 2;
const PHASE_FINISHED: u8 = 3;

/// Arbitrates who gets a queued task: the claiming worker or an early cancel.
///
/// Exactly one of `try_begin` / `try_cancel_early` can succeed for a given
/// task, so an action never runs twice and never runs after a successful
/// cancel-before-start.
#[derive(Debug)]
pub(crate) struct TaskCell {
  phase: AtomicU8,
}

impl TaskCell {
  pub(crate) fn new() -> Self {
    Self {
      phase: AtomicU8::new(PHASE_QUEUED),
    }
  }

  /// Claims the task for execution. Fails if it was cancelled before starting.
  pub(crate) fn try_begin(&self) -> bool {
    self
      .phase
      .compare_exchange(PHASE_QUEUED, PHASE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Cancels the task before any worker has claimed it.
  pub(crate) fn try_cancel_early(&self) -> bool {
    self
      .phase
      .compare_exchange(
        PHASE_QUEUED,
        PHASE_CANCELLED_EARLY,
        Ordering::AcqRel,
        Ordering::Acquire,
      )
      .is_ok()
  }

  /// Marks the run as over, whatever the outcome was.
  pub(crate) fn finish(&self) {
    self.phase.store(PHASE_FINISHED, Ordering::Release);
  }
}

/// Internal representation of a task while it sits in the queue or runs.
///
/// Owned by the queue until a worker claims it; ownership then transfers to
/// that worker for the duration of the run.
pub(crate) struct ManagedTask<R: Send + Clone + 'static> {
  pub(crate) task_id: u64,
  pub(crate) action: TaskAction<R>,
  pub(crate) token: CancellationToken,
  pub(crate) cell: Arc<TaskCell>,
  /// `None` for fire-and-forget submissions.
  pub(crate) result_sender: Option<OneshotBroadcastSender<Result<R, PoolError>>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_begin_wins_over_late_cancel() {
    let cell = TaskCell::new();
    assert!(cell.try_begin());
    assert!(!cell.try_cancel_early());
    cell.finish();
    assert!(!cell.try_begin());
  }

  #[test]
  fn test_early_cancel_blocks_begin() {
    let cell = TaskCell::new();
    assert!(cell.try_cancel_early());
    assert!(!cell.try_begin());
    // A second cancel attempt does not win again.
    assert!(!cell.try_cancel_early());
  }
}
