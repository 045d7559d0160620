use thiserror::Error;

/// Errors surfaced by the pool, its queue, and task handles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  /// The task queue was closed; nothing further can be enqueued.
  #[error("Task queue is closed, cannot enqueue further tasks")]
  QueueClosed,

  /// The pool left its `Running` lifecycle; submissions are rejected.
  #[error("Pool is shutting down or terminated, cannot accept new tasks")]
  PoolTerminated,

  /// The task's action panicked. The panic is captured and isolated; the
  /// worker that ran the task keeps serving.
  #[error("Task failed: {0}")]
  TaskFailed(String),

  /// A bounded wait on a handle elapsed before the task reached a terminal
  /// state. The task itself keeps running.
  #[error("Timed out waiting for task result")]
  Timeout,

  /// The task was cancelled, either before it started or cooperatively while
  /// running.
  #[error("Task was cancelled")]
  Cancelled,

  /// The result cell was dropped without a terminal write, e.g. the pool was
  /// dropped with the task still queued.
  #[error("Task result channel closed without a result")]
  ResultChannelClosed,
}
