use crate::error::PoolError;
use crate::task::ManagedTask;
use crate::task_queue::QueueConsumer;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use futures_intrusive::channel::shared::OneshotBroadcastSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Observable status of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
  /// Waiting to claim the next task.
  Idle,
  /// Currently running a task.
  Busy,
  /// Exited its loop; the worker will never run another task.
  Stopped,
}

const STATUS_IDLE: u8 = 0;
const STATUS_BUSY: u8 = 1;
const STATUS_STOPPED: u8 = 2;

/// Per-worker state owned by the manager. Never shared between workers.
#[derive(Debug)]
pub(crate) struct WorkerState {
  pub(crate) id: usize,
  status: AtomicU8,
}

impl WorkerState {
  pub(crate) fn new(id: usize) -> Self {
    Self {
      id,
      status: AtomicU8::new(STATUS_IDLE),
    }
  }

  pub(crate) fn status(&self) -> WorkerStatus {
    match self.status.load(Ordering::Acquire) {
      STATUS_BUSY => WorkerStatus::Busy,
      STATUS_STOPPED => WorkerStatus::Stopped,
      _ => WorkerStatus::Idle,
    }
  }

  fn set(&self, status: WorkerStatus) {
    let raw = match status {
      WorkerStatus::Idle => STATUS_IDLE,
      WorkerStatus::Busy => STATUS_BUSY,
      WorkerStatus::Stopped => STATUS_STOPPED,
    };
    self.status.store(raw, Ordering::Release);
  }
}

/// The persistent worker loop: claim a task, run it, resolve its handle,
/// repeat. Exits when the queue is closed and drained, or when the pool's
/// discard signal fires between tasks. A task that is already running when
/// the discard signal fires is allowed to finish.
pub(crate) async fn run_worker_loop<R: Send + Clone + 'static>(
  pool_name: Arc<String>,
  state: Arc<WorkerState>,
  consumer: Arc<QueueConsumer<R>>,
  discard_token: CancellationToken,
) {
  debug!(name = %*pool_name, worker_id = state.id, "Worker started.");

  loop {
    let claimed = tokio::select! {
      biased;

      _ = discard_token.cancelled() => {
        info!(name = %*pool_name, worker_id = state.id, "Discard signal received. Worker loop terminating.");
        None
      }

      task = consumer.claim() => task,
    };

    match claimed {
      Some(task) => {
        let task_id = task.task_id;
        run_task(pool_name.as_str(), &state, task)
          .instrument(info_span!("crew_task", name = %*pool_name, worker_id = state.id, %task_id))
          .await;
      }
      None => break,
    }
  }

  state.set(WorkerStatus::Stopped);
  debug!(name = %*pool_name, worker_id = state.id, "Worker stopped.");
}

async fn run_task<R: Send + Clone + 'static>(
  pool_name: &str,
  state: &Arc<WorkerState>,
  task: ManagedTask<R>,
) {
  let task_id = task.task_id;

  if !task.cell.try_begin() {
    debug!(name = %pool_name, %task_id, "Dequeued task was cancelled before it started.");
    resolve(pool_name, task_id, task.result_sender, Err(PoolError::Cancelled));
    return;
  }

  state.set(WorkerStatus::Busy);
  let token = task.token;
  // Invoking the action here, not at submission time, is what guarantees an
  // early-cancelled task never executes any of its code.
  let task_future = (task.action)(token.clone());

  let outcome: Result<R, PoolError> = tokio::select! {
    biased;

    _ = token.cancelled() => {
      debug!(name = %pool_name, %task_id, "Task run cancelled via its token.");
      Err(PoolError::Cancelled)
    }

    run_result = AssertUnwindSafe(task_future).catch_unwind() => {
      match run_result {
        Ok(value) => {
          trace!(name = %pool_name, %task_id, "Task ran to completion.");
          Ok(value)
        }
        Err(panic_payload) => {
          error!(name = %pool_name, %task_id, "Task panicked during execution.");
          Err(PoolError::TaskFailed(panic_message(panic_payload)))
        }
      }
    }
  };

  task.cell.finish();
  resolve(pool_name, task_id, task.result_sender, outcome);
  state.set(WorkerStatus::Idle);
}

/// Writes the terminal outcome into the task's handle, if one exists. A
/// fire-and-forget task has no handle, so its failure is only logged.
fn resolve<R: Send + Clone + 'static>(
  pool_name: &str,
  task_id: u64,
  sender: Option<OneshotBroadcastSender<Result<R, PoolError>>>,
  outcome: Result<R, PoolError>,
) {
  match sender {
    Some(tx) => {
      if tx.send(outcome).is_err() {
        trace!(name = %pool_name, %task_id, "Every handle for task was dropped before the result was read.");
      }
    }
    None => {
      if let Err(task_error) = outcome {
        warn!(name = %pool_name, %task_id, "Fire-and-forget task did not complete cleanly: {}", task_error);
      }
    }
  }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "task panicked".to_string()
  }
}
