use crate::error::PoolError;
use crate::handle::TaskHandle;
use crate::task::{ManagedTask, TaskCell, TaskFuture};
use crate::task_queue::{QueueConsumer, QueueProducer, TaskQueue};
use crate::worker::{self, WorkerState, WorkerStatus};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures_intrusive::channel::shared::oneshot_broadcast_channel;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Defines what happens to queued-but-unstarted tasks on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Runs every task already in the queue to completion before terminating.
  Drain,
  /// Lets tasks that are already running finish, but discards queued tasks;
  /// their handles resolve to `PoolError::Cancelled` without running.
  DiscardQueued,
}

/// Pool lifecycle. Transitions are monotonic:
/// `Running` → `ShuttingDown` → `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLifecycle {
  Running,
  ShuttingDown,
  Terminated,
}

/// The lifecycle flag and the queue producer live under one lock so that the
/// accepting-check and queue closure are a single atomic step. Without this a
/// task could slip into the queue after shutdown decided to close it.
struct AdmissionGate<R: Send + Clone + 'static> {
  lifecycle: PoolLifecycle,
  producer: Option<QueueProducer<R>>,
}

/// A pool of persistent workers sharing one FIFO task queue.
///
/// Construction spawns every worker immediately; no execution context is ever
/// created per task. When all workers are busy, tasks simply wait in the
/// queue in submission order.
pub struct WorkerPoolManager<R: Send + Clone + 'static> {
  pool_name: Arc<String>,
  gate: RwLock<AdmissionGate<R>>,
  consumer: Arc<QueueConsumer<R>>,
  discard_token: CancellationToken,
  terminated_token: CancellationToken,
  worker_states: Vec<Arc<WorkerState>>,
  worker_joins: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: Send + Clone + 'static> WorkerPoolManager<R> {
  /// Creates the pool and starts `worker_count` workers immediately.
  /// A `worker_count` of zero is clamped to one.
  pub fn new(worker_count: usize, tokio_handle: TokioHandle, pool_name: &str) -> Arc<Self> {
    let worker_count = worker_count.max(1);
    let (producer, consumer) = TaskQueue::new().split();
    let consumer = Arc::new(consumer);
    let discard_token = CancellationToken::new();
    let pool_name_arc = Arc::new(pool_name.to_string());

    let mut worker_states = Vec::with_capacity(worker_count);
    let mut worker_joins = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
      let state = Arc::new(WorkerState::new(worker_id));
      let join = tokio_handle.spawn(
        worker::run_worker_loop(
          pool_name_arc.clone(),
          state.clone(),
          consumer.clone(),
          discard_token.clone(),
        )
        .instrument(info_span!("crew_worker", name = %pool_name, worker_id)),
      );
      worker_states.push(state);
      worker_joins.push(join);
    }

    info!(name = %pool_name, worker_count, "Worker pool started.");

    Arc::new(Self {
      pool_name: pool_name_arc,
      gate: RwLock::new(AdmissionGate {
        lifecycle: PoolLifecycle::Running,
        producer: Some(producer),
      }),
      consumer,
      discard_token,
      terminated_token: CancellationToken::new(),
      worker_states,
      worker_joins: Mutex::new(worker_joins),
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// Number of workers the pool was constructed with. Fixed for the pool's
  /// whole life; elastic sizing is out of scope.
  pub fn worker_count(&self) -> usize {
    self.worker_states.len()
  }

  /// Returns the current number of tasks waiting in the queue.
  pub fn queued_task_count(&self) -> usize {
    self.consumer.len()
  }

  pub fn lifecycle(&self) -> PoolLifecycle {
    self.gate.read().lifecycle
  }

  /// A snapshot of each worker's status, indexed by worker id.
  pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
    self.worker_states.iter().map(|state| state.status()).collect()
  }

  /// Submits a result-bearing task and returns its handle without blocking.
  ///
  /// The action receives the task's own `CancellationToken` so it can check
  /// for cooperative cancellation while it runs; its future is boxed into a
  /// [`TaskFuture`] before queuing.
  ///
  /// # Errors
  /// Fails with `PoolError::PoolTerminated` once the pool has left its
  /// `Running` lifecycle.
  pub fn submit<F, Fut>(&self, action: F) -> Result<TaskHandle<R>, PoolError>
  where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
  {
    let task_id = NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let token = CancellationToken::new();
    let cell = Arc::new(TaskCell::new());
    let (result_tx, result_rx) = oneshot_broadcast_channel::<Result<R, PoolError>>();

    self.enqueue(ManagedTask {
      task_id,
      action: Box::new(move |task_token| {
        let task_future: TaskFuture<R> = Box::pin(action(task_token));
        task_future
      }),
      token: token.clone(),
      cell: cell.clone(),
      result_sender: Some(result_tx),
    })?;

    debug!(name = %self.pool_name, %task_id, "Submitted task with result handle.");
    Ok(TaskHandle {
      task_id,
      cancellation_token: token,
      cell,
      result_receiver: result_rx,
    })
  }

  /// Submits a fire-and-forget task: no handle is created, and a failing or
  /// cancelled run is only observable through the log.
  ///
  /// # Errors
  /// Fails with `PoolError::PoolTerminated` once the pool has left its
  /// `Running` lifecycle.
  pub fn execute<F, Fut>(&self, action: F) -> Result<(), PoolError>
  where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
  {
    let task_id = NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);

    self.enqueue(ManagedTask {
      task_id,
      action: Box::new(move |task_token| {
        let task_future: TaskFuture<R> = Box::pin(action(task_token));
        task_future
      }),
      token: CancellationToken::new(),
      cell: Arc::new(TaskCell::new()),
      result_sender: None,
    })?;

    debug!(name = %self.pool_name, %task_id, "Submitted fire-and-forget task.");
    Ok(())
  }

  fn enqueue(&self, task: ManagedTask<R>) -> Result<(), PoolError> {
    let gate = self.gate.read();
    if gate.lifecycle != PoolLifecycle::Running {
      warn!(name = %self.pool_name, "Rejected submission: pool is no longer running.");
      return Err(PoolError::PoolTerminated);
    }
    // The producer lives exactly as long as the `Running` lifecycle; both
    // are flipped together under the write lock in `shutdown`.
    match &gate.producer {
      Some(producer) => producer.push(task),
      None => Err(PoolError::PoolTerminated),
    }
  }

  /// Shuts the pool down and waits until it is `Terminated`.
  ///
  /// The first caller flips the lifecycle to `ShuttingDown` and closes the
  /// queue; submissions from that point fail with `PoolError::PoolTerminated`.
  /// With `ShutdownMode::Drain`, workers first run every already-queued task
  /// to completion. With `ShutdownMode::DiscardQueued`, workers stop after
  /// their current task and every still-queued task resolves to
  /// `PoolError::Cancelled` without running. Concurrent callers all return
  /// once termination is complete.
  pub async fn shutdown(&self, mode: ShutdownMode) -> Result<(), PoolError> {
    let initiated = {
      let mut gate = self.gate.write();
      match gate.lifecycle {
        PoolLifecycle::Running => {
          gate.lifecycle = PoolLifecycle::ShuttingDown;
          // Dropping the producer closes the queue; workers observe `None`
          // from claim() once the backlog is gone.
          gate.producer = None;
          true
        }
        _ => false,
      }
    };

    if !initiated {
      info!(name = %self.pool_name, "Shutdown already in progress; waiting for termination.");
      self.terminated_token.cancelled().await;
      return Ok(());
    }

    info!(name = %self.pool_name, ?mode, "Initiating pool shutdown.");
    if mode == ShutdownMode::DiscardQueued {
      self.discard_token.cancel();
    }

    let joins: Vec<JoinHandle<()>> = self.worker_joins.lock().drain(..).collect();
    for join in joins {
      if let Err(join_error) = join.await {
        error!(name = %self.pool_name, "Worker loop panicked before shutdown completed: {:?}", join_error);
      }
    }

    // Anything still queued was never claimed (discard mode, or a worker loop
    // that died). Resolve those handles so every submission reaches a
    // terminal state.
    let leftover = self.consumer.drain_now().await;
    for task in leftover {
      task.cell.try_cancel_early();
      debug!(name = %self.pool_name, task_id = task.task_id, "Discarding queued task at shutdown.");
      if let Some(result_tx) = task.result_sender {
        let _ = result_tx.send(Err(PoolError::Cancelled));
      }
    }

    self.gate.write().lifecycle = PoolLifecycle::Terminated;
    self.terminated_token.cancel();
    info!(name = %self.pool_name, "Pool terminated.");
    Ok(())
  }
}

impl<R: Send + Clone + 'static> Drop for WorkerPoolManager<R> {
  fn drop(&mut self) {
    // Drop must not block, so workers are signalled but never joined here.
    // Queued tasks are dropped with the queue; their handles, if any reader
    // is somehow still alive, observe `ResultChannelClosed`.
    let mut gate = self.gate.write();
    if gate.lifecycle == PoolLifecycle::Running {
      info!(
        name = %*self.pool_name,
        "WorkerPoolManager dropped without explicit shutdown. Signalling workers to stop."
      );
      gate.lifecycle = PoolLifecycle::ShuttingDown;
      gate.producer = None;
      self.discard_token.cancel();
    }
  }
}
