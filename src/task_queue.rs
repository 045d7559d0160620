use crate::error::PoolError;
use crate::task::ManagedTask;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;

/// An unbounded FIFO queue of tasks, shared by all submitters and workers.
///
/// The channel's enqueue order is the total order tasks are dequeued in, no
/// matter how many submitters race. Closure happens by dropping the producer;
/// workers observe it as `claim()` yielding `None` once the queue is drained.
pub(crate) struct TaskQueue<R: Send + Clone + 'static> {
  tx: UnboundedSender<ManagedTask<R>>,
  rx: UnboundedReceiver<ManagedTask<R>>,
  depth: Arc<AtomicUsize>,
}

impl<R: Send + Clone + 'static> TaskQueue<R> {
  pub(crate) fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tx,
      rx,
      depth: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Splits the queue into its producer and consumer halves.
  pub(crate) fn split(self) -> (QueueProducer<R>, QueueConsumer<R>) {
    (
      QueueProducer {
        tx: self.tx,
        depth: self.depth.clone(),
      },
      QueueConsumer {
        rx: AsyncMutex::new(self.rx),
        depth: self.depth,
      },
    )
  }
}

/// The producer handle for the `TaskQueue`. Cloneable across submission sites.
#[derive(Clone)]
pub(crate) struct QueueProducer<R: Send + Clone + 'static> {
  tx: UnboundedSender<ManagedTask<R>>,
  depth: Arc<AtomicUsize>,
}

impl<R: Send + Clone + 'static> fmt::Debug for QueueProducer<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueueProducer")
      .field("len", &self.len())
      .finish_non_exhaustive()
  }
}

impl<R: Send + Clone + 'static> QueueProducer<R> {
  /// Appends a task in FIFO position and wakes one waiting worker.
  pub(crate) fn push(&self, task: ManagedTask<R>) -> Result<(), PoolError> {
    // Count before sending so a concurrent claim can never underflow.
    self.depth.fetch_add(1, Ordering::SeqCst);
    if self.tx.send(task).is_err() {
      self.depth.fetch_sub(1, Ordering::SeqCst);
      return Err(PoolError::QueueClosed);
    }
    Ok(())
  }

  /// Number of tasks currently waiting in the queue.
  pub(crate) fn len(&self) -> usize {
    self.depth.load(Ordering::SeqCst)
  }
}

/// The consumer half, shared by every worker behind an async mutex. The lock
/// is only held while claiming, never while a task runs.
pub(crate) struct QueueConsumer<R: Send + Clone + 'static> {
  rx: AsyncMutex<UnboundedReceiver<ManagedTask<R>>>,
  depth: Arc<AtomicUsize>,
}

impl<R: Send + Clone + 'static> fmt::Debug for QueueConsumer<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueueConsumer")
      .field("len", &self.len())
      .finish_non_exhaustive()
  }
}

impl<R: Send + Clone + 'static> QueueConsumer<R> {
  /// Blocks the calling worker until a task is available. Yields `None` once
  /// the producer side is gone and every queued task has been claimed, which
  /// is the worker's signal that no more work will ever arrive.
  pub(crate) async fn claim(&self) -> Option<ManagedTask<R>> {
    let mut rx = self.rx.lock().await;
    let task = rx.recv().await;
    if task.is_some() {
      self.depth.fetch_sub(1, Ordering::SeqCst);
    }
    task
  }

  /// Closes the consumer and returns every still-queued task, for shutdown
  /// paths that must resolve their handles without running them.
  pub(crate) async fn drain_now(&self) -> Vec<ManagedTask<R>> {
    let mut rx = self.rx.lock().await;
    rx.close();
    let mut leftover = Vec::new();
    while let Ok(task) = rx.try_recv() {
      self.depth.fetch_sub(1, Ordering::SeqCst);
      leftover.push(task);
    }
    leftover
  }

  /// Number of tasks currently waiting in the queue.
  pub(crate) fn len(&self) -> usize {
    self.depth.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::{TaskCell, TaskFuture};
  use futures_intrusive::channel::shared::oneshot_broadcast_channel;
  use tokio_util::sync::CancellationToken;

  // Helper to create a dummy ManagedTask for testing the queue.
  fn dummy_task(id: u64) -> ManagedTask<String> {
    let (tx, _rx) = oneshot_broadcast_channel();
    ManagedTask {
      task_id: id,
      action: Box::new(|_token| {
        let task_future: TaskFuture<String> = Box::pin(async move { "done".to_string() });
        task_future
      }),
      token: CancellationToken::new(),
      cell: Arc::new(TaskCell::new()),
      result_sender: Some(tx),
    }
  }

  #[tokio::test]
  async fn test_queue_push_claim_fifo() {
    let queue = TaskQueue::<String>::new();
    let (producer, consumer) = queue.split();

    for id in 0..3 {
      producer.push(dummy_task(id)).unwrap();
    }
    assert_eq!(producer.len(), 3);

    for id in 0..3 {
      let task = consumer.claim().await.unwrap();
      assert_eq!(task.task_id, id);
    }
    assert_eq!(consumer.len(), 0);
  }

  #[tokio::test]
  async fn test_claim_yields_none_after_close_and_drain() {
    let queue = TaskQueue::<String>::new();
    let (producer, consumer) = queue.split();

    producer.push(dummy_task(7)).unwrap();
    drop(producer);

    assert_eq!(consumer.claim().await.unwrap().task_id, 7);
    assert!(consumer.claim().await.is_none());
  }

  #[tokio::test]
  async fn test_push_after_close_is_rejected() {
    let queue = TaskQueue::<String>::new();
    let (producer, consumer) = queue.split();

    let _ = consumer.drain_now().await;
    let result = producer.push(dummy_task(1));
    assert!(matches!(result, Err(PoolError::QueueClosed)));
    assert_eq!(producer.len(), 0);
  }

  #[tokio::test]
  async fn test_drain_now_returns_leftovers_in_order() {
    let queue = TaskQueue::<String>::new();
    let (producer, consumer) = queue.split();

    for id in 0..4 {
      producer.push(dummy_task(id)).unwrap();
    }
    assert_eq!(consumer.claim().await.unwrap().task_id, 0);

    let leftover = consumer.drain_now().await;
    let ids: Vec<u64> = leftover.iter().map(|t| t.task_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(consumer.len(), 0);
  }
}
