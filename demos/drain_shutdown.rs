use futures_crew::{PoolError, ShutdownMode, WorkerPoolManager};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Drain vs. Discard Shutdown Example ---");

  // Drain: everything already submitted runs to completion.
  let drain_pool = WorkerPoolManager::<u64>::new(2, Handle::current(), "drain_pool");
  let mut handles = Vec::new();
  for i in 0..4u64 {
    let handle = drain_pool
      .submit(move |_token| async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        info!("Drain pool task {} finished.", i);
        i * 10
      })
      .expect("pool is running");
    handles.push(handle);
  }

  drain_pool
    .shutdown(ShutdownMode::Drain)
    .await
    .expect("shutdown should succeed");
  info!("Drain shutdown returned; every task is terminal.");
  for handle in handles {
    info!("Drained task {} result: {:?}", handle.id(), handle.await_result().await);
  }

  match drain_pool.submit(|_token| async move { 0 }) {
    Err(PoolError::PoolTerminated) => info!("Late submission correctly rejected."),
    other => info!("Unexpected late submission outcome: {:?}", other),
  }

  // Discard: the running task finishes, queued tasks resolve Cancelled.
  let discard_pool = WorkerPoolManager::<u64>::new(1, Handle::current(), "discard_pool");
  let running = discard_pool
    .submit(|_token| async move {
      tokio::time::sleep(Duration::from_millis(300)).await;
      info!("Discard pool running task finished.");
      1
    })
    .expect("pool is running");
  tokio::time::sleep(Duration::from_millis(50)).await;

  let queued = discard_pool
    .submit(|_token| async move {
      info!("This queued task should never run.");
      2
    })
    .expect("pool is running");

  discard_pool
    .shutdown(ShutdownMode::DiscardQueued)
    .await
    .expect("shutdown should succeed");
  info!("Running task outcome: {:?}", running.await_result().await);
  info!("Queued task outcome: {:?}", queued.await_result().await);

  info!("Example finished.");
}
