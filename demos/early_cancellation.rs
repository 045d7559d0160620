use futures_crew::{ShutdownMode, WorkerPoolManager};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Early Cancellation Example ---");

  // One worker, so a second submission has to wait in the queue.
  let manager = WorkerPoolManager::<String>::new(1, Handle::current(), "cancel_pool");

  let blocker = manager
    .submit(|_token| async move {
      info!("Blocker task occupying the only worker for 500ms.");
      tokio::time::sleep(Duration::from_millis(500)).await;
      "blocker done".to_string()
    })
    .expect("pool is running");

  // Give the blocker a moment to be claimed.
  tokio::time::sleep(Duration::from_millis(50)).await;

  let queued = manager
    .submit(|_token| async move {
      info!("This line should never be reached.");
      "queued task ran".to_string()
    })
    .expect("pool is running");

  // The queued task has not started; cancelling it now is definitive.
  let cancelled_early = queued.cancel();
  info!("Cancel before start took effect: {}", cancelled_early);

  info!("Queued task outcome: {:?}", queued.await_result().await);
  info!("Blocker outcome: {:?}", blocker.await_result().await);

  // A running task can only be cancelled cooperatively, through the token
  // its action receives.
  let cooperative = manager
    .submit(|token| async move {
      loop {
        if token.is_cancelled() {
          info!("Cooperative task observed its token, stopping early.");
          return "stopped early".to_string();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
      }
    })
    .expect("pool is running");

  tokio::time::sleep(Duration::from_millis(100)).await;
  let was_early = cooperative.cancel();
  info!("Cancel of the running task was early: {}", was_early);
  info!("Cooperative task outcome: {:?}", cooperative.await_result().await);

  manager
    .shutdown(ShutdownMode::Drain)
    .await
    .expect("shutdown should succeed");
  info!("Example finished.");
}
