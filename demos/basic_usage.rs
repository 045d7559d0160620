use futures_crew::{ShutdownMode, TaskHandle, WorkerPoolManager};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn my_task_fn(id: usize, delay_ms: u64) -> String {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  let result = format!("Task {} finished successfully after {}ms", id, delay_ms);
  info!("{}", result);
  result
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let manager = WorkerPoolManager::<String>::new(
    2, // Two persistent workers
    Handle::current(),
    "basic_pool",
  );

  let mut handles: Vec<TaskHandle<String>> = Vec::new();

  for i in 0..5 {
    let task_id: usize = i;
    // Alternate sleep times for variety
    let sleep_duration: u64 = 200 + (i as u64 % 3 * 100);
    match manager.submit(move |_token| my_task_fn(task_id, sleep_duration)) {
      Ok(handle) => {
        info!("Submitted task {} with handle id {}", task_id, handle.id());
        handles.push(handle);
      }
      Err(e) => {
        tracing::error!("Failed to submit task {}: {:?}", task_id, e);
      }
    }
  }

  // A fire-and-forget submission: no handle, outcome only observable in logs.
  manager
    .execute(|_token| async move {
      info!("Fire-and-forget task ran.");
      String::new()
    })
    .expect("pool is running");

  info!("All tasks submitted. Awaiting results...");

  for handle in handles {
    let task_id = handle.id();
    match handle.await_result().await {
      Ok(result) => info!("Result for task {}: {}", task_id, result),
      Err(e) => info!("Error for task {}: {:?}", task_id, e),
    }
  }

  info!("All task results processed. Shutting down pool.");
  manager
    .shutdown(ShutdownMode::Drain)
    .await
    .expect("shutdown should succeed");
  info!("Pool shut down. Example finished.");
}
