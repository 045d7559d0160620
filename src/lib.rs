//! A Tokio-based worker pool running tasks on a fixed crew of persistent
//! workers, with FIFO queuing, result handles, cooperative cancellation and
//! drain-or-discard shutdown.
//!
//! A [`WorkerPoolManager`] owns N persistent workers sharing one FIFO queue.
//! Submitting never spawns anything: a task waits in the queue until an idle
//! worker claims it, and each worker drives its claimed task to completion
//! before claiming the next. Result-bearing submissions return a
//! [`TaskHandle`] for awaiting the outcome (with or without a timeout) and
//! for cancellation; fire-and-forget submissions return nothing and surface
//! failures only through the log.

mod error;
mod handle;
mod manager;
mod task;
mod task_queue;
mod worker;

pub use error::PoolError;
pub use handle::TaskHandle;
pub use manager::{PoolLifecycle, ShutdownMode, WorkerPoolManager};
pub use task::TaskFuture;
pub use worker::WorkerStatus;
