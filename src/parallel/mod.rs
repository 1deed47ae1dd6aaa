//! Per-batch parallelism: the worker pool and the shared failure collection.

mod failures;
mod pool;

pub use failures::BatchFailures;
pub use pool::{PoolError, WorkerPool};
