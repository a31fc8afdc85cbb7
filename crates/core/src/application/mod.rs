// Application Layer - Queue, pool and retry services

pub mod pool;
pub mod queue;
pub mod retry;
pub mod shutdown;

pub use pool::{ClientPool, PoolConfig, PoolJanitor};
pub use queue::{EnqueueOptions, QueueConfig, QueueStats, RequestQueue, Submission};
pub use retry::{retry_with_backoff, retry_with_backoff_observed, BackoffPolicy, Retryable};
pub use shutdown::{ShutdownController, ShutdownSignal};
