// Pool Janitor
// Periodic eviction passes for the client pool, run in the background

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info};

use crate::application::shutdown::ShutdownSignal;

use super::ClientPool;

/// Background eviction loop for a [`ClientPool`]
///
/// Spawn `run()` once from the composition root; it performs one cleanup
/// pass per interval until shutdown is signaled.
pub struct PoolJanitor {
    pool: Arc<ClientPool>,
    cadence: Duration,
}

impl PoolJanitor {
    pub fn new(pool: Arc<ClientPool>, cadence: Duration) -> Self {
        Self { pool, cadence }
    }

    /// Run eviction passes until shutdown
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            cadence_secs = self.cadence.as_secs(),
            "Pool janitor started"
        );

        let mut tick = interval(self.cadence);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let evicted = self.pool.cleanup();
                    debug!(evicted, pooled = self.pool.len(), "Janitor pass completed");
                }
                _ = shutdown.triggered() => {
                    info!("Pool janitor stopping");
                    break;
                }
            }
        }
    }

    /// Single immediate pass (manual trigger)
    pub fn run_now(&self) -> usize {
        self.pool.cleanup()
    }
}
