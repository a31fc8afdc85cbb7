// Pending Batch Bookkeeping

use tokio::task::JoinHandle;

use super::QueuedUnit;

/// Units accumulating under one batch key, waiting to flush
///
/// At most one pending batch exists per key. The idle timer is replaced on
/// every arrival; `generation` lets a superseded timer detect that it lost
/// the race even if its abort arrived too late.
pub(super) struct PendingBatch<T> {
    pub units: Vec<QueuedUnit<T>>,
    pub generation: u64,
    pub timer: Option<JoinHandle<()>>,
}

impl<T> PendingBatch<T> {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            generation: 0,
            timer: None,
        }
    }

    /// Stop the idle timer, if one is scheduled
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
