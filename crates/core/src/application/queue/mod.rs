// Batching Request Queue
//
// Bounds concurrency toward the backing store while letting callers coalesce
// bursts of related work (vote writes, clip metadata updates) into contiguous
// blocks. One logical drain loop per queue dispatches units in arrival order;
// a counting semaphore enforces the in-flight ceiling, so waiters are woken
// directly instead of polling.

pub mod constants;

mod batch;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, warn};

use crate::domain::DomainError;
use crate::error::{EngineError, Result};
use crate::port::{IdProvider, TimeProvider};

use batch::PendingBatch;
use constants::*;

/// Queue tuning knobs
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// In-flight ceiling
    pub max_concurrent: usize,
    /// Batch size that triggers an immediate flush
    pub max_batch_size: usize,
    /// Quiet period before a partial batch flushes
    pub batch_idle_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_idle_delay: DEFAULT_BATCH_IDLE_DELAY,
        }
    }
}

/// Per-enqueue options
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Coalesce this unit with others sharing the key
    pub batch_key: Option<String>,
    /// Reserved extension point: accepted, but dispatch is FIFO regardless
    pub priority: Option<i32>,
}

impl EnqueueOptions {
    /// Options that batch under `key`
    pub fn batched(key: impl Into<String>) -> Self {
        Self {
            batch_key: Some(key.into()),
            priority: None,
        }
    }
}

/// Point-in-time queue observability snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue_length: usize,
    pub in_flight: usize,
    pub pending_batches: usize,
}

/// Deferred action wrapped for dispatch
type QueueAction<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T>> + Send>;

/// One unit of queued work
///
/// Owned exclusively by the queue from enqueue until dispatch; the paired
/// [`Submission`] resolves exactly once with the action's result.
pub(crate) struct QueuedUnit<T> {
    id: String,
    action: QueueAction<T>,
    tx: oneshot::Sender<Result<T>>,
    enqueued_at: i64,
}

struct QueueState<T> {
    queue: VecDeque<QueuedUnit<T>>,
    batches: HashMap<String, PendingBatch<T>>,
    draining: bool,
    /// Units removed by `clear()`: kept so their submissions stay pending
    parked: Vec<QueuedUnit<T>>,
    batch_generation: u64,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    semaphore: Arc<Semaphore>,
    in_flight: AtomicUsize,
    config: QueueConfig,
    ids: Arc<dyn IdProvider>,
    time: Arc<dyn TimeProvider>,
}

/// Batching request queue with a bounded in-flight ceiling
///
/// Cheap to clone; clones share one queue. Construct once at the composition
/// root and hand clones to whichever layer enqueues work.
pub struct RequestQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Caller's side of an enqueued unit; resolves with the action's result
///
/// Dropping a submission does not cancel the unit - once enqueued, the
/// action will run (unless the queue is `clear()`ed first).
pub struct Submission<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Submission<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Executor side dropped without reporting: only possible if the
            // runtime tore down mid-dispatch.
            Poll::Ready(Err(_)) => Poll::Ready(Err(EngineError::Internal(
                "queued action dropped without completing".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Send + 'static> RequestQueue<T> {
    pub fn new(config: QueueConfig, ids: Arc<dyn IdProvider>, time: Arc<dyn TimeProvider>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    batches: HashMap::new(),
                    draining: false,
                    parked: Vec::new(),
                    batch_generation: 0,
                }),
                semaphore,
                in_flight: AtomicUsize::new(0),
                config,
                ids,
                time,
            }),
        }
    }

    /// Submit an action for dispatch
    ///
    /// With a `batch_key` the unit joins that key's pending batch and enters
    /// the main queue when the batch flushes (full, or idle for
    /// `batch_idle_delay`); without one it enters the main queue directly.
    /// The returned [`Submission`] resolves with exactly the action's result.
    ///
    /// # Errors
    /// - `DomainError::InvalidBatchKey` if the batch key fails validation
    pub fn enqueue<F, Fut>(&self, action: F, options: EnqueueOptions) -> Result<Submission<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(key) = &options.batch_key {
            validate_batch_key(key)?;
        }

        let (tx, rx) = oneshot::channel();
        let unit = QueuedUnit {
            id: self.inner.ids.generate_id(),
            action: Box::new(move || action().boxed()),
            tx,
            enqueued_at: self.inner.time.now_millis(),
        };

        debug!(
            unit_id = %unit.id,
            batch_key = options.batch_key.as_deref().unwrap_or("-"),
            "Unit enqueued"
        );

        match options.batch_key {
            Some(key) => self.append_to_batch(key, unit),
            None => {
                let mut state = self.lock_state();
                state.queue.push_back(unit);
                self.ensure_draining(&mut state);
            }
        }

        Ok(Submission { rx })
    }

    /// Snapshot of queue length, in-flight count and pending batches
    ///
    /// Observability only; no side effects.
    pub fn stats(&self) -> QueueStats {
        let state = self.lock_state();
        QueueStats {
            queue_length: state.queue.len(),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            pending_batches: state.batches.len(),
        }
    }

    /// Drop all queued units and cancel pending batch timers
    ///
    /// Test/reset only: submissions for the dropped units are left pending
    /// forever (neither resolved nor rejected). Units already in flight are
    /// unaffected.
    pub fn clear(&self) {
        let mut state = self.lock_state();

        let mut parked: Vec<QueuedUnit<T>> = state.queue.drain(..).collect();
        let batches: Vec<PendingBatch<T>> = state.batches.drain().map(|(_, b)| b).collect();
        for mut batch in batches {
            batch.cancel_timer();
            parked.extend(batch.units);
        }

        let dropped = parked.len();
        state.parked.append(&mut parked);
        if dropped > 0 {
            warn!(
                dropped,
                parked_total = state.parked.len(),
                "Queue cleared; dropped submissions will never resolve"
            );
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState<T>> {
        // Actions never run under this lock; a poisoned guard can only come
        // from queue bookkeeping itself.
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn append_to_batch(&self, key: String, unit: QueuedUnit<T>) {
        let mut state = self.lock_state();

        let flush_now = {
            let batch = state
                .batches
                .entry(key.clone())
                .or_insert_with(PendingBatch::new);
            batch.units.push(unit);
            batch.units.len() >= self.inner.config.max_batch_size
        };

        if flush_now {
            self.flush_batch_locked(&mut state, &key, "full");
            return;
        }

        // Restart the idle timer; the generation guard makes a superseded
        // timer a no-op even if its abort lands late.
        state.batch_generation += 1;
        let generation = state.batch_generation;
        let delay = self.inner.config.batch_idle_delay;
        let queue = self.clone();
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.flush_batch_if_current(&timer_key, generation);
        });

        if let Some(batch) = state.batches.get_mut(&key) {
            batch.generation = generation;
            batch.cancel_timer();
            batch.timer = Some(handle);
        }
    }

    /// Timer path: flush only if no later arrival rescheduled the batch
    fn flush_batch_if_current(&self, key: &str, generation: u64) {
        let mut state = self.lock_state();
        if state.batches.get(key).map(|b| b.generation) == Some(generation) {
            self.flush_batch_locked(&mut state, key, "idle");
        }
    }

    /// Move a pending batch into the main queue as one contiguous block
    fn flush_batch_locked(&self, state: &mut QueueState<T>, key: &str, reason: &'static str) {
        if let Some(mut batch) = state.batches.remove(key) {
            batch.cancel_timer();
            debug!(batch_key = %key, units = batch.units.len(), reason, "Flushing batch");
            state.queue.extend(batch.units);
            self.ensure_draining(state);
        }
    }

    /// Start the drain loop unless one is already running
    fn ensure_draining(&self, state: &mut QueueState<T>) {
        if state.draining || state.queue.is_empty() {
            return;
        }
        state.draining = true;
        let queue = self.clone();
        tokio::spawn(async move {
            queue.drain().await;
        });
    }

    /// Single logical worker: dispatch head units under the semaphore ceiling
    ///
    /// Exits when the queue empties; the next enqueue restarts it. Units
    /// already in flight keep running after exit.
    async fn drain(self) {
        loop {
            // Acquire the permit first so the head unit is not popped (and
            // thus not considered dispatched) while at the ceiling.
            let permit = match Arc::clone(&self.inner.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Semaphore closed: runtime is tearing down.
                    let mut state = self.lock_state();
                    state.draining = false;
                    return;
                }
            };

            let unit = {
                let mut state = self.lock_state();
                match state.queue.pop_front() {
                    Some(unit) => unit,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            let QueuedUnit {
                id,
                action,
                tx,
                enqueued_at,
            } = unit;
            let wait_ms = self.inner.time.now_millis() - enqueued_at;
            self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
            debug!(unit_id = %id, wait_ms, "Dispatching unit");

            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                // Run the action in its own task so a panic rejects this one
                // submission instead of taking down the drain machinery.
                let result = match tokio::spawn(action()).await {
                    Ok(result) => result,
                    Err(join_err) if join_err.is_panic() => {
                        error!(unit_id = %id, "Queued action panicked");
                        Err(EngineError::Internal(format!(
                            "queued action panicked: {}",
                            join_err
                        )))
                    }
                    Err(_) => Err(EngineError::Internal(
                        "queued action was cancelled".to_string(),
                    )),
                };
                inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                let _ = tx.send(result);
            });
        }
    }
}

fn validate_batch_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(DomainError::InvalidBatchKey("key is empty".to_string()).into());
    }
    if key.len() > MAX_BATCH_KEY_LEN {
        return Err(DomainError::InvalidBatchKey(format!(
            "key exceeds {} chars",
            MAX_BATCH_KEY_LEN
        ))
        .into());
    }
    let valid = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'));
    if !valid {
        return Err(DomainError::InvalidBatchKey(
            "key must be alphanumeric plus _-:.".to_string(),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::SystemTimeProvider;

    fn test_queue() -> RequestQueue<u32> {
        RequestQueue::new(
            QueueConfig::default(),
            Arc::new(SequentialIdProvider::new()),
            Arc::new(SystemTimeProvider),
        )
    }

    #[tokio::test]
    async fn test_roundtrip_value() {
        let queue = test_queue();
        let submission = queue
            .enqueue(|| async { Ok(7) }, EnqueueOptions::default())
            .unwrap();
        assert_eq!(submission.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_roundtrip_error_unmodified() {
        let queue = test_queue();
        let submission = queue
            .enqueue(
                || async {
                    Err(EngineError::Upstream {
                        status: 418,
                        message: "teapot".to_string(),
                    })
                },
                EnqueueOptions::default(),
            )
            .unwrap();

        match submission.await {
            Err(EngineError::Upstream { status, message }) => {
                assert_eq!(status, 418);
                assert_eq!(message, "teapot");
            }
            other => panic!("expected the original upstream error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_stats_idempotent() {
        let queue = test_queue();
        let first = queue.stats();
        let second = queue.stats();
        assert_eq!(first, second);
        assert_eq!(
            first,
            QueueStats {
                queue_length: 0,
                in_flight: 0,
                pending_batches: 0
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_batch_keys_rejected() {
        let queue = test_queue();
        for bad in ["", "has space", "way!", &"k".repeat(65)] {
            let result = queue.enqueue(|| async { Ok(0) }, EnqueueOptions::batched(bad));
            assert!(
                matches!(
                    result.err(),
                    Some(EngineError::Domain(DomainError::InvalidBatchKey(_)))
                ),
                "key {:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_batched_units_wait_for_idle_flush() {
        let queue = test_queue();
        let a = queue
            .enqueue(|| async { Ok(1) }, EnqueueOptions::batched("votes"))
            .unwrap();
        let b = queue
            .enqueue(|| async { Ok(2) }, EnqueueOptions::batched("votes"))
            .unwrap();

        let stats = queue.stats();
        assert_eq!(stats.pending_batches, 1);
        assert_eq!(stats.queue_length, 0);

        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 2);
        assert_eq!(queue.stats().pending_batches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_leaves_submissions_pending() {
        let queue = test_queue();
        let orphaned = queue
            .enqueue(|| async { Ok(1) }, EnqueueOptions::batched("resets"))
            .unwrap();
        queue.clear();

        let stats = queue.stats();
        assert_eq!(stats.queue_length, 0);
        assert_eq!(stats.pending_batches, 0);

        // The cleared submission must stay pending, not reject.
        let outcome = tokio::time::timeout(Duration::from_millis(500), orphaned).await;
        assert!(outcome.is_err(), "cleared submission must never resolve");
    }

    #[tokio::test]
    async fn test_panicking_action_rejects_only_its_submission() {
        let queue = test_queue();
        let poisoned = queue
            .enqueue(
                || async { panic!("clip decode exploded") },
                EnqueueOptions::default(),
            )
            .unwrap();
        let healthy = queue
            .enqueue(|| async { Ok(11) }, EnqueueOptions::default())
            .unwrap();

        match poisoned.await {
            Err(EngineError::Internal(msg)) => assert!(msg.contains("panicked")),
            other => panic!("expected internal panic error, got {:?}", other.err()),
        }
        assert_eq!(healthy.await.unwrap(), 11);
        assert_eq!(queue.stats().in_flight, 0);
    }
}
