use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};

use futures_util::future::{BoxFuture, join_all};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A unit of work submitted to the pool. Invoked with a cancellation token
/// derived from the token passed to [`WorkerPool::submit`] — never the
/// pool's own process-global state.
pub type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool queue is full")]
    QueueFull,
    #[error("worker pool is closed")]
    PoolClosed,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("worker pool wait cancelled")]
    Cancelled,
}

type QueueItem = (Job, CancellationToken);

/// A bounded-queue worker pool with non-blocking submission. A job's own
/// error is the job's concern to log — it is never propagated as a pool
/// failure, per the pool's per-job partial-failure model.
pub struct WorkerPool {
    sender: SyncMutex<Option<mpsc::Sender<QueueItem>>>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    seen: AsyncMutex<HashSet<String>>,
}

impl WorkerPool {
    pub fn new(max_workers: usize, max_queue_size: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<QueueItem>(max_queue_size.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));
        let mut workers = Vec::with_capacity(max_workers.max(1));
        for _ in 0..max_workers.max(1) {
            let rx = rx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let item = { rx.lock().await.recv().await };
                    match item {
                        Some((job, token)) => job(token).await,
                        None => break,
                    }
                }
            }));
        }
        Arc::new(Self {
            sender: SyncMutex::new(Some(tx)),
            workers: AsyncMutex::new(workers),
            closed: AtomicBool::new(false),
            seen: AsyncMutex::new(HashSet::new()),
        })
    }

    /// Non-blocking. Returns `QueueFull` if the channel has no capacity,
    /// `PoolClosed` once [`WorkerPool::wait`] or [`WorkerPool::close`] has
    /// run. Never blocks the caller either way.
    pub fn submit(&self, token: &CancellationToken, job: Job) -> Result<(), PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::PoolClosed);
        }
        let guard = self.sender.lock().unwrap();
        let sender = guard.as_ref().ok_or(PoolError::PoolClosed)?;
        sender
            .try_send((job, token.child_token()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PoolError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => PoolError::PoolClosed,
            })
    }

    /// Closes submission and blocks until every in-flight and queued job has
    /// drained, or until `token` cancels first.
    pub async fn wait(&self, token: &CancellationToken) -> Result<(), WaitError> {
        self.closed.store(true, Ordering::SeqCst);
        {
            let mut guard = self.sender.lock().unwrap();
            *guard = None;
        }
        let handles = std::mem::take(&mut *self.workers.lock().await);
        tokio::select! {
            _ = token.cancelled() => Err(WaitError::Cancelled),
            _ = join_all(handles) => Ok(()),
        }
    }

    /// Idempotent shutdown: marks the pool closed and drops the submission
    /// channel so workers drain whatever is already queued without blocking
    /// this call or any further (now-rejected) submit.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut guard = self.sender.lock().unwrap();
        *guard = None;
    }

    pub async fn is_duplicate(&self, key: &str) -> bool {
        self.seen.lock().await.contains(key)
    }

    /// Returns `true` if this call was the first to see `key` — the
    /// first-insert-wins rule the Amion scraper's dedup depends on.
    pub async fn mark_seen(&self, key: impl Into<String>) -> bool {
        self.seen.lock().await.insert(key.into())
    }

    pub async fn clear_seen(&self) {
        self.seen.lock().await.clear();
    }
}
