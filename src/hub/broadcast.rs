//! Broadcast hub implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::join_all;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant as IdleInstant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::registry::SourceKey;
use crate::upstream::{UpstreamProcess, UpstreamReader};

use super::config::HubConfig;
use super::subscriber::Subscriber;

/// Lifecycle of a hub
///
/// `Closed` is terminal; a closed hub is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HubState {
    /// Created, distribution task not yet running
    Starting = 0,
    /// Distribution task is reading from the upstream
    Running = 1,
    /// Upstream terminated and all subscriber queues closed
    Closed = 2,
}

impl HubState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HubState::Starting,
            1 => HubState::Running,
            _ => HubState::Closed,
        }
    }
}

/// Statistics for a hub
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Current lifecycle state
    pub state: HubState,
    /// Number of registered subscribers
    pub subscribers: usize,
    /// Number of sessions holding the hub
    pub refcount: usize,
    /// Chunks read from the upstream
    pub chunks_read: u64,
    /// Bytes read from the upstream
    pub bytes_read: u64,
    /// Chunk deliveries dropped because a subscriber queue stayed full
    pub chunks_dropped: u64,
    /// How long the refcount has been zero, if it is
    pub idle_for: Option<Duration>,
    /// Time since the hub was created
    pub uptime: Duration,
}

/// Fan-out point for one source
///
/// Owns the upstream process and the subscriber set. The subscriber map is
/// guarded by a short-lived `RwLock`: the distribution task only clones the
/// senders under the read lock and delivers without holding it.
pub struct BroadcastHub {
    key: SourceKey,

    /// Generation id assigned by the registry
    id: u64,

    config: HubConfig,

    state: AtomicU8,

    subscribers: RwLock<HashMap<u64, mpsc::Sender<Bytes>>>,

    next_subscriber_id: AtomicU64,

    process: Mutex<UpstreamProcess>,

    /// Cancelled exactly once, by `close`
    cancel: CancellationToken,

    /// Sessions currently holding this hub
    refcount: AtomicUsize,

    /// When the refcount last dropped to zero; `None` while held.
    /// Refcount changes happen under this lock.
    idle_since: Mutex<Option<IdleInstant>>,

    chunks_read: AtomicU64,
    bytes_read: AtomicU64,
    chunks_dropped: AtomicU64,

    created_at: Instant,
}

impl BroadcastHub {
    /// Create a hub around a started upstream and spawn its distribution task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        key: SourceKey,
        id: u64,
        process: UpstreamProcess,
        reader: UpstreamReader,
        config: HubConfig,
    ) -> Arc<Self> {
        let hub = Arc::new(Self {
            key,
            id,
            config,
            state: AtomicU8::new(HubState::Starting as u8),
            subscribers: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            process: Mutex::new(process),
            cancel: CancellationToken::new(),
            refcount: AtomicUsize::new(0),
            idle_since: Mutex::new(Some(IdleInstant::now())),
            chunks_read: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            created_at: Instant::now(),
        });

        tokio::spawn(Arc::clone(&hub).distribute(reader));

        tracing::info!(source = %hub.key, hub_id = id, "Hub created");
        hub
    }

    /// Source key this hub serves
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    /// Generation id (unique per registry)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> HubState {
        HubState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the hub has been closed
    pub fn is_closed(&self) -> bool {
        self.state() == HubState::Closed
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.read_subscribers().len()
    }

    /// Number of sessions holding this hub
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// How long the refcount has continuously been zero
    ///
    /// `None` while at least one session holds the hub.
    pub fn idle_for(&self) -> Option<Duration> {
        self.lock_idle().map(|since| since.elapsed())
    }

    /// Whether the upstream process has been terminated
    pub fn is_upstream_terminated(&self) -> bool {
        self.lock_process().is_terminated()
    }

    /// Wait until the hub is closed
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    /// Token cancelled when the hub closes
    pub(crate) fn close_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Get hub statistics
    pub fn stats(&self) -> HubStats {
        HubStats {
            state: self.state(),
            subscribers: self.subscriber_count(),
            refcount: self.refcount(),
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            idle_for: self.idle_for(),
            uptime: self.created_at.elapsed(),
        }
    }

    /// Register a new subscriber queue
    ///
    /// Fails with [`Error::HubClosed`] once the hub is closed.
    pub fn subscribe(&self) -> Result<Subscriber> {
        let mut subscribers = self.write_subscribers();

        // Checked under the write lock: close() flips the state under it too
        if self.is_closed() {
            return Err(Error::HubClosed(self.key.clone()));
        }

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        subscribers.insert(id, tx);

        tracing::debug!(
            source = %self.key,
            hub_id = self.id,
            subscriber_id = id,
            subscribers = subscribers.len(),
            "Subscriber added"
        );

        Ok(Subscriber::new(id, rx))
    }

    /// Remove a subscriber
    ///
    /// Idempotent; returns `false` if it was already gone (including after close).
    pub fn unsubscribe(&self, subscriber: &Subscriber) -> bool {
        let mut subscribers = self.write_subscribers();
        let removed = subscribers.remove(&subscriber.id()).is_some();

        if removed {
            tracing::debug!(
                source = %self.key,
                hub_id = self.id,
                subscriber_id = subscriber.id(),
                subscribers = subscribers.len(),
                "Subscriber removed"
            );
        }

        removed
    }

    /// Close the hub
    ///
    /// Stops the distribution task, terminates the upstream process and
    /// closes every registered subscriber queue. Returns `true` if this call
    /// did the closing; later calls are no-ops.
    pub fn close(&self) -> bool {
        let drained = {
            let mut subscribers = self.write_subscribers();
            let prev = self.state.swap(HubState::Closed as u8, Ordering::AcqRel);
            if HubState::from_u8(prev) == HubState::Closed {
                return false;
            }
            std::mem::take(&mut *subscribers)
        };

        self.cancel.cancel();
        self.lock_process().terminate();

        let closed_subscribers = drained.len();
        // Dropping the senders ends every subscriber's stream
        drop(drained);

        tracing::info!(
            source = %self.key,
            hub_id = self.id,
            subscribers = closed_subscribers,
            chunks_read = self.chunks_read.load(Ordering::Relaxed),
            "Hub closed"
        );

        true
    }

    pub(crate) fn retain(&self) -> usize {
        let mut idle_since = self.lock_idle();
        *idle_since = None;
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one reference; reaching zero restarts the idle clock
    pub(crate) fn release(&self) -> usize {
        let mut idle_since = self.lock_idle();
        let prev = self
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or_else(|_| {
                tracing::warn!(source = %self.key, hub_id = self.id, "Refcount underflow");
                1
            });

        let remaining = prev - 1;
        if remaining == 0 {
            *idle_since = Some(IdleInstant::now());
        }
        remaining
    }

    /// Distribution loop: read a chunk, fan it out, repeat
    async fn distribute(self: Arc<Self>, mut reader: UpstreamReader) {
        if self
            .state
            .compare_exchange(
                HubState::Starting as u8,
                HubState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // Closed before we got scheduled
            return;
        }

        let mut buf = vec![0u8; self.config.chunk_size.max(1)];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = reader.read(&mut buf) => read,
            };

            let chunk = match read {
                Ok(0) => {
                    tracing::info!(source = %self.key, hub_id = self.id, "Upstream ended");
                    self.close();
                    break;
                }
                Ok(n) => Bytes::copy_from_slice(&buf[..n]),
                Err(e) => {
                    tracing::warn!(
                        source = %self.key,
                        hub_id = self.id,
                        error = %e,
                        "Upstream read failed"
                    );
                    self.close();
                    break;
                }
            };

            self.chunks_read.fetch_add(1, Ordering::Relaxed);
            self.bytes_read
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.deliver(chunk) => {}
            }
        }

        tracing::debug!(source = %self.key, hub_id = self.id, "Distribution task exited");
    }

    /// Push one chunk to every current subscriber
    async fn deliver(&self, chunk: Bytes) {
        let snapshot: Vec<(u64, mpsc::Sender<Bytes>)> = self
            .read_subscribers()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut waiting = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(chunk.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(chunk)) => {
                    waiting.push(self.deliver_with_deadline(id, tx, chunk));
                }
                // Consumer went away; its session unsubscribes on drop
                Err(TrySendError::Closed(_)) => {}
            }
        }

        if !waiting.is_empty() {
            join_all(waiting).await;
        }
    }

    async fn deliver_with_deadline(&self, id: u64, tx: mpsc::Sender<Bytes>, chunk: Bytes) {
        if tokio::time::timeout(self.config.delivery_timeout, tx.send(chunk))
            .await
            .is_err()
        {
            self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                source = %self.key,
                hub_id = self.id,
                subscriber_id = id,
                "Subscriber queue full, chunk dropped"
            );
        }
    }

    fn read_subscribers(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<u64, mpsc::Sender<Bytes>>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_subscribers(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<u64, mpsc::Sender<Bytes>>> {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_process(&self) -> MutexGuard<'_, UpstreamProcess> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_idle(&self) -> MutexGuard<'_, Option<IdleInstant>> {
        self.idle_since.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("refcount", &self.refcount())
            .finish()
    }
}
