//! Consumer sessions
//!
//! A session binds one subscriber queue to the lease on its hub. Whatever way
//! the session ends (upstream EOF, client gone, inactivity, or the value just
//! being dropped) the subscriber is removed and the lease released exactly
//! once, from `Drop`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::hub::{BroadcastHub, Subscriber};
use crate::registry::{Lease, SourceKey, SourceRegistry};

/// Why a session stopped streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Hub closed the subscriber queue (upstream EOF/error or shutdown)
    UpstreamEnded,
    /// Client went away or its sink failed
    ClientDisconnected,
    /// No chunk arrived within the idle timeout
    InactivityTimeout,
}

/// A client's handle on a hub
pub struct ConsumerSession {
    subscriber: Subscriber,
    lease: Lease,
    started_at: Instant,
    bytes_sent: u64,
}

impl ConsumerSession {
    /// Acquire the hub for `key` and subscribe to it
    ///
    /// If the hub closes between acquire and subscribe, the stale reference is
    /// released and a fresh hub is acquired once.
    pub async fn open(
        registry: &Arc<SourceRegistry>,
        key: &SourceKey,
        source_url: &str,
    ) -> Result<Self> {
        let (hub, lease) = registry.acquire(key, source_url).await?;

        match hub.subscribe() {
            Ok(subscriber) => Ok(Self::new(subscriber, lease)),
            Err(Error::HubClosed(_)) => {
                drop(lease);
                let (hub, lease) = registry.acquire(key, source_url).await?;
                let subscriber = hub.subscribe()?;
                Ok(Self::new(subscriber, lease))
            }
            Err(e) => Err(e),
        }
    }

    fn new(subscriber: Subscriber, lease: Lease) -> Self {
        tracing::debug!(
            source = %lease.hub().key(),
            hub_id = lease.hub().id(),
            subscriber_id = subscriber.id(),
            "Session opened"
        );

        Self {
            subscriber,
            lease,
            started_at: Instant::now(),
            bytes_sent: 0,
        }
    }

    /// Source this session streams
    pub fn key(&self) -> &SourceKey {
        self.lease.hub().key()
    }

    /// Hub this session is attached to
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        self.lease.hub()
    }

    /// Subscriber id within the hub
    pub fn subscriber_id(&self) -> u64 {
        self.subscriber.id()
    }

    /// Bytes handed to the client so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Wait for the next chunk; `None` once the hub has closed the queue
    pub async fn recv(&mut self) -> Option<Bytes> {
        let chunk = self.subscriber.recv().await?;
        self.bytes_sent += chunk.len() as u64;
        Some(chunk)
    }

    /// Stream chunks into `sink` until the session ends
    ///
    /// Each chunk is written and flushed as soon as it arrives. The session is
    /// released when this returns.
    pub async fn pump<W, D>(
        mut self,
        sink: &mut W,
        idle_timeout: Duration,
        disconnected: D,
    ) -> SessionEnd
    where
        W: AsyncWrite + Unpin,
        D: Future<Output = ()>,
    {
        tokio::pin!(disconnected);

        let end = loop {
            let next = tokio::select! {
                _ = &mut disconnected => break SessionEnd::ClientDisconnected,
                next = tokio::time::timeout(idle_timeout, self.subscriber.recv()) => next,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break SessionEnd::UpstreamEnded,
                Err(_) => break SessionEnd::InactivityTimeout,
            };

            if let Err(e) = write_chunk(sink, &chunk).await {
                tracing::debug!(
                    source = %self.key(),
                    subscriber_id = self.subscriber_id(),
                    error = %e,
                    "Client write failed"
                );
                break SessionEnd::ClientDisconnected;
            }
            self.bytes_sent += chunk.len() as u64;
        };

        tracing::debug!(
            source = %self.key(),
            subscriber_id = self.subscriber_id(),
            end = ?end,
            "Session ended"
        );
        end
    }

    /// Turn the session into a byte stream suitable for an HTTP body
    ///
    /// The stream ends on upstream end-of-stream or after `idle_timeout`
    /// without data. Dropping the stream (client disconnect) releases the
    /// session.
    pub fn into_stream(
        self,
        idle_timeout: Duration,
    ) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        futures::stream::unfold(self, move |mut session| async move {
            match tokio::time::timeout(idle_timeout, session.recv()).await {
                Ok(Some(chunk)) => Some((Ok(chunk), session)),
                Ok(None) => {
                    tracing::debug!(
                        source = %session.key(),
                        subscriber_id = session.subscriber_id(),
                        end = ?SessionEnd::UpstreamEnded,
                        "Session ended"
                    );
                    None
                }
                Err(_) => {
                    tracing::debug!(
                        source = %session.key(),
                        subscriber_id = session.subscriber_id(),
                        end = ?SessionEnd::InactivityTimeout,
                        "Session ended"
                    );
                    None
                }
            }
        })
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(sink: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    sink.write_all(chunk).await?;
    sink.flush().await
}

impl Drop for ConsumerSession {
    fn drop(&mut self) {
        self.lease.hub().unsubscribe(&self.subscriber);
        self.lease.release();

        tracing::debug!(
            source = %self.key(),
            subscriber_id = self.subscriber_id(),
            bytes_sent = self.bytes_sent,
            duration_ms = self.started_at.elapsed().as_millis() as u64,
            "Session released"
        );
    }
}

impl std::fmt::Debug for ConsumerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSession")
            .field("source", self.key())
            .field("subscriber_id", &self.subscriber_id())
            .field("bytes_sent", &self.bytes_sent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    use crate::testing::MockLauncher;

    use super::*;

    const URL: &str = "http://example.com/radio1.m3u8";

    fn setup() -> (Arc<MockLauncher>, Arc<SourceRegistry>, SourceKey) {
        let launcher = Arc::new(MockLauncher::new());
        let registry = Arc::new(SourceRegistry::new(launcher.clone()));
        (launcher, registry, SourceKey::new("radio1"))
    }

    #[tokio::test]
    async fn test_open_and_receive() {
        let (launcher, registry, key) = setup();

        let mut session = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let mut upstream = launcher.take_writer(URL).unwrap();

        upstream.write_all(b"mp3-bytes").await.unwrap();
        assert_eq!(session.recv().await.unwrap(), Bytes::from_static(b"mp3-bytes"));
        assert_eq!(session.bytes_sent(), 9);
        assert_eq!(session.key(), &key);
    }

    #[tokio::test]
    async fn test_drop_releases_everything() {
        let (_launcher, registry, key) = setup();

        let a = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let b = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let hub = Arc::clone(a.hub());
        assert_eq!(hub.refcount(), 2);
        assert_eq!(hub.subscriber_count(), 2);

        drop(a);
        assert_eq!(hub.refcount(), 1);
        assert_eq!(hub.subscriber_count(), 1);

        drop(b);
        assert_eq!(hub.refcount(), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_pump_until_upstream_ends() {
        let (launcher, registry, key) = setup();

        let session = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let hub = Arc::clone(session.hub());
        let mut upstream = launcher.take_writer(URL).unwrap();

        let pump = tokio::spawn(async move {
            let mut sink = Vec::new();
            let end = session
                .pump(&mut sink, Duration::from_secs(30), std::future::pending())
                .await;
            (end, sink)
        });

        upstream.write_all(b"hello ").await.unwrap();
        upstream.write_all(b"world").await.unwrap();
        drop(upstream);

        let (end, sink) = pump.await.unwrap();
        assert_eq!(end, SessionEnd::UpstreamEnded);
        assert_eq!(sink, b"hello world");
        assert_eq!(hub.refcount(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_inactivity_timeout() {
        let (_launcher, registry, key) = setup();

        let session = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let hub = Arc::clone(session.hub());

        let mut sink = Vec::new();
        let end = session
            .pump(&mut sink, Duration::from_secs(30), std::future::pending())
            .await;

        assert_eq!(end, SessionEnd::InactivityTimeout);
        assert!(sink.is_empty());
        assert_eq!(hub.refcount(), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_pump_client_disconnect_signal() {
        let (_launcher, registry, key) = setup();

        let session = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let other = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let hub = Arc::clone(session.hub());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let pump = tokio::spawn(async move {
            let mut sink = Vec::new();
            session
                .pump(&mut sink, Duration::from_secs(30), async move {
                    let _ = rx.await;
                })
                .await
        });

        tx.send(()).unwrap();
        assert_eq!(pump.await.unwrap(), SessionEnd::ClientDisconnected);

        // Only that one session went away
        assert!(!hub.is_closed());
        assert_eq!(hub.refcount(), 1);
        drop(other);
    }

    #[tokio::test]
    async fn test_pump_sink_failure() {
        let (launcher, registry, key) = setup();

        let session = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let hub = Arc::clone(session.hub());
        let mut upstream = launcher.take_writer(URL).unwrap();

        // Client side of the sink is already gone
        let (mut sink, client) = tokio::io::duplex(16);
        drop(client);

        upstream.write_all(b"chunk").await.unwrap();
        let end = session
            .pump(&mut sink, Duration::from_secs(30), std::future::pending())
            .await;

        assert_eq!(end, SessionEnd::ClientDisconnected);
        assert_eq!(hub.refcount(), 0);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let (launcher, registry, key) = setup();

        let session = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        let hub = Arc::clone(session.hub());
        let mut upstream = launcher.take_writer(URL).unwrap();

        let collector = tokio::spawn(async move {
            session
                .into_stream(Duration::from_secs(30))
                .map(|chunk| chunk.unwrap())
                .collect::<Vec<_>>()
                .await
                .concat()
        });

        upstream.write_all(b"abc").await.unwrap();
        upstream.write_all(b"def").await.unwrap();
        drop(upstream);

        assert_eq!(collector.await.unwrap(), b"abcdef");
        assert_eq!(hub.refcount(), 0);
    }

    #[tokio::test]
    async fn test_open_replaces_closed_hub() {
        let (launcher, registry, key) = setup();

        let first = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        first.hub().close();

        let second = ConsumerSession::open(&registry, &key, URL).await.unwrap();
        assert_ne!(second.hub().id(), first.hub().id());
        assert_eq!(launcher.launches(), 2);
    }
}
