//! Relay server listener
//!
//! Binds the TCP listener and serves the router until shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::SourceCatalog;
use crate::error::Result;
use crate::registry::SourceRegistry;

use super::config::ServerConfig;
use super::router::{router, AppState};

/// HTTP relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<SourceRegistry>,
    catalog: Arc<SourceCatalog>,
}

impl RelayServer {
    /// Create a new server
    pub fn new(
        config: ServerConfig,
        registry: Arc<SourceRegistry>,
        catalog: Arc<SourceCatalog>,
    ) -> Self {
        Self {
            config,
            registry,
            catalog,
        }
    }

    /// Get a reference to the source registry
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    ///
    /// On shutdown every hub is closed first. That ends all open audio
    /// streams, which would otherwise keep the graceful shutdown waiting
    /// forever.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        let app = router(AppState {
            registry: Arc::clone(&self.registry),
            catalog: Arc::clone(&self.catalog),
            config: Arc::new(self.config.clone()),
        });

        let registry = Arc::clone(&self.registry);
        let shutdown = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            registry.shutdown().await;
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        // Hubs created while connections drained
        self.registry.shutdown().await;
        tracing::info!("Relay server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::config::RelayConfig;
    use crate::registry::SourceKey;
    use crate::testing::MockLauncher;

    use super::*;

    const URL: &str = "http://example.com/radio1.m3u8";

    async fn start() -> (
        Arc<MockLauncher>,
        Arc<SourceRegistry>,
        SocketAddr,
        tokio::sync::oneshot::Sender<()>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let launcher = Arc::new(MockLauncher::new());
        let registry = Arc::new(SourceRegistry::new(launcher.clone()));

        let mut relay = RelayConfig::default();
        relay.streams.insert("radio1".to_string(), URL.to_string());
        let catalog = Arc::new(SourceCatalog::new(relay));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = RelayServer::new(
            ServerConfig::with_addr(addr),
            Arc::clone(&registry),
            catalog,
        );
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        (launcher, registry, addr, stop_tx, handle)
    }

    async fn read_until(stream: &mut TcpStream, needle: &[u8]) -> Vec<u8> {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.windows(needle.len()).any(|w| w == needle) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before {:?}", needle);
            received.extend_from_slice(&buf[..n]);
        }
        received
    }

    #[tokio::test]
    async fn test_serves_banner() {
        let (_launcher, _registry, addr, stop, handle) = start().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("Server Run Successful!"));

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_ends_open_streams() {
        let (launcher, registry, addr, stop, handle) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /radio1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        read_until(&mut client, b"audio/mpeg").await;

        let mut upstream = launcher.take_writer(URL).unwrap();
        upstream.write_all(b"live-audio").await.unwrap();
        read_until(&mut client, b"live-audio").await;

        let hub = registry.hub(&SourceKey::new("radio1")).await.unwrap();
        stop.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop with a stream still open")
            .unwrap()
            .unwrap();

        assert!(hub.is_closed());
        assert!(registry.is_empty().await);
    }
}
