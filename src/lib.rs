//! # radio-relay
//!
//! Exposes named live audio sources (typically HLS playlists) as continuous
//! HTTP byte streams. Each source is transcoded by exactly one external
//! process no matter how many clients listen; the process is started on the
//! first request and stopped a short grace period after the last listener
//! leaves.
//!
//! ```text
//!  GET /radio1 ──► SourceCatalog ──► SourceRegistry::acquire
//!                                         │ (spawn once per key)
//!                                         ▼
//!                       UpstreamProcess ─► BroadcastHub ─► Subscriber ─► ConsumerSession ─► body
//!                                                      └─► Subscriber ─► ConsumerSession ─► body
//! ```
//!
//! The fan-out is lossy by design: a listener that cannot keep up misses
//! chunks instead of slowing down everyone else.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use radio_relay::config::{RelayConfig, SourceCatalog};
//! use radio_relay::upstream::{TranscoderConfig, TranscoderLauncher};
//! use radio_relay::{RelayServer, ServerConfig, SourceRegistry};
//!
//! # async fn example() -> radio_relay::Result<()> {
//! let relay = RelayConfig::load("config.json".as_ref())?;
//! let launcher = TranscoderLauncher::new(TranscoderConfig::with_binary(&relay.ffmpeg_path));
//! let registry = Arc::new(SourceRegistry::new(Arc::new(launcher)));
//! let catalog = Arc::new(SourceCatalog::new(relay));
//!
//! let server = RelayServer::new(ServerConfig::default(), registry, catalog);
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod registry;
pub mod server;
pub mod session;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use hub::{BroadcastHub, HubConfig, HubState, HubStats, Subscriber};
pub use registry::{Lease, RegistryConfig, SourceKey, SourceRegistry};
pub use server::{RelayServer, ServerConfig};
pub use session::{ConsumerSession, SessionEnd};
pub use upstream::{Launcher, TranscoderConfig, TranscoderLauncher, UpstreamProcess};
