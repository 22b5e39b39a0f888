//! HTTP server
//!
//! Thin request layer over the registry: resolve the source key, open a
//! session, and hand the session's byte stream to the response body.

pub mod config;
pub mod listener;
pub mod router;

pub use config::ServerConfig;
pub use listener::RelayServer;
pub use router::{router, AppState};
