//! Upstream transcoder processes
//!
//! Each source is fed by exactly one external transcoder. The process writes
//! raw audio to its stdout, which is handed to a [`BroadcastHub`] as a plain
//! async byte reader.
//!
//! Spawning goes through the [`Launcher`] trait so the registry never has to
//! know whether bytes come from `ffmpeg` or from an in-memory pipe.
//!
//! [`BroadcastHub`]: crate::hub::BroadcastHub

pub mod config;
pub mod process;

pub use config::TranscoderConfig;
pub use process::{UpstreamProcess, UpstreamReader};

use std::sync::Arc;

use crate::config::SourceCatalog;
use crate::error::Result;

/// Starts the upstream for a source URL
pub trait Launcher: Send + Sync + 'static {
    /// Spawn the upstream and attach to its output
    ///
    /// Called synchronously while the registry lock is held, so it must not
    /// block beyond the process spawn itself.
    fn launch(&self, source_url: &str) -> Result<(UpstreamProcess, UpstreamReader)>;
}

/// Launcher that runs the configured transcoder binary
///
/// With a catalog attached, the binary is taken from the catalog's current
/// `ffmpegPath` at every launch, so config edits apply to the next spawn.
#[derive(Debug, Clone, Default)]
pub struct TranscoderLauncher {
    config: TranscoderConfig,
    catalog: Option<Arc<SourceCatalog>>,
}

impl TranscoderLauncher {
    /// Create a launcher for a fixed transcoder configuration
    pub fn new(config: TranscoderConfig) -> Self {
        Self {
            config,
            catalog: None,
        }
    }

    /// Create a launcher that resolves the binary through `catalog`
    pub fn with_catalog(config: TranscoderConfig, catalog: Arc<SourceCatalog>) -> Self {
        Self {
            config,
            catalog: Some(catalog),
        }
    }

    /// Get the transcoder configuration
    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }
}

impl Launcher for TranscoderLauncher {
    fn launch(&self, source_url: &str) -> Result<(UpstreamProcess, UpstreamReader)> {
        let binary = match &self.catalog {
            Some(catalog) => catalog.transcoder_binary(),
            None => return UpstreamProcess::start(&self.config, source_url),
        };

        // Blank ffmpegPath falls back to the configured binary
        if binary.trim().is_empty() {
            return UpstreamProcess::start(&self.config, source_url);
        }

        let config = TranscoderConfig {
            binary,
            ..self.config.clone()
        };
        UpstreamProcess::start(&config, source_url)
    }
}
