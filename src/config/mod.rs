//! Relay configuration file
//!
//! The on-disk format is a small JSON document:
//!
//! ```json
//! {
//!   "ipPort": "24748",
//!   "ffmpegPath": "ffmpeg",
//!   "Streams": { "radio1": "http://example.com/live/64k.m3u8" }
//! }
//! ```
//!
//! A missing file is created with defaults on first load.

pub mod catalog;

pub use catalog::SourceCatalog;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::upstream::config::default_binary;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 24748;

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

/// Contents of the relay config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Source key → source URL
    #[serde(rename = "Streams", default)]
    pub streams: BTreeMap<String, String>,

    /// Listening port (kept as a string for compatibility)
    #[serde(rename = "ipPort", default = "default_port")]
    pub ip_port: String,

    /// Transcoder binary
    #[serde(rename = "ffmpegPath", default = "default_binary")]
    pub ffmpeg_path: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let streams = [
            ("广东羊城交通台", "http://ls.qingting.fm/live/1262/64k.m3u8?format=aac"),
            ("广东广播电视台股市广播", "http://ls.qingting.fm/live/4847/64k.m3u8?format=aac"),
            ("广东珠江经济电台", "http://ls.qingting.fm/live/1259/64k.m3u8?format=aac"),
            ("广东广播电视台文体广播", "http://ls.qingting.fm/live/471/64k.m3u8?format=aac"),
            ("广东音乐之声", "http://ls.qingting.fm/live/1260/64k.m3u8?format=aac"),
            ("佛山电台FM906", "http://ls.qingting.fm/live/1264/64k.m3u8?format=aac"),
            ("番禺电台畅快1017", "http://ls.qingting.fm/live/20212427/64k.m3u8?format=aac"),
            ("广州MYFM 88.0", "http://ls.qingting.fm/live/20194/64k.m3u8?format=aac"),
        ]
        .into_iter()
        .map(|(key, url)| (key.to_string(), url.to_string()))
        .collect();

        Self {
            streams,
            ip_port: default_port(),
            ffmpeg_path: default_binary(),
        }
    }
}

impl RelayConfig {
    /// Load the config, writing a default file first if none exists
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading config");

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(path, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, writing defaults");
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(Error::config(path, e.to_string())),
        }
    }

    /// Load the config without creating it
    pub async fn read(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::config(path, e.to_string()))?;
        Self::parse(path, &contents)
    }

    /// Parse config JSON; `path` is only used in error messages
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| Error::config(path, e.to_string()))
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| Error::config(path, e.to_string()))?;
        std::fs::write(path, json).map_err(|e| Error::config(path, e.to_string()))
    }

    /// Listening port
    pub fn port(&self) -> Result<u16> {
        self.ip_port
            .trim()
            .parse()
            .map_err(|_| Error::config("ipPort", format!("invalid port '{}'", self.ip_port)))
    }

    /// URL for a source key
    pub fn source_url(&self, key: &str) -> Option<&str> {
        self.streams.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_field_names() {
        let json = r#"{
            "ipPort": "8080",
            "ffmpegPath": "/usr/bin/ffmpeg",
            "Streams": { "radio1": "http://example.com/1.m3u8" },
            "extra": true
        }"#;

        let config = RelayConfig::parse(Path::new("config.json"), json).unwrap();

        assert_eq!(config.port().unwrap(), 8080);
        assert_eq!(config.ffmpeg_path, "/usr/bin/ffmpeg");
        assert_eq!(config.source_url("radio1"), Some("http://example.com/1.m3u8"));
        assert_eq!(config.source_url("radio2"), None);
    }

    #[test]
    fn test_parse_fills_defaults() {
        let config = RelayConfig::parse(Path::new("c.json"), "{}").unwrap();

        assert!(config.streams.is_empty());
        assert_eq!(config.port().unwrap(), DEFAULT_PORT);
        assert_eq!(config.ffmpeg_path, default_binary());
    }

    #[test]
    fn test_parse_error() {
        let result = RelayConfig::parse(Path::new("broken.json"), "{ not json");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_invalid_port() {
        let config = RelayConfig {
            ip_port: "http".to_string(),
            ..RelayConfig::default()
        };
        assert!(config.port().is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = RelayConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.streams.len(), 8);

        // Loading again reads what was written
        let reloaded = RelayConfig::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
