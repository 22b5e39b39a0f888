//! Source lookup

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::registry::SourceKey;

use super::RelayConfig;

/// Resolves source keys to source URLs
///
/// When backed by a file, the file is re-read on every lookup so edits take
/// effect without a restart. A failed re-read keeps the last good config.
#[derive(Debug)]
pub struct SourceCatalog {
    path: Option<PathBuf>,
    current: RwLock<RelayConfig>,
}

impl SourceCatalog {
    /// Catalog over a fixed config
    pub fn new(config: RelayConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(config),
        }
    }

    /// Catalog that re-reads `path` on every lookup
    pub fn watch_file(path: impl Into<PathBuf>, initial: RelayConfig) -> Self {
        Self {
            path: Some(path.into()),
            current: RwLock::new(initial),
        }
    }

    /// Resolve a source key to its URL
    pub async fn lookup(&self, key: &SourceKey) -> Result<String> {
        self.refresh().await;

        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .source_url(key.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::SourceNotFound(key.clone()))
    }

    /// Transcoder binary from the most recently read config
    pub fn transcoder_binary(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ffmpeg_path
            .clone()
    }

    /// Configured source keys
    pub fn keys(&self) -> Vec<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .streams
            .keys()
            .cloned()
            .collect()
    }

    async fn refresh(&self) {
        let Some(path) = &self.path else {
            return;
        };

        match RelayConfig::read(path).await {
            Ok(config) => {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = config;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config reload failed, keeping previous sources");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(streams: &[(&str, &str)]) -> RelayConfig {
        RelayConfig {
            streams: streams
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_lookup_fixed() {
        let catalog = SourceCatalog::new(config_with(&[("radio1", "http://a")]));

        assert_eq!(
            catalog.lookup(&SourceKey::new("radio1")).await.unwrap(),
            "http://a"
        );
        assert!(matches!(
            catalog.lookup(&SourceKey::new("nope")).await,
            Err(Error::SourceNotFound(_))
        ));
        assert_eq!(catalog.keys(), vec!["radio1".to_string()]);
    }

    #[tokio::test]
    async fn test_lookup_sees_file_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let initial = config_with(&[("radio1", "http://a")]);
        initial.save(&path).unwrap();
        let catalog = SourceCatalog::watch_file(&path, initial);

        config_with(&[("radio2", "http://b")]).save(&path).unwrap();

        assert_eq!(
            catalog.lookup(&SourceKey::new("radio2")).await.unwrap(),
            "http://b"
        );
        assert!(catalog.lookup(&SourceKey::new("radio1")).await.is_err());
    }

    #[tokio::test]
    async fn test_broken_file_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let initial = config_with(&[("radio1", "http://a")]);
        initial.save(&path).unwrap();
        let catalog = SourceCatalog::watch_file(&path, initial);

        std::fs::write(&path, "{ broken").unwrap();

        assert_eq!(
            catalog.lookup(&SourceKey::new("radio1")).await.unwrap(),
            "http://a"
        );
    }
}
