//! Error types
//!
//! Creation-time failures (unknown source, transcoder spawn) are returned to
//! the caller that triggered them. Mid-stream upstream failures never show up
//! here: they close the hub and are observed by subscribers as end-of-stream.

use std::path::PathBuf;

use crate::registry::SourceKey;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for relay operations
#[derive(Debug)]
pub enum Error {
    /// Requested source key is not configured
    SourceNotFound(SourceKey),
    /// Transcoder could not be launched or its output could not be attached
    Spawn {
        /// Binary that failed to start
        binary: String,
        /// Underlying OS error
        source: std::io::Error,
    },
    /// Hub was closed before the operation could complete
    HubClosed(SourceKey),
    /// Configuration file could not be read, written or parsed
    Config {
        /// Path of the offending file
        path: PathBuf,
        /// Human readable reason
        message: String,
    },
    /// I/O error (bind, accept, ...)
    Io(std::io::Error),
}

impl Error {
    /// Build a spawn error for `binary`
    pub fn spawn(binary: impl Into<String>, source: std::io::Error) -> Self {
        Error::Spawn {
            binary: binary.into(),
            source,
        }
    }

    /// Build a config error for `path`
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SourceNotFound(key) => write!(f, "Source not found: {}", key),
            Error::Spawn { binary, source } => {
                write!(f, "Failed to start transcoder '{}': {}", binary, source)
            }
            Error::HubClosed(key) => write!(f, "Hub closed: {}", key),
            Error::Config { path, message } => {
                write!(f, "Config error in {}: {}", path.display(), message)
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Spawn { source, .. } => Some(source),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::SourceNotFound(SourceKey::new("radio1"));
        assert_eq!(err.to_string(), "Source not found: radio1");

        let err = Error::spawn(
            "ffmpeg",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().contains("'ffmpeg'"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_from_io() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
