//! Test helpers: an in-memory launcher that records every spawn

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::io::DuplexStream;

use crate::error::{Error, Result};
use crate::upstream::{Launcher, UpstreamProcess, UpstreamReader};

/// Launcher backed by `tokio::io::duplex` pipes
///
/// The write half of every launched upstream is kept so tests can feed bytes
/// (or drop it to simulate the transcoder exiting).
#[derive(Default)]
pub(crate) struct MockLauncher {
    launches: AtomicUsize,
    fail: bool,
    writers: Mutex<Vec<(String, DuplexStream)>>,
}

impl MockLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Launcher whose every spawn fails
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of upstreams started so far
    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Take the write half of the most recent upstream for `url`
    pub(crate) fn take_writer(&self, url: &str) -> Option<DuplexStream> {
        let mut writers = self.writers.lock().unwrap();
        let pos = writers.iter().rposition(|(u, _)| u == url)?;
        Some(writers.remove(pos).1)
    }
}

impl Launcher for MockLauncher {
    fn launch(&self, source_url: &str) -> Result<(UpstreamProcess, UpstreamReader)> {
        if self.fail {
            return Err(Error::spawn(
                "mock-transcoder",
                std::io::Error::new(std::io::ErrorKind::NotFound, "mock spawn failure"),
            ));
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        self.writers
            .lock()
            .unwrap()
            .push((source_url.to_string(), writer));

        Ok((UpstreamProcess::detached(), Box::new(reader)))
    }
}
