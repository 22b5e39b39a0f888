//! Transcoder process handle
//!
//! Owns one spawned transcoder and exposes its stdout as a sequential reader.
//! Reads are consumed as produced; nothing is buffered beyond the OS pipe.

use std::process::Stdio;

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};

use super::config::TranscoderConfig;

/// Boxed byte reader attached to an upstream's output
pub type UpstreamReader = Box<dyn AsyncRead + Send + Unpin>;

/// Windows: do not pop up a console window for the transcoder
#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

/// A running upstream transcoder
///
/// Termination is idempotent: the first [`terminate`](Self::terminate) kills
/// the process, later calls do nothing. Dropping the handle terminates too.
#[derive(Debug)]
pub struct UpstreamProcess {
    child: Option<Child>,
    pid: Option<u32>,
    terminated: bool,
}

impl UpstreamProcess {
    /// Spawn the transcoder for `source_url` and attach to its stdout
    pub fn start(config: &TranscoderConfig, source_url: &str) -> Result<(Self, UpstreamReader)> {
        let mut cmd = Command::new(&config.binary);
        cmd.args(config.args_for(source_url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if config.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        hide_console_window(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn(config.binary.clone(), e))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.start_kill();
                return Err(Error::spawn(
                    config.binary.clone(),
                    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
                ));
            }
        };

        let pid = child.id();
        tracing::info!(binary = %config.binary, pid = ?pid, "Transcoder started");

        let process = Self {
            child: Some(child),
            pid,
            terminated: false,
        };

        Ok((process, Box::new(stdout)))
    }

    /// Handle for an upstream that is not backed by an OS process
    ///
    /// Used for in-memory sources; termination only flips the state.
    pub fn detached() -> Self {
        Self {
            child: None,
            pid: None,
            terminated: false,
        }
    }

    /// OS process id, if the process was spawned and is not yet reaped
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether `terminate` has been called
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Forcibly stop the process
    ///
    /// Returns `true` if this call performed the termination.
    pub fn terminate(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                // Already exited on its own
                tracing::debug!(pid = ?self.pid, error = %e, "Transcoder kill failed");
            }

            // Reap in the background so we don't leave a zombie behind
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let pid = self.pid;
                handle.spawn(async move {
                    match child.wait().await {
                        Ok(status) => tracing::debug!(pid = ?pid, %status, "Transcoder exited"),
                        Err(e) => tracing::warn!(pid = ?pid, error = %e, "Transcoder wait failed"),
                    }
                });
            }

            tracing::info!(pid = ?self.pid, "Transcoder terminated");
        }

        true
    }
}

impl Drop for UpstreamProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}
