//! Subscriber side of a hub

use bytes::Bytes;
use tokio::sync::mpsc;

/// One consumer's bounded chunk queue registered with a hub
///
/// `recv` returns `None` once the hub has closed the queue and every chunk
/// already queued has been drained.
#[derive(Debug)]
pub struct Subscriber {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscriber {
    pub(crate) fn new(id: u64, rx: mpsc::Receiver<Bytes>) -> Self {
        Self { id, rx }
    }

    /// Subscriber id, unique within its hub
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next chunk
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
