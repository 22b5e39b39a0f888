//! Release handle for an acquired hub

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::hub::BroadcastHub;

use super::store::SourceRegistry;

/// One unit of a hub's refcount
///
/// Returned by [`SourceRegistry::acquire`]. Releasing decrements the hub's
/// refcount exactly once, no matter how often `release` is called; dropping
/// the lease releases it too. When the count reaches zero the registry
/// schedules a teardown after the grace period.
pub struct Lease {
    registry: Weak<SourceRegistry>,
    hub: Arc<BroadcastHub>,
    released: AtomicBool,
}

impl Lease {
    pub(super) fn new(registry: &Arc<SourceRegistry>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            hub,
            released: AtomicBool::new(false),
        }
    }

    /// Hub this lease holds
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Whether the lease has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Give the hub back
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        let remaining = self.hub.release();
        tracing::debug!(
            source = %self.hub.key(),
            hub_id = self.hub.id(),
            refcount = remaining,
            "Hub released"
        );

        if remaining == 0 {
            if let Some(registry) = self.registry.upgrade() {
                registry.schedule_teardown(&self.hub);
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("source", self.hub.key())
            .field("hub_id", &self.hub.id())
            .field("released", &self.is_released())
            .finish()
    }
}
