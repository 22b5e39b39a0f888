//! Source registry implementation
//!
//! Owns the key → hub map and makes every hub lifetime decision: lazy
//! creation on first acquire, reuse while alive, delayed teardown once the
//! last session is gone, and immediate removal when the upstream ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::hub::BroadcastHub;
use crate::upstream::Launcher;

use super::config::RegistryConfig;
use super::key::SourceKey;
use super::lease::Lease;

/// Registry of live hubs, one per source key
///
/// Create one at server start (wrapped in an `Arc`) and call
/// [`shutdown`](Self::shutdown) when the server stops. The map lock is only
/// held for lookups, spawns and teardown checks; refcount changes on a hub
/// are atomic and do not take it.
pub struct SourceRegistry {
    /// Map of source key to live hub
    hubs: Mutex<HashMap<SourceKey, Arc<BroadcastHub>>>,

    /// Starts upstream processes
    launcher: Arc<dyn Launcher>,

    /// Configuration
    config: RegistryConfig,

    /// Generation counter for hub ids
    next_hub_id: AtomicU64,
}

impl SourceRegistry {
    /// Create a new registry with default configuration
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self::with_config(launcher, RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(launcher: Arc<dyn Launcher>, config: RegistryConfig) -> Self {
        Self {
            hubs: Mutex::new(HashMap::new()),
            launcher,
            config,
            next_hub_id: AtomicU64::new(1),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get or create the hub for `key`, taking one reference on it
    ///
    /// If no live hub exists, the upstream for `source_url` is launched and a
    /// new hub is registered with refcount 1. Spawn failures are returned to
    /// this caller and nothing is registered.
    pub async fn acquire(
        self: &Arc<Self>,
        key: &SourceKey,
        source_url: &str,
    ) -> Result<(Arc<BroadcastHub>, Lease)> {
        let mut hubs = self.hubs.lock().await;

        if let Some(hub) = hubs.get(key) {
            if !hub.is_closed() {
                let refcount = hub.retain();
                tracing::debug!(
                    source = %key,
                    hub_id = hub.id(),
                    refcount = refcount,
                    "Hub acquired (existing)"
                );

                let hub = Arc::clone(hub);
                let lease = Lease::new(self, Arc::clone(&hub));
                return Ok((hub, lease));
            }

            // Upstream ended but the close watcher hasn't run yet
            hubs.remove(key);
        }

        let (process, reader) = self.launcher.launch(source_url).map_err(|e| {
            tracing::warn!(source = %key, error = %e, "Failed to start upstream");
            e
        })?;

        let id = self.next_hub_id.fetch_add(1, Ordering::Relaxed);
        let hub = BroadcastHub::start(key.clone(), id, process, reader, self.config.hub.clone());
        hub.retain();

        hubs.insert(key.clone(), Arc::clone(&hub));
        self.watch_close(&hub);

        tracing::info!(source = %key, hub_id = id, "Hub acquired (new)");

        let lease = Lease::new(self, Arc::clone(&hub));
        Ok((hub, lease))
    }

    /// Get the live hub for a key, if any
    pub async fn hub(&self, key: &SourceKey) -> Option<Arc<BroadcastHub>> {
        self.hubs.lock().await.get(key).cloned()
    }

    /// Number of registered hubs
    pub async fn len(&self) -> usize {
        self.hubs.lock().await.len()
    }

    /// Whether no hubs are registered
    pub async fn is_empty(&self) -> bool {
        self.hubs.lock().await.is_empty()
    }

    /// Close every hub and clear the registry
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<BroadcastHub>> = {
            let mut hubs = self.hubs.lock().await;
            hubs.drain().map(|(_, hub)| hub).collect()
        };

        tracing::info!(hubs = drained.len(), "Registry shutting down");

        for hub in drained {
            hub.close();
        }
    }

    /// Schedule a teardown check for `hub` after the grace period
    pub(super) fn schedule_teardown(self: &Arc<Self>, hub: &Arc<BroadcastHub>) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    source = %hub.key(),
                    hub_id = hub.id(),
                    "No runtime to schedule teardown; hub stays until shutdown"
                );
                return;
            }
        };

        let registry = Arc::downgrade(self);
        let key = hub.key().clone();
        let id = hub.id();
        let grace = self.config.grace_period;

        tracing::debug!(
            source = %key,
            hub_id = id,
            grace_ms = grace.as_millis() as u64,
            "Refcount reached zero, teardown scheduled"
        );

        handle.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(registry) = registry.upgrade() {
                registry.teardown_if_idle(&key, id).await;
            }
        });
    }

    /// Close and remove the hub if it is still the same generation and has
    /// been unused for the whole grace period
    ///
    /// Returns `true` if the hub was torn down.
    pub(super) async fn teardown_if_idle(&self, key: &SourceKey, id: u64) -> bool {
        let mut hubs = self.hubs.lock().await;

        let hub = match hubs.get(key) {
            Some(hub) if hub.id() == id => hub,
            Some(hub) => {
                tracing::debug!(
                    source = %key,
                    hub_id = id,
                    current_hub_id = hub.id(),
                    "Teardown skipped, hub replaced"
                );
                return false;
            }
            None => {
                tracing::debug!(source = %key, hub_id = id, "Teardown skipped, hub gone");
                return false;
            }
        };

        let idle_for = match hub.idle_for() {
            Some(idle_for) => idle_for,
            None => {
                tracing::info!(
                    source = %key,
                    hub_id = id,
                    refcount = hub.refcount(),
                    "Teardown abandoned, hub reacquired"
                );
                return false;
            }
        };

        // Stale timer from before a reacquire; the latest release scheduled its own
        if idle_for < self.config.grace_period {
            tracing::debug!(
                source = %key,
                hub_id = id,
                idle_ms = idle_for.as_millis() as u64,
                "Teardown deferred, idle for less than grace period"
            );
            return false;
        }

        hub.close();
        hubs.remove(key);
        tracing::info!(source = %key, hub_id = id, "Hub torn down after grace period");
        true
    }

    /// Drop the map entry as soon as the hub closes on its own
    fn watch_close(self: &Arc<Self>, hub: &Arc<BroadcastHub>) {
        let registry = Arc::downgrade(self);
        let closed = hub.close_token();
        let key = hub.key().clone();
        let id = hub.id();

        tokio::spawn(async move {
            closed.cancelled().await;

            let Some(registry) = registry.upgrade() else {
                return;
            };

            let mut hubs = registry.hubs.lock().await;
            if hubs.get(&key).is_some_and(|hub| hub.id() == id) {
                hubs.remove(&key);
                tracing::info!(source = %key, hub_id = id, "Closed hub removed");
            }
        });
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
