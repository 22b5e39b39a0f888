//! Hub configuration

use std::time::Duration;

/// Tuning for a single broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum bytes read from the upstream per chunk
    pub chunk_size: usize,

    /// Per-subscriber queue capacity, in chunks
    pub queue_capacity: usize,

    /// How long a chunk may wait for room in a full subscriber queue
    pub delivery_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32 * 1024,
            queue_capacity: 64,
            delivery_timeout: Duration::from_millis(100),
        }
    }
}

impl HubConfig {
    /// Set the read chunk size (at least 1 byte)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the subscriber queue capacity (at least 1 chunk)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the per-chunk delivery deadline
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.chunk_size, 32 * 1024);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.delivery_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_builder_clamps_zero() {
        // mpsc::channel panics on zero capacity
        let config = HubConfig::default().chunk_size(0).queue_capacity(0);

        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.queue_capacity, 1);
    }
}
