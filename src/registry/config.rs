//! Registry configuration

use std::time::Duration;

use crate::hub::HubConfig;

/// Configuration for the source registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a hub with no sessions keeps its transcoder running
    pub grace_period: Duration,

    /// Configuration applied to every hub the registry creates
    pub hub: HubConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            hub: HubConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the teardown grace period
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the hub configuration
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.hub.queue_capacity, HubConfig::default().queue_capacity);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .grace_period(Duration::from_millis(250))
            .hub(HubConfig::default().chunk_size(1024));

        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert_eq!(config.hub.chunk_size, 1024);
    }
}
