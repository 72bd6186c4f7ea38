//! Configuration for the MAC engine and the routing layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Medium-access engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacConfig {
    /// Minimum backoff exponent (BE at the start of each contention round)
    pub min_be: u8,
    /// Maximum backoff exponent
    pub max_be: u8,
    /// CCA attempts per frame before declaring channel access failure
    pub max_csma_backoffs: u8,
    /// Retransmissions of a reliable frame beyond the first attempt
    pub max_retries: u8,
    /// Transmit queue capacity
    pub queue_capacity: usize,
    /// Period of the queue-check tick
    pub queue_tick: Duration,
    /// Minimum gap between transmission attempts of the same entry,
    /// leaving room for an acknowledgment to arrive
    pub resend_interval: Duration,
    /// Recent-receive cache capacity (duplicate frame suppression)
    pub recent_cache_capacity: usize,
    /// RNG seed for backoff draws and the initial sequence number
    pub seed: u64,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            min_be: 3,
            max_be: 5,
            max_csma_backoffs: 4,
            max_retries: 2,
            queue_capacity: 10,
            queue_tick: Duration::from_millis(1),
            resend_interval: Duration::from_millis(10),
            recent_cache_capacity: 50,
            seed: 0,
        }
    }
}

impl MacConfig {
    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Routing/flooding layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Topology beacon period (the neighbor refresh runs on the same tick)
    pub beacon_interval: Duration,
    /// Outbound message queue drain period
    pub drain_interval: Duration,
    /// Age after which a repeated (origin, sequence) is accepted again
    pub freshness_window: Duration,
    /// Forward sequence distance below which a message is considered new
    pub forgiveness_distance: u8,
    /// Beacon-history buffer capacity per neighbor
    pub history_capacity: usize,
    /// RNG seed for startup jitter
    pub seed: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            beacon_interval: Duration::from_secs(1),
            drain_interval: Duration::from_millis(1),
            freshness_window: Duration::from_secs(1),
            forgiveness_distance: 10,
            history_capacity: 8,
            seed: 0,
        }
    }
}

impl RoutingConfig {
    pub fn with_beacon_interval(mut self, interval: Duration) -> Self {
        self.beacon_interval = interval;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_defaults() {
        let config = MacConfig::default();
        assert!(config.min_be <= config.max_be);
        assert_eq!(config.max_csma_backoffs, 4);
        assert_eq!(config.recent_cache_capacity, 50);
    }

    #[test]
    fn test_routing_defaults() {
        let config = RoutingConfig::default();
        assert_eq!(config.beacon_interval, Duration::from_secs(1));
        assert_eq!(config.forgiveness_distance, 10);
        assert_eq!(config.history_capacity, 8);
    }

    #[test]
    fn test_builder() {
        let config = MacConfig::default().with_max_retries(5).with_seed(42);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.seed, 42);
    }
}
