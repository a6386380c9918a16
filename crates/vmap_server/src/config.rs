//! Server configuration.

use std::time::Duration;

/// Configuration for the map server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum keys in a `get_leaves` request or leaves in a `set_leaves` request.
    pub max_leaves_per_request: usize,
    /// Time a write may take before it is abandoned.
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_leaves_per_request: 1024,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-request leaf limit.
    pub fn with_max_leaves_per_request(mut self, max: usize) -> Self {
        self.max_leaves_per_request = max;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_leaves_per_request, 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn builder_pattern() {
        let config = ServerConfig::new()
            .with_max_leaves_per_request(8)
            .with_request_timeout(Duration::from_millis(250));

        assert_eq!(config.max_leaves_per_request, 8);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }
}
