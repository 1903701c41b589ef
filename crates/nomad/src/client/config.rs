//! Client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default upper bound on concurrent calls per phase
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

/// Timeouts and fan-out limits of a [`crate::NomadClient`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomadClientConfig {
    /// Bound on a single discover or mutative call
    pub request_timeout: Duration,
    /// Bound on establishing an endpoint connection
    pub connect_timeout: Duration,
    /// Maximum number of calls in flight within a phase
    pub max_concurrency: usize,
}

impl Default for NomadClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl NomadClientConfig {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the concurrency cap (at least 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Sizing policy derived from this configuration
    pub fn sizing(&self) -> ConcurrencySizing {
        ConcurrencySizing::new(self.max_concurrency)
    }
}

/// How many calls a phase runs concurrently
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConcurrencySizing {
    max: usize,
}

impl Default for ConcurrencySizing {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

impl ConcurrencySizing {
    /// Sizing capped at `max` workers
    pub fn new(max: usize) -> Self {
        Self { max: max.max(1) }
    }

    /// Workers for a phase over `server_count` servers
    pub fn thread_count(&self, server_count: usize) -> usize {
        server_count.clamp(1, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_count_scales_then_caps() {
        let sizing = ConcurrencySizing::default();
        assert_eq!(sizing.thread_count(1), 1);
        assert_eq!(sizing.thread_count(10), 10);
        assert_eq!(sizing.thread_count(64), 64);
        assert_eq!(sizing.thread_count(100), 64);
    }

    #[test]
    fn test_thread_count_never_zero() {
        assert_eq!(ConcurrencySizing::default().thread_count(0), 1);
        assert_eq!(ConcurrencySizing::new(0).thread_count(5), 1);
    }

    #[test]
    fn test_config_builders() {
        let config = NomadClientConfig::default()
            .with_request_timeout(Duration::from_millis(250))
            .with_connect_timeout(Duration::from_millis(100))
            .with_max_concurrency(4);

        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_millis(100));
        assert_eq!(config.sizing().thread_count(10), 4);
    }
}
