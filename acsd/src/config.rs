//! Daemon configuration.

use crate::library::SeqNo;
use std::time::Duration;

/// Default listening port of the mount service.
const DEFAULT_PORT: u16 = 54521;

/// Default interval between polls inside a blocking library operation.
const DEFAULT_QUERY_INTERVAL_SECS: u64 = 10;

/// Default total budget for one library operation. Robot moves take
/// seconds to minutes; ten minutes covers a pass-through between zones.
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 610;

/// Default upper bound of the sequence-number space.
const DEFAULT_MAX_SEQ: SeqNo = 65535;

/// Configuration consumed by the daemon core. Loading (flags today, a
/// site config mechanism in deployment) happens outside; this struct is
/// what gets passed in.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// TCP listening port.
    pub port: u16,

    /// Poll interval inside `poll_until_final`.
    pub query_interval: Duration,

    /// Total wall-clock budget for one library operation.
    pub command_timeout: Duration,

    /// Largest assignable sequence number.
    pub max_seq: SeqNo,

    /// Cadence of the control loop's tick/sweep pass.
    pub tick_interval: Duration,

    /// Minimum spacing between registry probes of the library.
    pub probe_interval: Duration,

    /// Wait used by the registry's poll-for-existence probe.
    pub probe_timeout: Duration,

    /// Number of blocking mount executors; one concurrent mount each.
    pub mount_workers: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            query_interval: Duration::from_secs(DEFAULT_QUERY_INTERVAL_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_seq: DEFAULT_MAX_SEQ,
            tick_interval: Duration::from_millis(250),
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::ZERO,
            mount_workers: 1,
        }
    }
}

impl DaemonConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn query_interval(mut self, interval: Duration) -> Self {
        self.query_interval = interval;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn max_seq(mut self, max_seq: SeqNo) -> Self {
        self.max_seq = max_seq;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn mount_workers(mut self, workers: usize) -> Self {
        self.mount_workers = workers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.port, 54521);
        assert_eq!(config.query_interval, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_secs(610));
        assert_eq!(config.max_seq, 65535);
        assert_eq!(config.mount_workers, 1);
    }

    #[test]
    fn test_builder_pattern() {
        let config = DaemonConfig::new()
            .port(0)
            .query_interval(Duration::from_millis(50))
            .mount_workers(4);

        assert_eq!(config.port, 0);
        assert_eq!(config.query_interval, Duration::from_millis(50));
        assert_eq!(config.mount_workers, 4);
    }
}
