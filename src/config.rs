//! Application constants and service configuration.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Application-level constants
pub const APP_NAME: &str = "Cliniq";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    format!("info,{}=debug", env!("CARGO_PKG_NAME"))
}

/// Initialize tracing for binaries and integration harnesses.
/// Library consumers that install their own subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .init();
}

/// Upload queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Concurrent transfers the drain loop may hold in flight.
    pub concurrency: usize,
    /// Capacity of the workflow event channel.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            event_capacity: 256,
        }
    }
}

/// Batch completion tuning.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Upper bound on waiting for in-flight tasks before degrading to force.
    pub wait_timeout: Duration,
    /// How often the wait path re-checks the pending count.
    pub poll_granularity: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            poll_granularity: Duration::from_millis(250),
        }
    }
}

/// Live sync tuning for the reviewing side.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between artifact fetches for the selected patient.
    pub poll_interval: Duration,
    /// Delay before starting a fresh loop after a patient switch,
    /// absorbing rapid re-selection.
    pub debounce: Duration,
    /// How long a cached fingerprint stays valid.
    pub cache_ttl: Duration,
    /// Capacity of the sync event channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            debounce: Duration::from_millis(100),
            cache_ttl: Duration::from_secs(300),
            event_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_is_cliniq() {
        assert_eq!(APP_NAME, "Cliniq");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn queue_defaults_single_concurrency() {
        let config = QueueConfig::default();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn completion_defaults() {
        let config = CompletionConfig::default();
        assert_eq!(config.wait_timeout, Duration::from_secs(30));
        assert!(config.poll_granularity < config.wait_timeout);
    }

    #[test]
    fn sync_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.debounce, Duration::from_millis(100));
    }

    #[test]
    fn default_filter_mentions_crate() {
        assert!(default_log_filter().contains("cliniq"));
    }
}
