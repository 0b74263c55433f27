//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration of the `valinfra` binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the health endpoints listen on.
    pub listen_addr: String,
    /// `RocksDB` data directory.
    pub data_dir: PathBuf,
    /// Inbox (queue) the driver result events are consumed from.
    pub event_inbox: String,
    /// Optional JSON file of network setup configurations to seed at startup.
    pub network_config_path: Option<PathBuf>,
    /// Delay before resubscribing after the event inbox ends; doubles on
    /// consecutive subscribe failures.
    pub resubscribe_delay: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("/data/valinfra"),
            event_inbox: "validatorservice.events".to_string(),
            network_config_path: None,
            resubscribe_delay: Duration::from_secs(1),
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `LISTEN_ADDR`, `DATA_DIR`, `EVENT_INBOX`, `NETWORK_CONFIG_PATH`
    /// and `RESUBSCRIBE_DELAY_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = val;
        }

        if let Ok(val) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("EVENT_INBOX") {
            if !val.is_empty() {
                config.event_inbox = val;
            }
        }

        config.network_config_path = std::env::var("NETWORK_CONFIG_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        if let Ok(val) = std::env::var("RESUBSCRIBE_DELAY_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                if ms > 0 {
                    config.resubscribe_delay = Duration::from_millis(ms);
                }
            }
        }

        config
    }
}
