use std::time::Duration;

/// Default wait between two attempts to start a once module another worker is running
pub const DEFAULT_ATTEMPT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration specific to the worker service
///
/// Created from the `[worker]` section of the configuration file by the genopiped binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Public network address recorded on the worker row
    pub address: Option<String>,
    /// How long to wait before checking again on a once module running in another worker
    pub attempt_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: None,
            attempt_poll_interval: DEFAULT_ATTEMPT_POLL_INTERVAL,
        }
    }
}

impl From<&genopipe_config::WorkerConfig> for Config {
    fn from(config: &genopipe_config::WorkerConfig) -> Self {
        Self {
            address: config.address.clone(),
            ..Default::default()
        }
    }
}
