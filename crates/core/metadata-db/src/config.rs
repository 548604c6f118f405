//! Connection pool configuration for the metadata database.

use std::time::Duration;

/// Default maximum number of connections in the pool.
pub const DEFAULT_POOL_MAX_CONNECTIONS: u32 = 10;

/// Default maximum lifetime for a pooled connection (30 minutes).
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Default idle timeout for a pooled connection (10 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default acquire timeout when checking out a connection (30 seconds).
///
/// A worker blocked on the pool for this long has lost its store and fails the run.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection pool configuration.
///
/// A pipeline worker is a sequential loop, so it rarely holds more than two connections
/// (one transaction plus the module's own queries). The pool keeps one connection warm
/// between genomes.
///
/// | Field              | Default                                  |
/// |--------------------|------------------------------------------|
/// | `max_connections`  | [`DEFAULT_POOL_MAX_CONNECTIONS`] (10)    |
/// | `min_connections`  | 1                                        |
/// | `acquire_timeout`  | [`DEFAULT_ACQUIRE_TIMEOUT`] (30 s)       |
/// | `max_lifetime`     | [`DEFAULT_MAX_LIFETIME`] (30 min)        |
/// | `idle_timeout`     | [`DEFAULT_IDLE_TIMEOUT`] (10 min)        |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to keep alive in the pool.
    pub min_connections: u32,
    /// Maximum time to wait for a connection from the pool before failing.
    pub acquire_timeout: Duration,
    /// Maximum lifetime of a connection before it is recycled.
    pub max_lifetime: Duration,
    /// How long a connection may sit idle before being closed.
    pub idle_timeout: Duration,
}

impl PoolConfig {
    /// Creates a `PoolConfig` with the given pool size.
    ///
    /// A size of zero is raised to one; sqlx refuses a pool without connections.
    pub fn with_size(size: u32) -> Self {
        Self {
            max_connections: size.max(1),
            ..Self::default()
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_POOL_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
