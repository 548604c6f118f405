use metadata_db::PoolConfig;
pub use metadata_db::DEFAULT_POOL_SIZE as DEFAULT_METADB_CONN_POOL_SIZE;

use crate::redacted::Redacted;

/// Metadata database connection and behavior settings.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MetadataDbConfig {
    /// Database connection URL (required)
    pub url: Redacted<String>,
    /// Size of the connection pool (default: 10)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Automatically run database migrations on startup (default: true)
    #[serde(default = "default_auto_migrate")]
    pub auto_migrate: bool,
}

impl MetadataDbConfig {
    /// Pool settings derived from `pool_size`
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::with_size(self.pool_size)
    }
}

/// Serde default for [`MetadataDbConfig::pool_size`]. Returns [`DEFAULT_METADB_CONN_POOL_SIZE`].
fn default_pool_size() -> u32 {
    DEFAULT_METADB_CONN_POOL_SIZE
}

/// Serde default for [`MetadataDbConfig::auto_migrate`]. Returns `true`.
fn default_auto_migrate() -> bool {
    true
}
