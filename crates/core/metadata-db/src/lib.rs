//! Shared state of the genome pipeline
//!
//! Every worker process coordinates with its peers only through this store: the `workers`
//! table records process identities and exit states, `genomes` carries the exclusive owner
//! claim, and `module_progress` records each module attempt.
//!
//! Public operations are free functions grouped by table, taking any [`Executor`] so they
//! can run either directly on the pool (`&MetadataDb`) or inside a [`Transaction`].
//! Operations that must be atomic across several statements take `&MetadataDb` and open
//! their own transaction.

use futures::{future::BoxFuture, stream::BoxStream};
use tracing::instrument;

mod config;
mod db;
mod error;
pub mod genomes;
pub mod maintenance;
pub mod progress;
pub mod workers;

use self::db::ConnPool;
pub use self::{
    config::{
        DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_LIFETIME,
        DEFAULT_POOL_MAX_CONNECTIONS, PoolConfig,
    },
    db::{ConnError, Executor, Transaction},
    error::Error,
    genomes::{ClaimFilter, Genome, GenomeId, GenomeIdFromStrError, GenomeIdI64ConvError},
    maintenance::ReclaimSummary,
    progress::{Attempt, ModuleProgress, ProgressState},
    workers::{Worker, WorkerId, WorkerIdI64ConvError, WorkerRegistration},
};

/// Timestamp type of every `TIMESTAMPTZ` column.
pub type Timestamp = sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>;

/// Default pool size for the metadata DB.
pub const DEFAULT_POOL_SIZE: u32 = DEFAULT_POOL_MAX_CONNECTIONS;

/// Connection pool to the metadata DB. Clones will refer to the same instance.
#[derive(Clone, Debug)]
pub struct MetadataDb {
    pool: ConnPool,
}

impl MetadataDb {
    /// Sets up a connection pool to the Metadata DB
    ///
    /// Runs migrations if necessary.
    #[instrument(skip_all, err)]
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, Error> {
        Self::connect_with_config(url, PoolConfig::with_size(pool_size), true).await
    }

    /// Sets up a connection pool to the Metadata DB with configurable migration behavior
    ///
    /// Runs migrations only if `auto_migrate` is true.
    #[instrument(skip_all, err)]
    pub async fn connect_with_config(
        url: &str,
        pool_config: PoolConfig,
        auto_migrate: bool,
    ) -> Result<Self, Error> {
        let pool = ConnPool::connect(url, &pool_config).await?;
        if auto_migrate {
            pool.run_migrations().await?;
        }
        Ok(Self { pool })
    }

    /// Sets up a connection pool with retry logic for freshly started temporary databases.
    ///
    /// A pgtemp instance may still reject connections with `57P03` (database starting up)
    /// right after spawning; those are retried with a short exponential backoff.
    #[cfg(any(test, feature = "temp-db"))]
    #[instrument(skip_all, err)]
    pub async fn connect_with_retry(url: &str, pool_size: u32) -> Result<Self, Error> {
        use std::time::Duration;

        use backon::{ExponentialBuilder, Retryable};

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100))
            .with_max_times(20);

        fn is_db_starting_up(err: &ConnError) -> bool {
            matches!(
                err,
                ConnError::ConnectionError(sqlx::Error::Database(db_err))
                if db_err.code().is_some_and(|code| code == "57P03")
            )
        }

        fn notify_retry(err: &ConnError, dur: Duration) {
            tracing::warn!(
                error = %err,
                "Database still starting up during connection. Retrying in {:.1}s",
                dur.as_secs_f32()
            );
        }

        let pool_config = PoolConfig::with_size(pool_size);
        let pool = (|| ConnPool::connect(url, &pool_config))
            .retry(retry_policy)
            .when(is_db_starting_up)
            .notify(notify_retry)
            .await?;

        pool.run_migrations().await?;

        Ok(Self { pool })
    }

    /// Applies pending schema migrations.
    ///
    /// Used by `genopiped migrate` when `auto_migrate` is disabled for regular workers.
    #[instrument(skip(self), err)]
    pub async fn run_migrations(&self) -> Result<(), Error> {
        self.pool.run_migrations().await.map_err(Into::into)
    }

    /// Begins a new database transaction
    ///
    /// Returns a `Transaction` that provides RAII semantics - it will automatically
    /// roll back when dropped unless explicitly committed with `.commit()`.
    #[instrument(skip(self), err)]
    pub async fn begin_txn(&self) -> Result<Transaction, Error> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Transaction::new(tx))
    }
}

// Implement sqlx::Executor for &MetadataDb by delegating to the pool
impl<'c> sqlx::Executor<'c> for &'c MetadataDb {
    type Database = sqlx::Postgres;

    fn fetch_many<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> BoxStream<
        'e,
        Result<
            sqlx::Either<
                <sqlx::Postgres as sqlx::Database>::QueryResult,
                <sqlx::Postgres as sqlx::Database>::Row,
            >,
            sqlx::Error,
        >,
    >
    where
        'c: 'e,
        E: 'q + sqlx::Execute<'q, Self::Database>,
    {
        (&*self.pool).fetch_many(query)
    }

    fn fetch_optional<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> BoxFuture<'e, Result<Option<<sqlx::Postgres as sqlx::Database>::Row>, sqlx::Error>>
    where
        'c: 'e,
        E: 'q + sqlx::Execute<'q, Self::Database>,
    {
        (&*self.pool).fetch_optional(query)
    }

    fn prepare_with<'e, 'q: 'e>(
        self,
        sql: &'q str,
        parameters: &'e [<sqlx::Postgres as sqlx::Database>::TypeInfo],
    ) -> BoxFuture<'e, Result<<sqlx::Postgres as sqlx::Database>::Statement<'q>, sqlx::Error>>
    where
        'c: 'e,
    {
        (&*self.pool).prepare_with(sql, parameters)
    }

    fn describe<'e, 'q: 'e>(
        self,
        sql: &'q str,
    ) -> BoxFuture<'e, Result<sqlx::Describe<Self::Database>, sqlx::Error>>
    where
        'c: 'e,
    {
        (&*self.pool).describe(sql)
    }
}

impl<'c> Executor<'c> for &'c MetadataDb {}

impl _priv::Sealed for &MetadataDb {}

/// Private module for sealed trait pattern
///
/// This module contains the `Sealed` trait which prevents external crates from implementing
/// the `Executor` trait. Only types within this crate can implement `Sealed`, and therefore
/// only they can implement `Executor`.
mod _priv {
    pub trait Sealed {}
}

#[cfg(test)]
mod tests {
    mod it_txn;
}
