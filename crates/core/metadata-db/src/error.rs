//! Error types for metadata database operations

use crate::{db::ConnError, workers::WorkerId};

/// Errors that can occur when interacting with the metadata database
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to establish a connection to the metadata database.
    #[error("Error connecting to metadata db: {0}")]
    Connection(#[source] sqlx::Error),

    /// Failed to apply the schema migrations.
    #[error("Error running migrations: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// A query or transaction statement failed.
    #[error("Error executing database query: {0}")]
    Database(#[source] sqlx::Error),

    /// A state change touched fewer progress rows than the attempt created.
    ///
    /// Rows were deleted, or moved out of the expected prior state, by another process,
    /// for example an operator running the reclaim maintenance operation against a live
    /// worker.
    #[error("Progress state conflict: expected to update {expected} rows, updated {updated}")]
    ProgressStateConflict { expected: usize, updated: u64 },

    /// Another live worker is running the module on the same target.
    ///
    /// Its `ACTIVE` or `UNDO` rows are left untouched. Rows of workers that are no longer
    /// active do not count: a crashed attempt is replaced once its worker is marked failed.
    #[error("Module {module} is already running in worker {owner}")]
    AttemptInProgress { module: String, owner: WorkerId },
}

impl Error {
    /// Returns `true` if the error is likely to be a transient connection issue.
    ///
    /// The pipeline core does not retry on its own; callers such as test harnesses and
    /// operators scripting the CLI use this to tell network trouble apart from real failures.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(_) => true,
            Error::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

impl From<ConnError> for Error {
    fn from(err: ConnError) -> Self {
        match err {
            ConnError::ConnectionError(err) => Error::Connection(err),
            ConnError::MigrationFailed(err) => Error::Migration(err),
        }
    }
}
