//! Worker process records
//!
//! A row is inserted once when a worker process starts and updated exactly once when it
//! ends. Rows are never deleted: a worker that stopped with `normal_exit = false` is the
//! anchor the maintenance operations use to find abandoned genomes.

use sqlx::types::JsonValue;

pub(crate) mod sql;
mod worker_id;

pub use self::worker_id::{WorkerId, WorkerIdI64ConvError};
use crate::{Timestamp, db::Executor, error::Error};

/// Identity of a worker process about to register
#[derive(Debug, Clone)]
pub struct WorkerRegistration<'a> {
    /// Host name of the machine the worker runs on
    pub host: &'a str,
    /// OS process ID
    pub pid: u32,
    /// Public network address, if the operator configured one
    pub address: Option<&'a str>,
    /// The requested genome selector and module lists, as JSON
    pub job: &'a JsonValue,
}

/// Register a worker process and return its store-assigned ID
///
/// The row starts out `active = true, normal_exit = false`, so a process that dies
/// without reaching [`finish`] is indistinguishable from one that crashed.
#[tracing::instrument(skip(exe, registration), fields(host = registration.host, pid = registration.pid), err)]
pub async fn register<'c, E>(
    exe: E,
    registration: &WorkerRegistration<'_>,
) -> Result<WorkerId, Error>
where
    E: Executor<'c>,
{
    // PIDs fit in a signed 32 bit integer on every platform PostgreSQL runs on
    let pid = i32::try_from(registration.pid).unwrap_or(i32::MAX);
    sql::insert(
        exe,
        registration.host,
        pid,
        registration.address,
        registration.job,
    )
    .await
    .map_err(Error::Database)
}

/// Persist the final state of a worker: `active = false` plus the exit outcome
///
/// Returns `false` if the worker row was already finalized (or does not exist).
#[tracing::instrument(skip(exe, error_message), err)]
pub async fn finish<'c, E>(
    exe: E,
    id: WorkerId,
    normal_exit: bool,
    error_message: Option<&str>,
) -> Result<bool, Error>
where
    E: Executor<'c>,
{
    sql::finish(exe, id, normal_exit, error_message)
        .await
        .map_err(Error::Database)
}

/// Get a worker by ID
#[tracing::instrument(skip(exe), err)]
pub async fn get_by_id<'c, E>(exe: E, id: WorkerId) -> Result<Option<Worker>, Error>
where
    E: Executor<'c>,
{
    sql::get_by_id(exe, id).await.map_err(Error::Database)
}

/// List workers that stopped with `normal_exit = false`
#[tracing::instrument(skip(exe), err)]
pub async fn list_failed<'c, E>(exe: E) -> Result<Vec<Worker>, Error>
where
    E: Executor<'c>,
{
    sql::list_failed(exe).await.map_err(Error::Database)
}

/// Represents a worker process in the metadata database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Worker {
    /// Store-assigned ID
    pub id: WorkerId,
    /// Host name of the machine the worker ran on
    pub host: String,
    /// OS process ID
    pub pid: i32,
    /// Public network address, if any
    pub address: Option<String>,
    /// Whether the process has not yet recorded its final state
    pub active: bool,
    /// Whether the process finished without error
    pub normal_exit: bool,
    /// Error message and cause chain of an abnormal exit
    pub error_message: Option<String>,
    /// The requested job, as registered
    pub job: JsonValue,
    /// Timestamp when the worker registered
    pub created_at: Timestamp,
    /// Timestamp when the worker recorded its final state
    pub finished_at: Option<Timestamp>,
}
