//! Module progress records
//!
//! Every module attempt on a target (one genome, or the pipeline-global target when the
//! genome is `NULL`) is recorded as one row per progress name: the module name, or one
//! `Name:submodule` row per submodule. Rows move `ACTIVE → [UNDO → ACTIVE] → DONE | ERROR`.
//! Before a fresh attempt, rows left by earlier attempts for the same names are deleted, so
//! the table only ever holds the latest attempt per (target, module name).

mod progress_state;
pub(crate) mod sql;

pub use self::progress_state::ProgressState;
use crate::{
    MetadataDb, Timestamp, db::Executor, error::Error, genomes::GenomeId, workers::WorkerId,
};

/// Record the start of a module attempt
///
/// In a single transaction:
///
///  1. Take the advisory lock of every (target, module name) pair, in name order
///  2. Fail with [`Error::AttemptInProgress`] if another active worker holds an `ACTIVE`
///     or `UNDO` row for one of the names
///  3. Delete the existing rows for the same target and module names
///  4. Insert one fresh `ACTIVE` row per name, owned by `owner`
///
/// The returned [`Attempt`] also reports whether any deleted row was a `DONE` row
/// flagged for redo, which asks the driver to undo the previous output first.
#[tracing::instrument(skip(db), err)]
pub async fn begin_attempt(
    db: &MetadataDb,
    owner: WorkerId,
    genome_id: Option<GenomeId>,
    modules: &[String],
) -> Result<Attempt, Error> {
    let mut tx = db.begin_txn().await?;

    let mut lock_order: Vec<&String> = modules.iter().collect();
    lock_order.sort();
    lock_order.dedup();
    for module in lock_order {
        sql::lock_module(&mut tx, genome_id, module)
            .await
            .map_err(Error::Database)?;
    }

    let running = sql::find_running_elsewhere(&mut tx, genome_id, modules, owner)
        .await
        .map_err(Error::Database)?;
    if let Some((module, running_owner)) = running {
        tx.rollback().await?;
        return Err(Error::AttemptInProgress {
            module,
            owner: running_owner,
        });
    }

    let redo_requested = sql::delete_for_modules(&mut tx, genome_id, modules)
        .await
        .map_err(Error::Database)?;
    let rows = sql::insert_active(&mut tx, owner, genome_id, modules)
        .await
        .map_err(Error::Database)?;

    tx.commit().await?;

    Ok(Attempt {
        rows,
        redo_requested,
    })
}

/// Move the rows of a running attempt from `from` to another non-terminal state
///
/// Fails with [`Error::ProgressStateConflict`] if any row is missing or not in `from`.
/// Rows that did match are updated anyway; run inside a [`Transaction`](crate::Transaction)
/// to make the change all-or-nothing.
#[tracing::instrument(skip(exe), err)]
pub async fn set_state<'c, E>(
    exe: E,
    ids: &[i64],
    from: ProgressState,
    to: ProgressState,
) -> Result<(), Error>
where
    E: Executor<'c>,
{
    let updated = sql::update_state(exe, ids, &[from], to, None)
        .await
        .map_err(Error::Database)?;
    if updated != ids.len() as u64 {
        return Err(Error::ProgressStateConflict {
            expected: ids.len(),
            updated,
        });
    }
    Ok(())
}

/// Record the end of a module attempt, moving all its rows to `state`
///
/// `DONE` is only reachable from `ACTIVE`; `ERROR` also from `UNDO`. Runs in one
/// transaction and returns the updated rows. If any row is missing or already ended, the
/// transaction is rolled back and [`Error::ProgressStateConflict`] is returned.
#[tracing::instrument(skip(db, error_message), err)]
pub async fn finish_attempt(
    db: &MetadataDb,
    ids: &[i64],
    state: ProgressState,
    error_message: Option<&str>,
) -> Result<Vec<ModuleProgress>, Error> {
    let mut tx = db.begin_txn().await?;

    let from: &[ProgressState] = match state {
        ProgressState::Done => &[ProgressState::Active],
        _ => &[ProgressState::Active, ProgressState::Undo],
    };
    let updated = sql::update_state(&mut tx, ids, from, state, error_message)
        .await
        .map_err(Error::Database)?;
    if updated != ids.len() as u64 {
        tx.rollback().await?;
        return Err(Error::ProgressStateConflict {
            expected: ids.len(),
            updated,
        });
    }

    let rows = sql::get_by_ids(&mut tx, ids)
        .await
        .map_err(Error::Database)?;

    tx.commit().await?;

    Ok(rows)
}

/// List the rows visible to a target: its own rows plus the pipeline-global rows
///
/// This is the state the dependency graph loads before checking a target's dependencies.
#[tracing::instrument(skip(exe), err)]
pub async fn list_visible<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
) -> Result<Vec<ModuleProgress>, Error>
where
    E: Executor<'c>,
{
    sql::list_visible(exe, genome_id)
        .await
        .map_err(Error::Database)
}

/// List the rows of exactly one target
#[tracing::instrument(skip(exe), err)]
pub async fn list_by_target<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
) -> Result<Vec<ModuleProgress>, Error>
where
    E: Executor<'c>,
{
    sql::list_by_target(exe, genome_id)
        .await
        .map_err(Error::Database)
}

/// Names of the modules completed on a target (`DONE` and not flagged for redo)
#[tracing::instrument(skip(exe), err)]
pub async fn list_completed_modules<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
) -> Result<Vec<String>, Error>
where
    E: Executor<'c>,
{
    sql::list_completed_modules(exe, genome_id)
        .await
        .map_err(Error::Database)
}

/// Flag completed modules for redo
///
/// `modules` may list primary names (matching every submodule row) or full
/// `Name:submodule` names. With `genome_ids` empty, every genome matches. When `global`
/// is set, pipeline-global rows are flagged as well.
///
/// Flagged rows no longer count as done for the claim filter, and the next attempt of
/// the module runs its undo step before running again. Returns the number of rows flagged.
#[tracing::instrument(skip(db), err)]
pub async fn mark_redo(
    db: &MetadataDb,
    modules: &[String],
    genome_ids: &[GenomeId],
    global: bool,
) -> Result<u64, Error> {
    let mut tx = db.begin_txn().await?;

    let mut flagged = sql::mark_redo(&mut tx, modules, genome_ids)
        .await
        .map_err(Error::Database)?;
    if global {
        flagged += sql::mark_global_redo(&mut tx, modules)
            .await
            .map_err(Error::Database)?;
    }

    tx.commit().await?;

    Ok(flagged)
}

/// Delete every `ERROR` row. Returns the number of rows deleted.
#[tracing::instrument(skip(exe), err)]
pub async fn delete_errors<'c, E>(exe: E) -> Result<u64, Error>
where
    E: Executor<'c>,
{
    sql::delete_errors(exe).await.map_err(Error::Database)
}

/// The rows created for a module attempt
#[derive(Debug, Clone)]
pub struct Attempt {
    /// One `ACTIVE` row per progress name
    pub rows: Vec<ModuleProgress>,
    /// Whether the replaced rows asked for the previous output to be undone
    pub redo_requested: bool,
}

impl Attempt {
    /// IDs of the attempt's rows
    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|row| row.id).collect()
    }
}

/// Represents one module progress row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ModuleProgress {
    /// Store-assigned row ID
    pub id: i64,
    /// Worker that made the attempt
    pub owner_worker_id: WorkerId,
    /// Target genome; `None` for pipeline-global modules
    pub genome_id: Option<GenomeId>,
    /// Progress name: `Name` or `Name:submodule`
    pub module: String,
    /// Current state of the attempt
    pub state: ProgressState,
    /// Whether an operator asked for this completed module to be redone
    pub redo: bool,
    /// Error message of a failed attempt
    pub error_message: Option<String>,
    /// Timestamp when the attempt started
    pub started_at: Timestamp,
    /// Timestamp of the last state change
    pub updated_at: Timestamp,
}

impl ModuleProgress {
    /// Whether the row counts as completed
    pub fn is_done(&self) -> bool {
        self.state == ProgressState::Done && !self.redo
    }
}

/// In-tree integration tests
#[cfg(test)]
mod tests {
    mod it_progress;
}
