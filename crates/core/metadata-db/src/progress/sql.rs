//! Internal SQL operations for the `module_progress` table

use sqlx::{Executor, Postgres};

use super::{ModuleProgress, ProgressState};
use crate::{genomes::GenomeId, workers::WorkerId};

/// Take the transaction-scoped advisory lock of one module on one target
///
/// Serialises concurrent [`begin_attempt`](super::begin_attempt) calls for the same
/// (target, module name) pair until the enclosing transaction ends.
pub async fn lock_module<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
    module: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT pg_advisory_xact_lock(
            hashtextextended(COALESCE($1::BIGINT::TEXT, 'global') || '/' || $2, 0)
        )
    "#};
    sqlx::query(query)
        .bind(genome_id)
        .bind(module)
        .execute(exe)
        .await?;
    Ok(())
}

/// First `ACTIVE` or `UNDO` row of the listed modules held by another, still active worker
pub async fn find_running_elsewhere<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
    modules: &[String],
    owner: WorkerId,
) -> Result<Option<(String, WorkerId)>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT p.module, p.owner_worker_id
        FROM module_progress p
        JOIN workers w ON w.id = p.owner_worker_id
        WHERE p.genome_id IS NOT DISTINCT FROM $1
          AND p.module = ANY($2)
          AND p.state IN ('ACTIVE', 'UNDO')
          AND p.owner_worker_id <> $3
          AND w.active
        ORDER BY p.id
        LIMIT 1
    "#};
    sqlx::query_as(query)
        .bind(genome_id)
        .bind(modules)
        .bind(owner)
        .fetch_optional(exe)
        .await
}

/// Delete the rows of every listed module for the genome (or the global target)
///
/// Returns whether any deleted `DONE` row was flagged for redo.
pub async fn delete_for_modules<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
    modules: &[String],
) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        WITH deleted AS (
            DELETE FROM module_progress
            WHERE genome_id IS NOT DISTINCT FROM $1
              AND module = ANY($2)
            RETURNING redo, state
        )
        SELECT COALESCE(bool_or(redo AND state = 'DONE'), FALSE)
        FROM deleted
    "#};
    sqlx::query_scalar(query)
        .bind(genome_id)
        .bind(modules)
        .fetch_one(exe)
        .await
}

/// Bulk-insert one `ACTIVE` row per module name
pub async fn insert_active<'c, E>(
    exe: E,
    owner: WorkerId,
    genome_id: Option<GenomeId>,
    modules: &[String],
) -> Result<Vec<ModuleProgress>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        INSERT INTO module_progress (owner_worker_id, genome_id, module, state)
        SELECT $1, $2, m.module, $4
        FROM UNNEST($3::TEXT[]) WITH ORDINALITY AS m(module, ord)
        ORDER BY m.ord
        RETURNING id, owner_worker_id, genome_id, module, state, redo, error_message,
                  started_at, updated_at
    "#};
    sqlx::query_as(query)
        .bind(owner)
        .bind(genome_id)
        .bind(modules)
        .bind(ProgressState::Active)
        .fetch_all(exe)
        .await
}

/// Set the state and error message of the given rows that are currently in one of `from`
///
/// Returns the number of rows updated.
pub async fn update_state<'c, E>(
    exe: E,
    ids: &[i64],
    from: &[ProgressState],
    state: ProgressState,
    error_message: Option<&str>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE module_progress
        SET state = $2,
            error_message = $3,
            updated_at = now()
        WHERE id = ANY($1)
          AND state = ANY($4::TEXT[])
    "#};
    let from: Vec<&str> = from.iter().map(ProgressState::as_str).collect();
    let result = sqlx::query(query)
        .bind(ids)
        .bind(state)
        .bind(error_message)
        .bind(from)
        .execute(exe)
        .await?;
    Ok(result.rows_affected())
}

/// Fetch rows by ID, in ID order
pub async fn get_by_ids<'c, E>(exe: E, ids: &[i64]) -> Result<Vec<ModuleProgress>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, owner_worker_id, genome_id, module, state, redo, error_message,
               started_at, updated_at
        FROM module_progress
        WHERE id = ANY($1)
        ORDER BY id
    "#};
    sqlx::query_as(query).bind(ids).fetch_all(exe).await
}

/// List the rows of a genome together with the pipeline-global rows, in ID order
pub async fn list_visible<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
) -> Result<Vec<ModuleProgress>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, owner_worker_id, genome_id, module, state, redo, error_message,
               started_at, updated_at
        FROM module_progress
        WHERE genome_id IS NULL OR genome_id = $1
        ORDER BY id
    "#};
    sqlx::query_as(query).bind(genome_id).fetch_all(exe).await
}

/// List the rows of exactly one target (a genome, or the global target when `None`)
pub async fn list_by_target<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
) -> Result<Vec<ModuleProgress>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, owner_worker_id, genome_id, module, state, redo, error_message,
               started_at, updated_at
        FROM module_progress
        WHERE genome_id IS NOT DISTINCT FROM $1
        ORDER BY id
    "#};
    sqlx::query_as(query).bind(genome_id).fetch_all(exe).await
}

/// Names of the modules `DONE` and not flagged for redo on one target
pub async fn list_completed_modules<'c, E>(
    exe: E,
    genome_id: Option<GenomeId>,
) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT DISTINCT module
        FROM module_progress
        WHERE genome_id IS NOT DISTINCT FROM $1
          AND state = 'DONE'
          AND NOT redo
        ORDER BY module
    "#};
    sqlx::query_scalar(query).bind(genome_id).fetch_all(exe).await
}

/// Flag `DONE` rows for redo
///
/// A row matches when its full name, or its primary name (the part before `:`), is
/// listed. An empty genome list matches every genome but not the global target.
pub async fn mark_redo<'c, E>(
    exe: E,
    modules: &[String],
    genome_ids: &[GenomeId],
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE module_progress
        SET redo = TRUE,
            updated_at = now()
        WHERE state = 'DONE'
          AND (module = ANY($1) OR split_part(module, ':', 1) = ANY($1))
          AND (
              genome_id = ANY($2)
              OR (cardinality($2) = 0 AND genome_id IS NOT NULL)
          )
    "#};
    let result = sqlx::query(query)
        .bind(modules)
        .bind(genome_ids)
        .execute(exe)
        .await?;
    Ok(result.rows_affected())
}

/// Flag global `DONE` rows for redo
pub async fn mark_global_redo<'c, E>(exe: E, modules: &[String]) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE module_progress
        SET redo = TRUE,
            updated_at = now()
        WHERE state = 'DONE'
          AND genome_id IS NULL
          AND (module = ANY($1) OR split_part(module, ':', 1) = ANY($1))
    "#};
    let result = sqlx::query(query).bind(modules).execute(exe).await?;
    Ok(result.rows_affected())
}

/// Delete every `ERROR` row
///
/// Returns the number of rows deleted.
pub async fn delete_errors<'c, E>(exe: E) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        DELETE FROM module_progress
        WHERE state = 'ERROR'
    "#};
    let result = sqlx::query(query).execute(exe).await?;
    Ok(result.rows_affected())
}
