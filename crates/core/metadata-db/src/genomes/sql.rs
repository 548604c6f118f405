//! Internal SQL operations for the `genomes` table

use sqlx::{Executor, Postgres};

use super::{Genome, GenomeId};
use crate::workers::WorkerId;

/// Insert a genome by name, returning the existing ID if the name is already registered
pub async fn upsert<'c, E>(exe: E, name: &str) -> Result<GenomeId, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    // The no-op update makes RETURNING yield the existing row on conflict
    let query = indoc::indoc! {r#"
        INSERT INTO genomes (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
    "#};
    sqlx::query_scalar(query).bind(name).fetch_one(exe).await
}

/// Get a genome by ID
pub async fn get_by_id<'c, E>(exe: E, id: GenomeId) -> Result<Option<Genome>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, name, owner_worker_id, created_at
        FROM genomes
        WHERE id = $1
    "#};
    sqlx::query_as(query).bind(id).fetch_optional(exe).await
}

/// List the genomes currently owned by the given worker, in ID order
pub async fn list_owned_by<'c, E>(exe: E, owner: WorkerId) -> Result<Vec<Genome>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, name, owner_worker_id, created_at
        FROM genomes
        WHERE owner_worker_id = $1
        ORDER BY id
    "#};
    sqlx::query_as(query).bind(owner).fetch_all(exe).await
}

/// Select and row-lock the lowest-ID unowned genome matching the claim filter
///
/// A genome is a candidate when it is unowned, has no progress row written by
/// `skip_visited_by` (if set), and either explicitly
/// requested, or the redo flag is set, or its set of `DONE`, non-redo progress module
/// names does not contain every expected name.
///
/// `SKIP LOCKED` lets concurrent claimers move on to the next candidate instead of
/// re-checking a row that a peer is in the middle of claiming.
pub async fn select_candidate_for_update<'c, E>(
    exe: E,
    expected_modules: &[String],
    explicit_ids: &[GenomeId],
    skip_visited_by: Option<WorkerId>,
    redo: bool,
) -> Result<Option<GenomeId>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT g.id
        FROM genomes g
        WHERE g.owner_worker_id IS NULL
          AND (
              $3::BIGINT IS NULL
              OR NOT EXISTS (
                  SELECT 1
                  FROM module_progress v
                  WHERE v.genome_id = g.id
                    AND v.owner_worker_id = $3
              )
          )
          AND (
              g.id = ANY($2)
              OR $4
              OR NOT (
                  COALESCE(
                      (
                          SELECT array_agg(DISTINCT p.module)
                          FROM module_progress p
                          WHERE p.genome_id = g.id
                            AND p.state = 'DONE'
                            AND NOT p.redo
                      ),
                      '{}'::TEXT[]
                  ) @> $1::TEXT[]
              )
          )
        ORDER BY g.id
        LIMIT 1
        FOR UPDATE OF g SKIP LOCKED
    "#};
    sqlx::query_scalar(query)
        .bind(expected_modules)
        .bind(explicit_ids)
        .bind(skip_visited_by)
        .bind(redo)
        .fetch_optional(exe)
        .await
}

/// Set the owner of a genome
pub async fn set_owner<'c, E>(exe: E, id: GenomeId, owner: WorkerId) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE genomes
        SET owner_worker_id = $2
        WHERE id = $1
    "#};
    sqlx::query(query).bind(id).bind(owner).execute(exe).await?;
    Ok(())
}

/// Clear the owner of a genome if it is held by the given worker
///
/// Returns whether the claim was released.
pub async fn clear_owner<'c, E>(exe: E, id: GenomeId, owner: WorkerId) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE genomes
        SET owner_worker_id = NULL
        WHERE id = $1 AND owner_worker_id = $2
    "#};
    let result = sqlx::query(query).bind(id).bind(owner).execute(exe).await?;
    Ok(result.rows_affected() > 0)
}

/// Clear the owner of every genome held by any of the given workers
///
/// Returns the IDs of the released genomes.
pub async fn clear_owners<'c, E>(
    exe: E,
    owners: &[WorkerId],
) -> Result<Vec<GenomeId>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE genomes
        SET owner_worker_id = NULL
        WHERE owner_worker_id = ANY($1)
        RETURNING id
    "#};
    sqlx::query_scalar(query).bind(owners).fetch_all(exe).await
}
