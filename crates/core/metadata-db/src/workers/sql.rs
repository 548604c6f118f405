//! Internal SQL operations for the `workers` table

use sqlx::{Executor, Postgres, types::JsonValue};

use super::{Worker, WorkerId};

/// Insert a new worker row with `active = true` and return its store-assigned ID
pub async fn insert<'c, E>(
    exe: E,
    host: &str,
    pid: i32,
    address: Option<&str>,
    job: &JsonValue,
) -> Result<WorkerId, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        INSERT INTO workers (host, pid, address, job)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    "#};
    sqlx::query_scalar(query)
        .bind(host)
        .bind(pid)
        .bind(address)
        .bind(job)
        .fetch_one(exe)
        .await
}

/// Record the final state of a worker
///
/// Only rows still marked active are touched, so the final state is written at most once.
/// Returns whether a row was updated.
pub async fn finish<'c, E>(
    exe: E,
    id: WorkerId,
    normal_exit: bool,
    error_message: Option<&str>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE workers
        SET active = FALSE,
            normal_exit = $2,
            error_message = $3,
            finished_at = now()
        WHERE id = $1 AND active
    "#};
    let result = sqlx::query(query)
        .bind(id)
        .bind(normal_exit)
        .bind(error_message)
        .execute(exe)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Get a worker by ID
pub async fn get_by_id<'c, E>(exe: E, id: WorkerId) -> Result<Option<Worker>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, host, pid, address, active, normal_exit, error_message, job,
               created_at, finished_at
        FROM workers
        WHERE id = $1
    "#};
    sqlx::query_as(query).bind(id).fetch_optional(exe).await
}

/// List workers that stopped without a normal exit, oldest first
pub async fn list_failed<'c, E>(exe: E) -> Result<Vec<Worker>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, host, pid, address, active, normal_exit, error_message, job,
               created_at, finished_at
        FROM workers
        WHERE NOT active AND NOT normal_exit
        ORDER BY id
    "#};
    sqlx::query_as(query).fetch_all(exe).await
}
