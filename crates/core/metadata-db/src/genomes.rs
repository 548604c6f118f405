//! Genome records and the claim protocol
//!
//! A genome is the unit of work. Its nullable `owner_worker_id` is the exclusive claim:
//! while set, no other worker will select the genome. Claims are taken with
//! [`claim_next`] and given back with [`release`]; a worker that dies while holding a
//! claim leaves the genome owned until an operator runs
//! [`reclaim_abandoned`](crate::maintenance::reclaim_abandoned).

mod genome_id;
pub(crate) mod sql;

pub use self::genome_id::{GenomeId, GenomeIdFromStrError, GenomeIdI64ConvError};
use crate::{MetadataDb, Timestamp, db::Executor, error::Error, workers::WorkerId};

/// Register a genome by name
///
/// This operation is idempotent: registering an existing name returns its ID.
#[tracing::instrument(skip(exe), err)]
pub async fn register<'c, E>(exe: E, name: &str) -> Result<GenomeId, Error>
where
    E: Executor<'c>,
{
    sql::upsert(exe, name).await.map_err(Error::Database)
}

/// Get a genome by ID
#[tracing::instrument(skip(exe), err)]
pub async fn get_by_id<'c, E>(exe: E, id: GenomeId) -> Result<Option<Genome>, Error>
where
    E: Executor<'c>,
{
    sql::get_by_id(exe, id).await.map_err(Error::Database)
}

/// List the genomes currently owned by a worker
#[tracing::instrument(skip(exe), err)]
pub async fn list_owned_by<'c, E>(exe: E, owner: WorkerId) -> Result<Vec<Genome>, Error>
where
    E: Executor<'c>,
{
    sql::list_owned_by(exe, owner)
        .await
        .map_err(Error::Database)
}

/// Selects which genomes a worker may claim
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    /// Progress module names (submodules unnested, e.g. `Annotate:pfam`) that must all be
    /// `DONE` and not flagged for redo for a genome to count as finished
    pub expected_modules: Vec<String>,
    /// Genomes that are candidates regardless of their progress
    pub genome_ids: Vec<GenomeId>,
    /// Skip genomes carrying a progress row written by this worker
    ///
    /// Set when finished genomes stay candidates (`redo` or explicit `genome_ids`), so a
    /// worker visits each genome at most once per run.
    pub skip_visited_by: Option<WorkerId>,
    /// Treat every unowned genome as a candidate, ignoring progress
    pub redo: bool,
}

/// Atomically claim the lowest-ID unowned genome matching `filter` for `owner`
///
/// In a single `READ COMMITTED` transaction:
///
///  1. Select the lowest-ID candidate and lock its row (`FOR UPDATE`)
///  2. Set its owner to `owner`
///
/// Returns `None` when no candidate exists ("no work available"); the transaction then
/// commits without changes. Concurrent callers never receive the same genome.
#[tracing::instrument(skip(db, filter), fields(modules = ?filter.expected_modules), err)]
pub async fn claim_next(
    db: &MetadataDb,
    owner: WorkerId,
    filter: &ClaimFilter,
) -> Result<Option<GenomeId>, Error> {
    let mut tx = db.begin_txn().await?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
        .execute(&mut tx)
        .await
        .map_err(Error::Database)?;

    let candidate = sql::select_candidate_for_update(
        &mut tx,
        &filter.expected_modules,
        &filter.genome_ids,
        filter.skip_visited_by,
        filter.redo,
    )
    .await
    .map_err(Error::Database)?;

    let Some(genome_id) = candidate else {
        tx.commit().await?;
        return Ok(None);
    };

    sql::set_owner(&mut tx, genome_id, owner)
        .await
        .map_err(Error::Database)?;

    tx.commit().await?;

    tracing::debug!(%genome_id, %owner, "genome claimed");
    Ok(Some(genome_id))
}

/// Give a claimed genome back, clearing its owner
///
/// Runs in its own transaction. Returns `false` if the genome was not owned by `owner`.
#[tracing::instrument(skip(db), err)]
pub async fn release(db: &MetadataDb, genome_id: GenomeId, owner: WorkerId) -> Result<bool, Error> {
    let mut tx = db.begin_txn().await?;
    let released = sql::clear_owner(&mut tx, genome_id, owner)
        .await
        .map_err(Error::Database)?;
    tx.commit().await?;
    Ok(released)
}

/// Represents a genome in the metadata database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Genome {
    /// Store-assigned ID
    pub id: GenomeId,
    /// Unique name
    pub name: String,
    /// Worker currently (or, after a crash, formerly) processing the genome
    pub owner_worker_id: Option<WorkerId>,
    /// Timestamp when the genome was registered
    pub created_at: Timestamp,
}
