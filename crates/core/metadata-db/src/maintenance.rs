//! Operator-invoked maintenance of the shared state
//!
//! Nothing here runs automatically: a worker that crashes leaves its genome owned and its
//! progress rows in place until an operator decides to reclaim them.

use crate::{MetadataDb, error::Error, genomes, genomes::GenomeId, progress, workers, workers::WorkerId};

/// Give back the work abandoned by failed workers
///
/// In a single transaction:
///
///  1. Find every worker with `active = false, normal_exit = false`
///  2. Clear the owner of every genome those workers still hold
///  3. Delete every `ERROR` progress row
///
/// Workers that are still marked active are never touched, even if their process is gone:
/// a worker killed with `SIGKILL` must first be marked failed by hand.
#[tracing::instrument(skip(db), err)]
pub async fn reclaim_abandoned(db: &MetadataDb) -> Result<ReclaimSummary, Error> {
    let mut tx = db.begin_txn().await?;

    let failed: Vec<WorkerId> = workers::list_failed(&mut tx)
        .await?
        .into_iter()
        .map(|worker| worker.id)
        .collect();

    let released_genomes = if failed.is_empty() {
        Vec::new()
    } else {
        genomes::sql::clear_owners(&mut tx, &failed)
            .await
            .map_err(Error::Database)?
    };

    let deleted_progress_rows = progress::delete_errors(&mut tx).await?;

    tx.commit().await?;

    let summary = ReclaimSummary {
        failed_workers: failed,
        released_genomes,
        deleted_progress_rows,
    };
    tracing::info!(
        failed_workers = summary.failed_workers.len(),
        released_genomes = summary.released_genomes.len(),
        deleted_progress_rows = summary.deleted_progress_rows,
        "abandoned work reclaimed"
    );
    Ok(summary)
}

/// Outcome of [`reclaim_abandoned`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimSummary {
    /// Workers that stopped abnormally
    pub failed_workers: Vec<WorkerId>,
    /// Genomes whose owner was cleared
    pub released_genomes: Vec<GenomeId>,
    /// Number of `ERROR` progress rows deleted
    pub deleted_progress_rows: u64,
}

/// In-tree integration tests
#[cfg(test)]
mod tests {
    mod it_reclaim;
}
