use metadata_db::{MetadataDb, maintenance};

/// Releases the genomes of abnormally exited workers and prints what was reclaimed
pub async fn run(metadata_db: &MetadataDb) -> Result<(), Error> {
    let summary = maintenance::reclaim_abandoned(metadata_db)
        .await
        .map_err(Error)?;

    tracing::info!(
        failed_workers = summary.failed_workers.len(),
        released_genomes = summary.released_genomes.len(),
        deleted_progress_rows = summary.deleted_progress_rows,
        "reclaim finished"
    );
    println!(
        "failed workers: {}\nreleased genomes: {}\ndeleted error rows: {}",
        summary.failed_workers.len(),
        summary.released_genomes.len(),
        summary.deleted_progress_rows
    );
    Ok(())
}

/// Failed to reclaim abandoned genomes.
#[derive(Debug, thiserror::Error)]
#[error("Failed to reclaim abandoned genomes")]
pub struct Error(#[source] metadata_db::Error);
