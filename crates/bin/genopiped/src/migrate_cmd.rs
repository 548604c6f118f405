use genopipe_config::MetadataDbConfig;
use metadata_db::MetadataDb;

pub async fn run(metadata_db_config: &MetadataDbConfig) -> Result<(), Error> {
    tracing::info!("Running migrations on metadata database...");
    let metadata_db = MetadataDb::connect_with_config(
        &metadata_db_config.url,
        metadata_db_config.pool_config(),
        false,
    )
    .await
    .map_err(Error)?;
    metadata_db.run_migrations().await.map_err(Error)?;
    tracing::info!("Migrations completed successfully");

    Ok(())
}

/// Failed to run database migrations on the metadata database.
#[derive(Debug, thiserror::Error)]
#[error("Failed to run migrations")]
pub struct Error(#[source] metadata_db::Error);
