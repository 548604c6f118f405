use metadata_db::{GenomeId, MetadataDb, progress};
use pipeline::{ModuleId, ModuleRegistry, ModuleScope, ResolveError};

/// Flags the done progress rows of `modules` for redo
///
/// Every id is resolved against the registry first, so a typo never reaches the database.
/// Pipeline-global rows are flagged only when one of the modules runs once per pipeline.
pub async fn run(
    metadata_db: &MetadataDb,
    registry: &ModuleRegistry,
    modules: &[ModuleId],
    genomes: &[GenomeId],
) -> Result<(), Error> {
    let mut names = Vec::new();
    let mut global = false;
    for id in ModuleId::nest(modules.iter().cloned()) {
        let scope = registry
            .get(id.name())
            .map_err(|err| Error::Resolve(ResolveError::Unknown(err.0)))?
            .scope;
        global |= scope == ModuleScope::Once;
        names.extend(registry.resolve(&id, scope).map_err(Error::Resolve)?);
    }

    let flagged = progress::mark_redo(metadata_db, &names, genomes, global)
        .await
        .map_err(Error::MarkRedo)?;

    tracing::info!(modules = ?names, genomes = genomes.len(), flagged, "progress flagged for redo");
    println!("flagged {flagged} progress rows for redo");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested module or submodule is not configured.
    #[error("Invalid module")]
    Resolve(#[source] ResolveError),

    /// Failed to update the progress rows.
    #[error("Failed to flag progress for redo")]
    MarkRedo(#[source] metadata_db::Error),
}
