use metadata_db::{MetadataDb, genomes};

/// Registers every name and prints `id<TAB>name`, in argument order
pub async fn add(metadata_db: &MetadataDb, names: &[String]) -> Result<(), Error> {
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        let id = genomes::register(metadata_db, name)
            .await
            .map_err(|source| Error::Register {
                name: name.to_string(),
                source,
            })?;
        tracing::debug!(genome_id = %id, name, "genome registered");
        println!("{id}\t{name}");
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A genome name was blank.
    #[error("genome names must not be empty")]
    EmptyName,

    /// Failed to insert the genome.
    #[error("Failed to register genome {name}")]
    Register {
        name: String,
        #[source]
        source: metadata_db::Error,
    },
}
