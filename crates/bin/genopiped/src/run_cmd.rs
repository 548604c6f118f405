use std::sync::Arc;

use genopipe_config::Config;
use metadata_db::MetadataDb;
use pipeline::{ModuleRegistry, Shutdown};
use worker::{
    job::WorkerJob,
    service::{self, InitError, RuntimeError},
};

pub async fn run(
    config: &Config,
    metadata_db: MetadataDb,
    registry: ModuleRegistry,
    job: WorkerJob,
) -> Result<(), Error> {
    let shutdown = Shutdown::new();
    let signal_handler = shutdown
        .install_signal_handler()
        .map_err(Error::SignalHandler)?;

    let worker_fut = service::new(
        worker::config::Config::from(&config.worker),
        metadata_db,
        Arc::new(registry),
        job,
        shutdown,
    )
    .await
    .map_err(Error::Init)?;

    let result = worker_fut.await;
    signal_handler.abort();

    let summary = result.map_err(Error::Runtime)?;
    tracing::info!(
        worker_id = %summary.worker_id,
        modules_run = summary.modules_run,
        genomes = summary.genomes_processed.len(),
        "no work left"
    );
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to install the SIGINT/SIGTERM handler.
    #[error("Failed to install the signal handler")]
    SignalHandler(#[source] std::io::Error),

    /// Worker initialization failed; no genome was touched.
    #[error("Worker initialization failed")]
    Init(#[source] InitError),

    /// The worker stopped with an error; the final state is recorded on its row.
    #[error("Worker stopped")]
    Runtime(#[source] RuntimeError),
}
