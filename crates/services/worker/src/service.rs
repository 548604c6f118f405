use std::{future::Future, sync::Arc, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use metadata_db::{
    ClaimFilter, Error as MetadataDbError, GenomeId, MetadataDb, ModuleProgress, WorkerId,
    WorkerRegistration, genomes, progress, workers,
};
use monitoring::logging;
use pipeline::{
    ModuleContext, ModuleDepGraph, ModuleRegistry, ModuleRun, ModuleTarget, Shutdown, run_module,
};
use tracing::instrument;

mod error;

pub use self::error::{InitError, RuntimeError};
use crate::{
    config::Config,
    info::WorkerInfo,
    job::{JobPlan, PlannedModule, WorkerJob},
};

/// Outcome of a worker run that finished normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub worker_id: WorkerId,
    /// Module attempts that completed
    pub modules_run: usize,
    /// Genomes claimed, processed and released, in claim order
    pub genomes_processed: Vec<GenomeId>,
}

/// Run the worker service
///
/// This function creates a worker for `job` using a two-phase initialization pattern:
///
/// - **Phase 1 (Initialization)**: Job resolution against the registry, dependency graph
///   construction and worker registration. Errors in this phase are returned as
///   [`InitError`] and leave no trace in the metadata DB besides, at most, the worker row.
/// - **Phase 2 (Runtime)**: The once-per-run modules on the global target, then the
///   claim / run / release loop over genomes until no work is left or shutdown is
///   requested. The final worker state is persisted before the future resolves.
pub async fn new(
    config: Config,
    metadata_db: MetadataDb,
    registry: Arc<ModuleRegistry>,
    job: WorkerJob,
    shutdown: Shutdown,
) -> Result<impl Future<Output = Result<RunSummary, RuntimeError>>, InitError> {
    // Validate the request before registering, so usage errors leave no worker row behind
    let plan = job.plan(&registry).map_err(InitError::InvalidJob)?;
    let graph = registry.dep_graph().map_err(InitError::Configuration)?;
    let job_json = serde_json::to_value(&job).map_err(InitError::EncodeJob)?;

    let poll_interval = config.attempt_poll_interval;
    let info = WorkerInfo::current(config.address);
    let worker_id = register_worker_with_retry(&metadata_db, &info, &job_json)
        .await
        .map_err(InitError::Registration)?;

    tracing::info!(
        %worker_id,
        host = %info.host,
        pid = info.pid,
        once = plan.once.len(),
        per_genome = plan.per_genome.len(),
        "worker registered"
    );

    let mut worker = Worker {
        id: worker_id,
        db: metadata_db,
        registry,
        graph,
        job,
        plan,
        shutdown,
        poll_interval,
        summary: RunSummary {
            worker_id,
            modules_run: 0,
            genomes_processed: Vec::new(),
        },
    };

    let fut = async move {
        let result = worker.run().await;
        worker.finalize(result).await
    };

    Ok(fut)
}

struct Worker {
    id: WorkerId,
    db: MetadataDb,
    registry: Arc<ModuleRegistry>,
    graph: ModuleDepGraph,
    job: WorkerJob,
    plan: JobPlan,
    shutdown: Shutdown,
    poll_interval: Duration,
    summary: RunSummary,
}

impl Worker {
    async fn run(&mut self) -> Result<(), RuntimeError> {
        let once = self.plan.once.clone();
        for module in &once {
            self.run_once(module).await?;
        }

        if self.plan.per_genome.is_empty() {
            return Ok(());
        }

        let filter = ClaimFilter {
            expected_modules: self.plan.per_genome_progress_names(),
            genome_ids: self.job.genomes.clone(),
            // Only needed when finished genomes stay candidates
            skip_visited_by: (self.job.redo || !self.job.genomes.is_empty()).then_some(self.id),
            redo: self.job.redo,
        };

        loop {
            self.shutdown.check().map_err(RuntimeError::Interrupted)?;

            let claimed = genomes::claim_next(&self.db, self.id, &filter)
                .await
                .map_err(RuntimeError::Claim)?;
            let Some(genome_id) = claimed else {
                tracing::info!(worker_id = %self.id, "no work available");
                return Ok(());
            };

            tracing::info!(worker_id = %self.id, %genome_id, "processing genome");
            self.process_genome(genome_id).await?;

            self.release(genome_id).await?;
            self.summary.genomes_processed.push(genome_id);
        }
    }

    /// Runs a once module on the global target unless it is already done
    ///
    /// Concurrent workers share the global target: while another live worker is running the
    /// module, this one waits and then checks again, so the module runs at most once.
    async fn run_once(&mut self, module: &PlannedModule) -> Result<(), RuntimeError> {
        loop {
            self.shutdown.check().map_err(RuntimeError::Interrupted)?;
            match self.run_planned(module, ModuleTarget::Global, false).await {
                Err(err) if err.is_attempt_in_progress() => {
                    tracing::info!(
                        worker_id = %self.id,
                        module = %module.module_id,
                        error = %err,
                        error_source = logging::error_source(&err),
                        "module is running in another worker, waiting {:.1}s",
                        self.poll_interval.as_secs_f32()
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                result => return result,
            }
        }
    }

    /// Runs the per-genome modules in order, stopping at the first error
    ///
    /// Explicitly requested genomes run every module; other genomes skip the modules that
    /// are already done.
    async fn process_genome(&mut self, genome_id: GenomeId) -> Result<(), RuntimeError> {
        let rerun_done = self.job.genomes.contains(&genome_id);
        let per_genome = self.plan.per_genome.clone();
        for module in &per_genome {
            let result = self
                .run_planned(module, ModuleTarget::Genome(genome_id), rerun_done)
                .await;
            match result {
                Err(err @ RuntimeError::MissingDependencies { .. }) => {
                    // The module never started, so the genome is not abandoned
                    if let Err(release_err) = self.release(genome_id).await {
                        tracing::error!(
                            worker_id = %self.id,
                            %genome_id,
                            error = %release_err,
                            error_source = logging::error_source(&release_err),
                            "failed to release genome"
                        );
                    }
                    return Err(err);
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Runs one module attempt on `target` after checking its dependencies
    #[instrument(skip_all, fields(worker_id = %self.id, module = %module.module_id, %target))]
    async fn run_planned(
        &mut self,
        module: &PlannedModule,
        target: ModuleTarget,
        rerun_done: bool,
    ) -> Result<(), RuntimeError> {
        let rows = progress::list_visible(&self.db, target.genome_id())
            .await
            .map_err(RuntimeError::LoadProgress)?;

        if !self.job.redo && !rerun_done && is_done(&rows, target, &module.progress_names) {
            tracing::debug!("module already done, skipping");
            return Ok(());
        }

        self.load_graph_state(&rows);
        let missing = self
            .graph
            .missing_dependencies(&[module.module_id.name()])
            .map_err(RuntimeError::UnknownModule)?;
        if !missing.is_empty() {
            if self.job.check_deps {
                return Err(RuntimeError::MissingDependencies {
                    module: module.module_id.to_string(),
                    target,
                    missing,
                });
            }
            tracing::warn!(?missing, "running module with unfinished dependencies");
        }

        let registered = self
            .registry
            .get(module.module_id.name())
            .map_err(RuntimeError::UnknownModule)?;
        let mut instance = registered.instantiate(ModuleContext {
            target,
            module_id: module.module_id.clone(),
            progress_names: module.progress_names.clone(),
            db: self.db.clone(),
        });

        run_module(
            ModuleRun {
                db: &self.db,
                owner: self.id,
                target,
                module_id: &module.module_id,
                progress_names: &module.progress_names,
                redo: self.job.redo,
                shutdown: &self.shutdown,
            },
            instance.as_mut(),
        )
        .await
        .map_err(RuntimeError::ModuleRun)?;

        self.summary.modules_run += 1;
        Ok(())
    }

    /// Replaces the graph state with the rows of modules the registry knows
    fn load_graph_state(&mut self, rows: &[ModuleProgress]) {
        let known: Vec<&ModuleProgress> = rows
            .iter()
            .filter(|row| self.graph.contains(primary_name(&row.module)))
            .collect();
        if let Err(err) = self.graph.load_state(known) {
            tracing::warn!(error = %err, "ignoring progress state");
        }
    }

    async fn release(&self, genome_id: GenomeId) -> Result<(), RuntimeError> {
        let released = genomes::release(&self.db, genome_id, self.id)
            .await
            .map_err(|source| RuntimeError::Release { genome_id, source })?;
        if !released {
            tracing::warn!(worker_id = %self.id, %genome_id, "genome was not owned at release");
        }
        Ok(())
    }

    /// Persists the final worker state and returns the run outcome
    async fn finalize(self, result: Result<(), RuntimeError>) -> Result<RunSummary, RuntimeError> {
        let (normal_exit, message) = match &result {
            Ok(()) => {
                tracing::info!(
                    worker_id = %self.id,
                    modules_run = self.summary.modules_run,
                    genomes = self.summary.genomes_processed.len(),
                    "worker finished"
                );
                (true, None)
            }
            Err(err) if err.is_interrupt() => {
                let message = match err {
                    RuntimeError::ModuleRun(inner) => inner.to_string(),
                    other => other.to_string(),
                };
                tracing::warn!(worker_id = %self.id, reason = %message, "worker interrupted");
                (false, Some(message))
            }
            Err(err) => {
                tracing::error!(
                    worker_id = %self.id,
                    error = %err,
                    error_source = logging::error_source(err),
                    "worker failed"
                );
                (false, Some(logging::error_chain(err)))
            }
        };

        let finished =
            finish_worker_with_retry(&self.db, self.id, normal_exit, message.as_deref()).await;
        match (result, finished) {
            (Ok(()), Ok(_)) => Ok(self.summary),
            (Ok(()), Err(err)) => Err(RuntimeError::Finalize(err)),
            (Err(run_err), Ok(_)) => Err(run_err),
            (Err(run_err), Err(err)) => {
                tracing::error!(
                    worker_id = %self.id,
                    error = %err,
                    error_source = logging::error_source(&err),
                    "failed to record the final worker state"
                );
                Err(run_err)
            }
        }
    }
}

/// Whether every progress name has a done row on exactly `target`
fn is_done(rows: &[ModuleProgress], target: ModuleTarget, progress_names: &[String]) -> bool {
    progress_names.iter().all(|name| {
        rows.iter().any(|row| {
            row.genome_id == target.genome_id() && &row.module == name && row.is_done()
        })
    })
}

/// `Name` of a `Name:submodule` progress name
fn primary_name(module: &str) -> &str {
    module.split_once(':').map_or(module, |(name, _)| name)
}

/// Registers a worker in the metadata DB.
///
/// Retries on connection errors.
async fn register_worker_with_retry(
    metadata_db: &MetadataDb,
    info: &WorkerInfo,
    job: &serde_json::Value,
) -> Result<WorkerId, MetadataDbError> {
    let registration = WorkerRegistration {
        host: &info.host,
        pid: info.pid,
        address: info.address.as_deref(),
        job,
    };
    (|| workers::register(metadata_db, &registration))
        .retry(with_policy())
        .when(MetadataDbError::is_connection_error)
        .notify(|err, dur| {
            tracing::warn!(
                host = %info.host,
                error = %err, error_source = logging::error_source(&err),
                "Connection error while registering worker. Retrying in {:.1}s",
                dur.as_secs_f32()
            );
        })
        .await
}

/// Persists the final state of a worker.
///
/// Retries on connection errors.
async fn finish_worker_with_retry(
    metadata_db: &MetadataDb,
    worker_id: WorkerId,
    normal_exit: bool,
    error_message: Option<&str>,
) -> Result<bool, MetadataDbError> {
    (|| workers::finish(metadata_db, worker_id, normal_exit, error_message))
        .retry(with_policy())
        .when(MetadataDbError::is_connection_error)
        .notify(|err, dur| {
            tracing::warn!(
                %worker_id,
                error = %err, error_source = logging::error_source(&err),
                "Connection error while finalizing worker. Retrying in {:.1}s",
                dur.as_secs_f32()
            );
        })
        .await
}

/// A retry policy for the worker metadata DB operations.
///
/// The retry policy is an exponential backoff with:
/// - jitter: false
/// - factor: 2
/// - `min_delay`: 1s
/// - `max_delay`: 60s
/// - `max_times`: 3
#[inline]
fn with_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
}
