//! Module lifecycle driver.
//!
//! One call of [`run_module`] is one attempt of one module on one target:
//!
//! ```text
//! CREATE_PROGRESS -> SETUP -> [UNDO] -> RUN -> OPTIMIZE -> TEARDOWN -> DONE
//!                      \________\_________\______\___________\-----> ERROR
//! ```
//!
//! The progress rows of the attempt are written in short transactions between steps;
//! no transaction is held open while a step runs.

use metadata_db::{MetadataDb, ModuleProgress, ProgressState, WorkerId, progress};
use monitoring::logging;

use crate::{
    error::RunError,
    module::{ModuleTarget, PipelineModule},
    module_id::ModuleId,
    shutdown::Shutdown,
};

/// Steps of a module attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStep {
    CreateProgress,
    Setup,
    Undo,
    Run,
    Optimize,
    Teardown,
}

impl LifecycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProgress => "create_progress",
            Self::Setup => "setup",
            Self::Undo => "undo",
            Self::Run => "run",
            Self::Optimize => "optimize",
            Self::Teardown => "teardown",
        }
    }
}

impl std::fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one module attempt
#[derive(Debug, Clone, Copy)]
pub struct ModuleRun<'a> {
    pub db: &'a MetadataDb,
    /// Worker recorded as the owner of the progress rows
    pub owner: WorkerId,
    pub target: ModuleTarget,
    pub module_id: &'a ModuleId,
    /// Progress row names, see [`ModuleManifest::progress_names`](crate::manifest::ModuleManifest::progress_names)
    pub progress_names: &'a [String],
    /// Run `undo` before `run` even if no progress row asked for a redo
    pub redo: bool,
    pub shutdown: &'a Shutdown,
}

/// Drives one attempt of `module` through its lifecycle
///
/// 1. Replaces the target's rows for `progress_names` with fresh `ACTIVE` rows
/// 2. Runs the steps in order, checking for shutdown before each one
/// 3. On failure marks all rows `ERROR` with the error message and returns the error
/// 4. On success marks all rows `DONE` and returns them
///
/// `undo` runs when `redo` is set or when a replaced row was flagged for redo; the rows
/// are in state `UNDO` while it runs.
pub async fn run_module(
    run: ModuleRun<'_>,
    module: &mut dyn PipelineModule,
) -> Result<Vec<ModuleProgress>, RunError> {
    let genome_id = run.target.genome_id();
    let store_err = |source| RunError::Store {
        module: run.module_id.clone(),
        source,
    };

    run.shutdown.check().map_err(RunError::NotStarted)?;

    let attempt = progress::begin_attempt(run.db, run.owner, genome_id, run.progress_names)
        .await
        .map_err(store_err)?;
    let ids = attempt.ids();
    let undo = run.redo || attempt.redo_requested;

    tracing::info!(
        module = %run.module_id,
        target = %run.target,
        undo,
        "module attempt started"
    );

    match run_steps(&run, module, &ids, undo).await {
        Ok(()) => {
            let rows = progress::finish_attempt(run.db, &ids, ProgressState::Done, None)
                .await
                .map_err(store_err)?;
            tracing::info!(module = %run.module_id, target = %run.target, "module done");
            Ok(rows)
        }
        Err(err) => {
            let message = if err.is_interrupt() {
                err.to_string()
            } else {
                logging::error_chain(&err)
            };
            if let Err(mark_err) =
                progress::finish_attempt(run.db, &ids, ProgressState::Error, Some(&message)).await
            {
                tracing::error!(
                    module = %run.module_id,
                    target = %run.target,
                    error = %mark_err,
                    error_source = logging::error_source(&mark_err),
                    "failed to record module error"
                );
            }
            Err(err)
        }
    }
}

async fn run_steps(
    run: &ModuleRun<'_>,
    module: &mut dyn PipelineModule,
    ids: &[i64],
    undo: bool,
) -> Result<(), RunError> {
    let genome_id = run.target.genome_id();
    let steps = [
        Some(LifecycleStep::Setup),
        undo.then_some(LifecycleStep::Undo),
        Some(LifecycleStep::Run),
        Some(LifecycleStep::Optimize),
        Some(LifecycleStep::Teardown),
    ];

    for step in steps.into_iter().flatten() {
        if run.shutdown.check().is_err() {
            tracing::warn!(module = %run.module_id, target = %run.target, %step, "module interrupted");
            return Err(RunError::Interrupted {
                module: run.module_id.clone(),
                genome_id,
                step,
            });
        }

        tracing::debug!(module = %run.module_id, target = %run.target, %step, "module step");

        let result = match step {
            LifecycleStep::Setup => module.setup().await,
            LifecycleStep::Undo => {
                progress::set_state(run.db, ids, ProgressState::Active, ProgressState::Undo)
                    .await
                    .map_err(|source| RunError::Store {
                        module: run.module_id.clone(),
                        source,
                    })?;
                let result = module.undo().await;
                if result.is_ok() {
                    progress::set_state(run.db, ids, ProgressState::Undo, ProgressState::Active)
                        .await
                        .map_err(|source| RunError::Store {
                            module: run.module_id.clone(),
                            source,
                        })?;
                }
                result
            }
            LifecycleStep::Run => module.run().await,
            LifecycleStep::Optimize => module.optimize().await,
            LifecycleStep::Teardown => module.teardown().await,
            LifecycleStep::CreateProgress => Ok(()),
        };

        result.map_err(|source| RunError::Module {
            module: run.module_id.clone(),
            genome_id,
            step,
            source,
        })?;
    }

    Ok(())
}

/// In-tree integration tests
#[cfg(test)]
mod tests {
    mod it_driver;
}
