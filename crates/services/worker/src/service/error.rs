//! Error types of the worker service.
//!
//! Errors are split by phase, like the service itself: [`InitError`] for everything that
//! happens before the worker row exists, and [`RuntimeError`] for the module runs that
//! follow. Every runtime error is recorded on the worker row before it is returned.

use metadata_db::GenomeId;
use pipeline::{ConfigurationError, InterruptError, ModuleTarget, RunError, UnknownModule};

use crate::job::JobError;

/// Errors that can occur during worker initialization (Phase 1).
///
/// Initialization resolves the requested job against the module registry, builds the
/// module dependency graph and registers the worker in the metadata database. No genome
/// is touched before all of these succeed.
///
/// All initialization errors are fatal and prevent the worker from starting.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The requested job is empty or names modules the registry cannot run as asked.
    ///
    /// This is a usage error: nothing was written to the metadata database.
    #[error("invalid job")]
    InvalidJob(#[source] JobError),

    /// The module declarations do not form a dependency DAG.
    ///
    /// Common causes include:
    /// - A module listing itself as a dependency
    /// - A dependency on a module that is not registered
    /// - A dependency cycle between configured command modules
    #[error("invalid module configuration")]
    Configuration(#[source] ConfigurationError),

    /// The job could not be encoded for the worker row.
    #[error("failed to encode the job")]
    EncodeJob(#[source] serde_json::Error),

    /// Worker registration failed.
    ///
    /// This occurs when the worker attempts to insert its row in the metadata database.
    /// Connection errors are retried before this error is returned.
    #[error("database error during registration")]
    Registration(#[source] metadata_db::Error),
}

/// Errors that can occur while the worker runs modules (Phase 2).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Shutdown was requested between two units of work.
    ///
    /// The genome being processed, if any, was released before the check.
    #[error(transparent)]
    Interrupted(InterruptError),

    /// A module attempt failed or was interrupted.
    ///
    /// The attempt's progress rows are marked `ERROR`. The genome stays owned by this
    /// worker so that maintenance can find it through the worker row.
    #[error("module run failed")]
    ModuleRun(#[source] RunError),

    /// Dependency checking is enabled and a module's dependencies are not done.
    ///
    /// The module was not started. A genome being processed was released.
    #[error("module {module} on {target} has unfinished dependencies: {}", .missing.join(", "))]
    MissingDependencies {
        module: String,
        target: ModuleTarget,
        missing: Vec<String>,
    },

    /// Claiming a genome failed.
    #[error("failed to claim a genome")]
    Claim(#[source] metadata_db::Error),

    /// Releasing a processed genome failed.
    #[error("failed to release genome {genome_id}")]
    Release {
        genome_id: GenomeId,
        #[source]
        source: metadata_db::Error,
    },

    /// The dependency graph and the registry disagree about a module.
    #[error("module missing from the dependency graph")]
    UnknownModule(#[source] UnknownModule),

    /// Loading progress rows for the dependency check failed.
    #[error("failed to load module progress")]
    LoadProgress(#[source] metadata_db::Error),

    /// Persisting the final worker state failed.
    ///
    /// Only returned when the run itself succeeded; otherwise the run error is returned
    /// and this failure is logged.
    #[error("failed to record the final worker state")]
    Finalize(#[source] metadata_db::Error),
}

impl RuntimeError {
    /// Whether the run stopped because of a shutdown request
    pub fn is_interrupt(&self) -> bool {
        match self {
            Self::Interrupted(_) => true,
            Self::ModuleRun(err) => err.is_interrupt(),
            _ => false,
        }
    }

    /// Whether the module was not started because another live worker is running it
    pub fn is_attempt_in_progress(&self) -> bool {
        matches!(
            self,
            Self::ModuleRun(RunError::Store {
                source: metadata_db::Error::AttemptInProgress { .. },
                ..
            })
        )
    }
}
