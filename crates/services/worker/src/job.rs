//! The work a worker process was started for.
//!
//! A [`WorkerJob`] is what the operator asked for on the command line. It is stored as
//! JSON on the worker row at registration, and resolved against the module registry into
//! a [`JobPlan`] before anything else happens.

use metadata_db::GenomeId;
use pipeline::{ModuleId, ModuleRegistry, ModuleScope, ResolveError};

/// Modules and genome selection requested for one worker run
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorkerJob {
    /// Modules run once on the pipeline-global target, in this order
    #[serde(default)]
    pub once: Vec<ModuleId>,

    /// Modules run on every claimed genome, in this order
    #[serde(default)]
    pub per_genome: Vec<ModuleId>,

    /// Genomes to process even if their modules are already done
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genomes: Vec<GenomeId>,

    /// Undo and rerun modules that are already done
    #[serde(default)]
    pub redo: bool,

    /// Refuse to run a module whose dependencies are not done
    #[serde(default)]
    pub check_deps: bool,
}

impl WorkerJob {
    pub fn is_empty(&self) -> bool {
        self.once.is_empty() && self.per_genome.is_empty()
    }

    /// Resolves the requested modules against `registry`
    ///
    /// Identifiers naming the same module are merged (see [`ModuleId::nest`]) keeping the
    /// order of first appearance.
    pub fn plan(&self, registry: &ModuleRegistry) -> Result<JobPlan, JobError> {
        if self.is_empty() {
            return Err(JobError::NoModules);
        }

        let resolve = |ids: &[ModuleId], scope: ModuleScope| {
            ModuleId::nest(ids.iter().cloned())
                .into_iter()
                .map(|module_id| -> Result<PlannedModule, JobError> {
                    let progress_names = registry.resolve(&module_id, scope)?;
                    Ok(PlannedModule {
                        module_id,
                        progress_names,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(JobPlan {
            once: resolve(&self.once, ModuleScope::Once)?,
            per_genome: resolve(&self.per_genome, ModuleScope::PerGenome)?,
        })
    }
}

/// A requested module with the progress rows an attempt of it records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedModule {
    pub module_id: ModuleId,
    pub progress_names: Vec<String>,
}

/// The resolved modules of a [`WorkerJob`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub once: Vec<PlannedModule>,
    pub per_genome: Vec<PlannedModule>,
}

impl JobPlan {
    /// Every progress name of the per-genome modules: a genome is finished once all of
    /// them are done
    pub fn per_genome_progress_names(&self) -> Vec<String> {
        self.per_genome
            .iter()
            .flat_map(|module| module.progress_names.iter().cloned())
            .collect()
    }
}

/// A job that cannot run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// Neither once nor per-genome modules were requested
    #[error("no module requested")]
    NoModules,

    /// A requested module is unknown, runs in the other scope, or names an unknown
    /// submodule
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
