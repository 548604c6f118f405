//! The contract every pipeline module implements.

use async_trait::async_trait;
use metadata_db::{GenomeId, MetadataDb, progress};

use crate::{
    driver::LifecycleStep,
    error::{BoxError, NotImplemented},
    module_id::ModuleId,
};

/// What a module instance works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleTarget {
    /// The pipeline as a whole, for modules that run once
    Global,
    /// A single claimed genome
    Genome(GenomeId),
}

impl ModuleTarget {
    /// The genome, or `None` for the global target
    pub fn genome_id(&self) -> Option<GenomeId> {
        match self {
            Self::Global => None,
            Self::Genome(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for ModuleTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Genome(id) => write!(f, "genome {id}"),
        }
    }
}

/// Everything a module instance is constructed with
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// The target of this instance
    pub target: ModuleTarget,
    /// The module as requested, possibly restricted to some submodules
    pub module_id: ModuleId,
    /// Progress row names recorded for this attempt
    pub progress_names: Vec<String>,
    /// Shared store, for modules that keep their own results in it
    pub db: MetadataDb,
}

impl ModuleContext {
    /// Names of the modules already completed on this instance's target
    pub async fn completed_modules(&self) -> Result<Vec<String>, metadata_db::Error> {
        progress::list_completed_modules(&self.db, self.target.genome_id()).await
    }

    /// The submodules this attempt covers, derived from its progress names
    pub fn submodules(&self) -> Vec<&str> {
        self.progress_names
            .iter()
            .filter_map(|name| name.split_once(':').map(|(_, sub)| sub))
            .collect()
    }
}

/// Lifecycle of one module instance over one target
///
/// The driver calls `setup`, then `undo` when a redo was requested, then `run`,
/// `optimize` and `teardown`, stopping at the first error. Only `run` must be provided
/// by every useful module; `undo` is required for modules that support redo.
#[async_trait]
pub trait PipelineModule: Send {
    /// Prepare resources needed by the following steps
    async fn setup(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Remove the output of a previous run of this module on the same target
    async fn undo(&mut self) -> Result<(), BoxError> {
        Err(NotImplemented(LifecycleStep::Undo).into())
    }

    /// Do the module's work
    async fn run(&mut self) -> Result<(), BoxError> {
        Err(NotImplemented(LifecycleStep::Run).into())
    }

    /// Post-process the output, e.g. compact or index it
    async fn optimize(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Release resources acquired in `setup`
    async fn teardown(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}
