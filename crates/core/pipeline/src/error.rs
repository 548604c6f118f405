//! Error types of the pipeline core

use metadata_db::GenomeId;

use crate::{driver::LifecycleStep, module_id::ModuleId};

/// Error type returned by module lifecycle steps
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Malformed module declarations
///
/// Raised while building the dependency graph or the module registry, before any genome
/// is touched. No partial graph is ever returned alongside this error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// Two modules share a name
    #[error("module {0} is declared more than once")]
    DuplicateModule(String),

    /// A module lists itself as a dependency
    #[error("module {0} depends on itself")]
    SelfDependency(String),

    /// A module depends on a name no module declares
    #[error("module {module} depends on unknown module {dependency}")]
    MissingDependency { module: String, dependency: String },

    /// The dependencies of the listed modules form a cycle
    ///
    /// The path starts and ends with the same module.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
}

/// A name that does not match any module of the dependency graph or registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module {0}")]
pub struct UnknownModule(pub String);

/// Cooperative shutdown was requested
///
/// Raised by [`Shutdown::check`](crate::shutdown::Shutdown::check) at the next safe point
/// after the first termination signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, thiserror::Error)]
#[error("interrupted by shutdown request")]
pub struct InterruptError;

/// A lifecycle step has no implementation for this module
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not implemented")]
pub struct NotImplemented(pub LifecycleStep);

/// Errors raised while driving a module attempt
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A lifecycle step of the module failed
    ///
    /// The attempt's progress rows are marked `ERROR` with this message before the error
    /// is returned.
    #[error("module {module} failed in {step}{}", genome_suffix(.genome_id))]
    Module {
        module: ModuleId,
        genome_id: Option<GenomeId>,
        step: LifecycleStep,
        #[source]
        source: BoxError,
    },

    /// Shutdown was requested before a lifecycle step
    #[error("module {module} interrupted before {step}{}", genome_suffix(.genome_id))]
    Interrupted {
        module: ModuleId,
        genome_id: Option<GenomeId>,
        step: LifecycleStep,
    },

    /// Shutdown was requested before the attempt started; no progress rows exist
    #[error(transparent)]
    NotStarted(InterruptError),

    /// Reading or writing progress rows failed
    #[error("progress store error for module {module}")]
    Store {
        module: ModuleId,
        #[source]
        source: metadata_db::Error,
    },
}

impl RunError {
    /// Whether this error stems from a shutdown request rather than a failure
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted { .. } | Self::NotStarted(_))
    }
}

fn genome_suffix(genome_id: &Option<GenomeId>) -> String {
    match genome_id {
        Some(id) => format!(" on genome {id}"),
        None => String::new(),
    }
}
