//! Pipeline core: module identifiers and manifests, the module dependency graph, the
//! module lifecycle driver and cooperative shutdown.
//!
//! A worker combines these with the shared store in `metadata-db`:
//!
//! 1. Build a [`ModuleRegistry`] and its [`ModuleDepGraph`] (fails on malformed
//!    dependency declarations before any genome is touched)
//! 2. For each target, instantiate the module and call [`run_module`]
//! 3. Check [`Shutdown`] between units of work

pub mod command;
pub mod dep_graph;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod module;
pub mod module_id;
pub mod registry;
pub mod shutdown;

pub use self::{
    command::{CommandError, CommandModule, CommandSpec},
    dep_graph::{ModuleDepGraph, ModuleDepNode},
    driver::{LifecycleStep, ModuleRun, run_module},
    error::{BoxError, ConfigurationError, InterruptError, NotImplemented, RunError, UnknownModule},
    manifest::{ModuleManifest, UnknownSubmodule},
    module::{ModuleContext, ModuleTarget, PipelineModule},
    module_id::{ModuleId, ModuleIdError},
    registry::{ModuleFactory, ModuleRegistry, ModuleScope, RegisteredModule, ResolveError},
    shutdown::Shutdown,
};
