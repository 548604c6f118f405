//! Explicit module registry: name to manifest, scope and constructor.
//!
//! Every module a worker can run is registered here before the worker starts, either in
//! code or from the `[[modules]]` section of the configuration file.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    dep_graph::ModuleDepGraph,
    error::{ConfigurationError, UnknownModule},
    manifest::{ModuleManifest, UnknownSubmodule},
    module::{ModuleContext, PipelineModule},
    module_id::ModuleId,
};

/// Where a module runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleScope {
    /// Once per worker run, on the pipeline-global target
    Once,
    /// On every claimed genome
    PerGenome,
}

impl ModuleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::PerGenome => "per_genome",
        }
    }
}

impl std::fmt::Display for ModuleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constructor of module instances
pub type ModuleFactory = Arc<dyn Fn(ModuleContext) -> Box<dyn PipelineModule> + Send + Sync>;

/// A module known to the registry
#[derive(Clone)]
pub struct RegisteredModule {
    pub manifest: ModuleManifest,
    pub scope: ModuleScope,
    factory: ModuleFactory,
}

impl RegisteredModule {
    /// Creates a fresh instance for one attempt
    pub fn instantiate(&self, ctx: ModuleContext) -> Box<dyn PipelineModule> {
        (self.factory)(ctx)
    }
}

impl std::fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("manifest", &self.manifest)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// All modules a worker can run, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its manifest name
    pub fn register(
        &mut self,
        manifest: ModuleManifest,
        scope: ModuleScope,
        factory: ModuleFactory,
    ) -> Result<(), ConfigurationError> {
        if self.modules.contains_key(&manifest.name) {
            return Err(ConfigurationError::DuplicateModule(manifest.name));
        }
        self.modules.insert(
            manifest.name.clone(),
            RegisteredModule {
                manifest,
                scope,
                factory,
            },
        );
        Ok(())
    }

    /// Registers a module whose constructor is a plain function or closure
    pub fn register_fn<F, M>(
        &mut self,
        manifest: ModuleManifest,
        scope: ModuleScope,
        constructor: F,
    ) -> Result<(), ConfigurationError>
    where
        F: Fn(ModuleContext) -> M + Send + Sync + 'static,
        M: PipelineModule + 'static,
    {
        let factory: ModuleFactory = Arc::new(move |ctx| Box::new(constructor(ctx)));
        self.register(manifest, scope, factory)
    }

    pub fn get(&self, name: &str) -> Result<&RegisteredModule, UnknownModule> {
        self.modules
            .get(name)
            .ok_or_else(|| UnknownModule(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Registered modules in name order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModule> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Dependency graph over every registered module
    pub fn dep_graph(&self) -> Result<ModuleDepGraph, ConfigurationError> {
        ModuleDepGraph::from_manifests(self.modules.values().map(|m| &m.manifest))
    }

    /// Progress row names of a requested module, checking that it exists, runs in `scope`
    /// and declares every requested submodule
    pub fn resolve(&self, id: &ModuleId, scope: ModuleScope) -> Result<Vec<String>, ResolveError> {
        let module = self
            .get(id.name())
            .map_err(|UnknownModule(name)| ResolveError::Unknown(name))?;
        if module.scope != scope {
            return Err(ResolveError::WrongScope {
                module: id.name().to_string(),
                expected: scope,
                actual: module.scope,
            });
        }
        Ok(module.manifest.progress_names(id)?)
    }
}

/// A requested module cannot run as asked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown module {0}")]
    Unknown(String),

    #[error("module {module} runs {actual}, not {expected}")]
    WrongScope {
        module: String,
        expected: ModuleScope,
        actual: ModuleScope,
    },

    #[error(transparent)]
    UnknownSubmodule(#[from] UnknownSubmodule),
}
