//! Pipeline modules declared in the configuration file.
//!
//! Each `[[modules]]` table describes a module backed by an external program:
//!
//! ```toml
//! [[modules]]
//! name = "Annotate"
//! description = "Protein domain annotation"
//! dependencies = ["Genes"]
//! scope = "per_genome"
//! command = ["annotate", "--genome", "{genome_id}", "--db", "{submodule}"]
//! undo = ["annotate", "--purge", "--genome", "{genome_id}", "--db", "{submodule}"]
//!
//! [modules.submodules]
//! pfam = "Pfam domains"
//! tigrfam = "TIGRFAM families"
//! ```

use std::collections::BTreeMap;

/// Where a module runs: once for the whole pipeline, or once per claimed genome
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleScopeConfig {
    Once,
    PerGenome,
}

/// One `[[modules]]` entry
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CommandModuleConfig {
    /// Unique module name
    pub name: String,
    /// Human readable description (default: empty)
    #[serde(default)]
    pub description: String,
    /// Names of the modules that must be done before this one (default: none)
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Submodule name to description (default: none)
    #[serde(default)]
    pub submodules: BTreeMap<String, String>,
    /// Module scope
    pub scope: ModuleScopeConfig,
    /// Program and arguments run by the `run` step
    pub command: Vec<String>,
    /// Program and arguments run by the `undo` step (default: undo not supported)
    #[serde(default)]
    pub undo: Option<Vec<String>>,
}

impl CommandModuleConfig {
    /// Checks the entry for mistakes serde cannot catch.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("module name must not be empty".to_string());
        }
        if self.name.contains([':', '+', ',']) {
            return Err(format!(
                "module name {:?} must not contain ':', '+' or ','",
                self.name
            ));
        }
        if self.command.is_empty() {
            return Err(format!("module {} has an empty command", self.name));
        }
        if self.undo.as_ref().is_some_and(Vec::is_empty) {
            return Err(format!("module {} has an empty undo command", self.name));
        }
        Ok(())
    }
}
