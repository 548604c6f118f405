//! Static module capability descriptors.

use std::collections::BTreeMap;

use crate::module_id::ModuleId;

/// What a module is and what it needs, known before any instance is created
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModuleManifest {
    /// Unique module name
    pub name: String,
    /// Human readable description
    pub description: String,
    /// Names of the modules that must be done before this one runs
    pub dependencies: Vec<String>,
    /// Submodule name to description; empty when the module has no submodules
    pub submodules: BTreeMap<String, String>,
}

impl ModuleManifest {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            dependencies: Vec::new(),
            submodules: BTreeMap::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_submodule(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.submodules.insert(name.into(), description.into());
        self
    }

    /// Progress row names of an attempt of `requested` on this module
    ///
    /// - `Name:a+b` records one row per requested submodule (`Name:a`, `Name:b`)
    /// - `Name` on a module with submodules records one row per declared submodule
    /// - `Name` on a module without submodules records a single `Name` row
    pub fn progress_names(&self, requested: &ModuleId) -> Result<Vec<String>, UnknownSubmodule> {
        if requested.has_submodules() {
            return requested
                .unnest()
                .into_iter()
                .map(|id| {
                    let submodule = &id.submodules()[0];
                    if self.submodules.contains_key(submodule) {
                        Ok(id.to_string())
                    } else {
                        Err(UnknownSubmodule {
                            module: self.name.clone(),
                            submodule: submodule.clone(),
                        })
                    }
                })
                .collect();
        }

        if self.submodules.is_empty() {
            return Ok(vec![self.name.clone()]);
        }

        Ok(self
            .submodules
            .keys()
            .map(|submodule| format!("{}:{submodule}", self.name))
            .collect())
    }
}

/// A module identifier named a submodule its manifest does not declare
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("module {module} has no submodule {submodule}")]
pub struct UnknownSubmodule {
    pub module: String,
    pub submodule: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotate() -> ModuleManifest {
        ModuleManifest::new("Annotate", "Protein domain annotation")
            .with_dependencies(["Genes"])
            .with_submodule("pfam", "Pfam domains")
            .with_submodule("tigrfam", "TIGRFAM families")
    }

    #[test]
    fn progress_names_of_requested_submodules() {
        let requested = "Annotate:tigrfam".parse().expect("Failed to parse module id");
        assert_eq!(
            annotate().progress_names(&requested),
            Ok(vec!["Annotate:tigrfam".to_string()])
        );
    }

    #[test]
    fn progress_names_default_to_every_declared_submodule() {
        let requested = "Annotate".parse().expect("Failed to parse module id");
        assert_eq!(
            annotate().progress_names(&requested),
            Ok(vec![
                "Annotate:pfam".to_string(),
                "Annotate:tigrfam".to_string()
            ])
        );
    }

    #[test]
    fn progress_names_of_plain_module() {
        let genes = ModuleManifest::new("Genes", "Gene calling");
        let requested = "Genes".parse().expect("Failed to parse module id");
        assert_eq!(genes.progress_names(&requested), Ok(vec!["Genes".to_string()]));
    }

    #[test]
    fn progress_names_reject_undeclared_submodules() {
        let requested = "Annotate:kegg".parse().expect("Failed to parse module id");
        assert_eq!(
            annotate().progress_names(&requested),
            Err(UnknownSubmodule {
                module: "Annotate".to_string(),
                submodule: "kegg".to_string(),
            })
        );
    }
}
