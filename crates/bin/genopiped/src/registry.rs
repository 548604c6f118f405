//! Module registry of the daemon, populated from the `[[modules]]` configuration entries.

use genopipe_config::{CommandModuleConfig, ModuleScopeConfig};
use pipeline::{CommandSpec, ConfigurationError, ModuleManifest, ModuleRegistry, ModuleScope};

/// Registers every configured command module and checks that their dependencies form a DAG
pub fn build(modules: &[CommandModuleConfig]) -> Result<ModuleRegistry, ConfigurationError> {
    let mut registry = ModuleRegistry::new();
    for module in modules {
        let mut manifest = ModuleManifest::new(&module.name, &module.description)
            .with_dependencies(&module.dependencies);
        for (submodule, description) in &module.submodules {
            manifest = manifest.with_submodule(submodule, description);
        }
        let scope = match module.scope {
            ModuleScopeConfig::Once => ModuleScope::Once,
            ModuleScopeConfig::PerGenome => ModuleScope::PerGenome,
        };
        let spec = CommandSpec {
            run: module.command.clone(),
            undo: module.undo.clone(),
        };
        registry.register(manifest, scope, spec.factory())?;
    }

    // Fail on malformed dependency declarations before any command runs
    registry.dep_graph()?;

    tracing::debug!(modules = registry.len(), "module registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use genopipe_config::Config;

    use super::*;

    fn config(modules: &str) -> Config {
        let toml = format!(
            r#"
            [metadata_db]
            url = "postgres://localhost/genomes"
            {modules}
            "#
        );
        Config::from_toml_str(&toml).expect("Failed to parse config")
    }

    #[test]
    fn build_registers_configured_modules() {
        let config = config(
            r#"
            [[modules]]
            name = "Genes"
            scope = "per_genome"
            command = ["prodigal", "{genome_id}"]

            [[modules]]
            name = "Annotate"
            dependencies = ["Genes"]
            scope = "per_genome"
            command = ["annotate", "{genome_id}", "{submodule}"]
            submodules = { pfam = "Pfam", tigrfam = "TIGRFAM" }
            "#,
        );

        let registry = build(&config.modules).expect("Failed to build registry");

        let annotate = registry.get("Annotate").expect("Annotate is registered");
        assert_eq!(annotate.scope, ModuleScope::PerGenome);
        assert_eq!(annotate.manifest.dependencies, vec!["Genes".to_string()]);
        assert_eq!(annotate.manifest.submodules.len(), 2);
    }

    #[test]
    fn build_rejects_dependency_cycles() {
        let config = config(
            r#"
            [[modules]]
            name = "A"
            dependencies = ["B"]
            scope = "once"
            command = ["true"]

            [[modules]]
            name = "B"
            dependencies = ["A"]
            scope = "once"
            command = ["true"]
            "#,
        );

        let result = build(&config.modules);

        assert!(matches!(result, Err(ConfigurationError::DependencyCycle(_))));
    }
}
