use pipeline::{ConfigurationError, ModuleManifest, ModuleRegistry, ModuleScope, UnknownModule};

/// Prints the configured modules, dependencies first
pub fn run(registry: &ModuleRegistry, json: bool) -> Result<(), Error> {
    let listing = listing(registry)?;

    if json {
        let out = serde_json::to_string_pretty(&listing).map_err(Error::Json)?;
        println!("{out}");
        return Ok(());
    }

    for entry in &listing {
        println!("{}", render(entry));
    }
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct ModuleListing<'a> {
    #[serde(flatten)]
    manifest: &'a ModuleManifest,
    scope: ModuleScope,
}

fn listing(registry: &ModuleRegistry) -> Result<Vec<ModuleListing<'_>>, Error> {
    let graph = registry.dep_graph().map_err(Error::Configuration)?;
    graph
        .names_in_order()
        .into_iter()
        .map(|name| {
            let module = registry.get(name).map_err(Error::UnknownModule)?;
            Ok(ModuleListing {
                manifest: &module.manifest,
                scope: module.scope,
            })
        })
        .collect()
}

fn render(entry: &ModuleListing<'_>) -> String {
    let manifest = entry.manifest;
    let mut out = format!("{} ({})", manifest.name, entry.scope);
    if !manifest.description.is_empty() {
        out.push_str(&format!(": {}", manifest.description));
    }
    if !manifest.dependencies.is_empty() {
        out.push_str(&format!("\n  depends on: {}", manifest.dependencies.join(", ")));
    }
    for (submodule, description) in &manifest.submodules {
        out.push_str(&format!("\n  {}:{submodule}  {description}", manifest.name));
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The module declarations do not form a dependency DAG.
    #[error("Invalid module configuration")]
    Configuration(#[source] ConfigurationError),

    /// The dependency graph names a module the registry does not hold.
    #[error("Module missing from the registry")]
    UnknownModule(#[source] UnknownModule),

    /// Failed to encode the listing.
    #[error("Failed to encode the module listing")]
    Json(#[source] serde_json::Error),
}
