//! Worker configuration loading.
//!
//! The configuration is read from an optional TOML file and then overridden by
//! `GENOPIPE_CONFIG_*` environment variables. Nested keys use double underscore
//! separators, e.g. `GENOPIPE_CONFIG_METADATA_DB__URL` overrides `metadata_db.url`.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Toml},
};
use fs_err as fs;

mod metadb;
mod modules;
mod redacted;

pub use self::{
    metadb::{DEFAULT_METADB_CONN_POOL_SIZE, MetadataDbConfig},
    modules::{CommandModuleConfig, ModuleScopeConfig},
    redacted::Redacted,
};

/// Prefix of the environment variables overriding configuration values
pub const ENV_PREFIX: &str = "GENOPIPE_CONFIG_";

/// Resolved worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub metadata_db: MetadataDbConfig,
    pub worker: WorkerConfig,
    /// Command modules declared in the file, in declaration order
    pub modules: Vec<CommandModuleConfig>,
    /// Canonical path of the file the configuration was read from, if any
    pub config_path: Option<PathBuf>,
}

/// Settings recorded on the worker row
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct WorkerConfig {
    /// Public network address of this worker, for operators (default: none)
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ConfigFile {
    metadata_db: Option<MetadataDbConfig>,
    #[serde(default)]
    worker: WorkerConfig,
    #[serde(default)]
    modules: Vec<CommandModuleConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error at {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Missing required config: {0}")]
    MissingConfig(&'static str),
    #[error("Config parse error: {0}")]
    Figment(#[source] figment::Error),
    #[error("Invalid module declaration: {0}")]
    InvalidModule(String),
    #[error("Module {0} is declared more than once")]
    DuplicateModule(String),
}

impl Config {
    /// Load configuration from an optional file with environment variable overrides.
    ///
    /// Without a file, the whole configuration must come from the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();

        let config_path = match file {
            Some(path) => {
                let config_path = fs::canonicalize(path)
                    .map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
                figment = figment.merge(Toml::file(&config_path));
                Some(config_path)
            }
            None => None,
        };
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config_file: ConfigFile = figment.extract().map_err(ConfigError::Figment)?;
        Self::from_config_file(config_file, config_path)
    }

    /// Load configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config_file: ConfigFile = Figment::new()
            .merge(Toml::string(contents))
            .extract()
            .map_err(ConfigError::Figment)?;
        Self::from_config_file(config_file, None)
    }

    fn from_config_file(
        config_file: ConfigFile,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let metadata_db = config_file
            .metadata_db
            .ok_or(ConfigError::MissingConfig("metadata_db.url"))?;

        let mut seen = std::collections::BTreeSet::new();
        for module in &config_file.modules {
            module.validate().map_err(ConfigError::InvalidModule)?;
            if !seen.insert(module.name.as_str()) {
                return Err(ConfigError::DuplicateModule(module.name.clone()));
            }
        }

        tracing::debug!(
            config_path = ?config_path,
            modules = config_file.modules.len(),
            "configuration loaded"
        );

        Ok(Self {
            metadata_db,
            worker: config_file.worker,
            modules: config_file.modules,
            config_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    const FULL: &str = r#"
        [metadata_db]
        url = "postgres://localhost/genomes"
        pool_size = 4

        [worker]
        address = "10.0.0.7:9000"

        [[modules]]
        name = "Genes"
        scope = "per_genome"
        command = ["call-genes", "{genome_id}"]

        [[modules]]
        name = "Annotate"
        description = "Protein domain annotation"
        dependencies = ["Genes"]
        scope = "per_genome"
        command = ["annotate", "{genome_id}", "{submodule}"]
        undo = ["annotate", "--purge", "{genome_id}", "{submodule}"]

        [modules.submodules]
        pfam = "Pfam domains"
        tigrfam = "TIGRFAM families"
    "#;

    #[test]
    fn parses_every_section() {
        let config = Config::from_toml_str(FULL).expect("Failed to parse config");

        assert_eq!(config.metadata_db.url.as_str(), "postgres://localhost/genomes");
        assert_eq!(config.metadata_db.pool_size, 4);
        assert!(config.metadata_db.auto_migrate);
        assert_eq!(config.worker.address.as_deref(), Some("10.0.0.7:9000"));

        assert_eq!(config.modules.len(), 2);
        let annotate = &config.modules[1];
        assert_eq!(annotate.dependencies, vec!["Genes".to_string()]);
        assert_eq!(annotate.scope, ModuleScopeConfig::PerGenome);
        assert_eq!(
            annotate.submodules.keys().collect::<Vec<_>>(),
            vec!["pfam", "tigrfam"]
        );
        assert!(annotate.undo.is_some());
    }

    #[test]
    fn missing_metadata_db_is_reported() {
        let result = Config::from_toml_str("[worker]\n");
        assert!(matches!(
            result,
            Err(ConfigError::MissingConfig("metadata_db.url"))
        ));
    }

    #[test]
    fn pool_size_defaults_when_omitted() {
        let config = Config::from_toml_str("[metadata_db]\nurl = \"postgres://x/y\"\n")
            .expect("Failed to parse config");
        assert_eq!(config.metadata_db.pool_size, DEFAULT_METADB_CONN_POOL_SIZE);
        assert!(config.modules.is_empty());
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let contents = r#"
            [metadata_db]
            url = "postgres://x/y"

            [[modules]]
            name = "Genes"
            scope = "once"
            command = ["a"]

            [[modules]]
            name = "Genes"
            scope = "once"
            command = ["b"]
        "#;
        let result = Config::from_toml_str(contents);
        assert!(matches!(result, Err(ConfigError::DuplicateModule(name)) if name == "Genes"));
    }

    #[test]
    fn module_names_with_separators_are_rejected() {
        let contents = r#"
            [metadata_db]
            url = "postgres://x/y"

            [[modules]]
            name = "Genes:x"
            scope = "once"
            command = ["a"]
        "#;
        let result = Config::from_toml_str(contents);
        assert!(matches!(result, Err(ConfigError::InvalidModule(_))));
    }

    #[test]
    fn load_reads_the_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(FULL.as_bytes())
            .expect("Failed to write config file");

        let config = Config::load(Some(file.path())).expect("Failed to load config");

        assert!(config.config_path.is_some());
        assert_eq!(config.modules.len(), 2);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/genopipe.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_, _))));
    }
}
