use std::path::PathBuf;

use clap::CommandFactory as _;
use genopipe_config::Config;
use metadata_db::{GenomeId, MetadataDb};
use pipeline::ModuleId;
use worker::job::WorkerJob;

mod genomes_cmd;
mod migrate_cmd;
mod modules_cmd;
mod reclaim_cmd;
mod redo_cmd;
mod registry;
mod run_cmd;

#[derive(Debug, clap::Parser)]
#[command(version)]
struct Args {
    /// The configuration file to use. Defines the metadata database connection and the
    /// command modules this worker can run.
    #[arg(long, env = "GENOPIPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
enum Command {
    /// Pipeline worker: runs the once modules, then claims and processes genomes until no
    /// work is left.
    ///
    /// Modules are comma separated `Name` or `Name:sub1+sub2` identifiers. At least one
    /// module must be given. The first SIGINT/SIGTERM stops at the next safe point, a
    /// second one exits immediately.
    Run {
        /// Modules run once on the pipeline-global target, in order.
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        once: Vec<ModuleId>,
        /// Modules run on every claimed genome, in order.
        #[arg(long = "per-genome", value_delimiter = ',', num_args = 1..)]
        per_genome: Vec<ModuleId>,
        /// Genome ids to process even if their modules are already done.
        #[arg(long, value_delimiter = ',')]
        genomes: Vec<GenomeId>,
        /// Undo and rerun modules that are already done.
        #[arg(long)]
        redo: bool,
        /// Refuse to run a module whose dependencies are not done.
        #[arg(long = "check-deps")]
        check_deps: bool,
    },
    /// Release genomes held by workers that exited abnormally and delete errored progress.
    ///
    /// Safe to run while other workers are active: only workers that recorded an abnormal
    /// exit are considered.
    Reclaim,
    /// Flag completed modules so that the next run undoes and reruns them.
    Redo {
        /// Modules to redo: `Name` for every submodule, `Name:sub` for one.
        #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
        modules: Vec<ModuleId>,
        /// Restrict to these genome ids (default: every genome).
        #[arg(long, value_delimiter = ',')]
        genomes: Vec<GenomeId>,
    },
    /// Apply pending schema migrations to the metadata database and exit.
    ///
    /// Safe to run multiple times.
    Migrate,
    /// List the configured modules in dependency order.
    Modules {
        /// Print the module manifests as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Manage the genomes known to the pipeline.
    Genomes {
        #[command(subcommand)]
        command: GenomesCommand,
    },
}

#[derive(Debug, Clone, clap::Subcommand)]
enum GenomesCommand {
    /// Register genomes by name. Existing names keep their id.
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    monitoring::logging::init();

    if let Err(err) = main_inner().await {
        // Manually print the error so we can control the format.
        let err = monitoring::logging::error_chain(&err);
        eprintln!("Exiting with error: {err}");
        std::process::exit(1);
    }
}

async fn main_inner() -> Result<(), Error> {
    let Args {
        config: config_path,
        command,
    } = clap::Parser::parse();

    tracing::info!("genopiped version {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(config_path.as_deref()).map_err(Error::LoadConfig)?;

    match command {
        Command::Run {
            once,
            per_genome,
            genomes,
            redo,
            check_deps,
        } => {
            let registry = registry::build(&config.modules).map_err(Error::Registry)?;
            let job = WorkerJob {
                once,
                per_genome,
                genomes,
                redo,
                check_deps,
            };
            // Usage errors exit with the command help before touching the database
            if let Err(err) = job.plan(&registry) {
                Args::command()
                    .error(clap::error::ErrorKind::InvalidValue, err)
                    .exit();
            }

            let metadata_db = connect(&config).await?;
            run_cmd::run(&config, metadata_db, registry, job)
                .await
                .map_err(Error::Run)?;
            Ok(())
        }
        Command::Reclaim => {
            let metadata_db = connect(&config).await?;
            reclaim_cmd::run(&metadata_db)
                .await
                .map_err(Error::Reclaim)?;
            Ok(())
        }
        Command::Redo { modules, genomes } => {
            let registry = registry::build(&config.modules).map_err(Error::Registry)?;
            let metadata_db = connect(&config).await?;
            redo_cmd::run(&metadata_db, &registry, &modules, &genomes)
                .await
                .map_err(Error::Redo)?;
            Ok(())
        }
        Command::Migrate => {
            migrate_cmd::run(&config.metadata_db)
                .await
                .map_err(Error::Migrate)?;
            Ok(())
        }
        Command::Modules { json } => {
            let registry = registry::build(&config.modules).map_err(Error::Registry)?;
            modules_cmd::run(&registry, json).map_err(Error::Modules)?;
            Ok(())
        }
        Command::Genomes {
            command: GenomesCommand::Add { names },
        } => {
            let metadata_db = connect(&config).await?;
            genomes_cmd::add(&metadata_db, &names)
                .await
                .map_err(Error::Genomes)?;
            Ok(())
        }
    }
}

async fn connect(config: &Config) -> Result<MetadataDb, Error> {
    let db_config = &config.metadata_db;
    MetadataDb::connect_with_config(&db_config.url, db_config.pool_config(), db_config.auto_migrate)
        .await
        .map_err(Error::ConnectMetadataDb)
}

/// Top-level error type for the `genopiped` binary.
///
/// Each variant wraps a command-specific error, providing a unified error type
/// for the main entry point while preserving the full error chain.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to load configuration.
    #[error("Failed to load config")]
    LoadConfig(#[source] genopipe_config::ConfigError),

    /// The configured modules do not form a valid registry.
    #[error("Invalid module configuration")]
    Registry(#[source] pipeline::ConfigurationError),

    /// Failed to connect to the metadata database.
    #[error("Failed to connect to the metadata database")]
    ConnectMetadataDb(#[source] metadata_db::Error),

    /// Run command failed.
    #[error("Run command failed")]
    Run(#[source] run_cmd::Error),

    /// Reclaim command failed.
    #[error("Reclaim command failed")]
    Reclaim(#[source] reclaim_cmd::Error),

    /// Redo command failed.
    #[error("Redo command failed")]
    Redo(#[source] redo_cmd::Error),

    /// Migrate command failed.
    #[error("Migrate command failed")]
    Migrate(#[source] migrate_cmd::Error),

    /// Modules command failed.
    #[error("Modules command failed")]
    Modules(#[source] modules_cmd::Error),

    /// Genomes command failed.
    #[error("Genomes command failed")]
    Genomes(#[source] genomes_cmd::Error),
}
