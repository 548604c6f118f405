//! A set of utilities to enable logging configuration using tracing_subscriber.

use std::{error::Error, fmt, io::IsTerminal, sync::Once};

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static GENOPIPE_LOG_ENV_VAR: &str = "GENOPIPE_LOG";

/// Initializes a tracing subscriber for logging.
///
/// `RUST_LOG` directives are honoured as usual. Every workspace crate not mentioned there
/// logs at the level named by `GENOPIPE_LOG` (`info` if unset); everything else logs errors
/// only.
pub fn init() {
    // Since we also use this function to enable logging in tests, wrap it in `Once` to prevent
    // multiple initializations.
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (env_filter, log_level) = env_filter_and_log_level();

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .init();

        tracing::info!("log level: {}", log_level);
    });
}

/// List of crates in the workspace.
const GENOPIPE_CRATES: &[&str] = &[
    "genopipe_config",
    "genopiped",
    "metadata_db",
    "monitoring",
    "pipeline",
    "worker",
];

fn env_filter_and_log_level() -> (EnvFilter, String) {
    let directive_string = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .parse_lossy(&directive_string);

    let log_level = std::env::var(GENOPIPE_LOG_ENV_VAR).unwrap_or_else(|_| "info".to_string());

    for crate_name in GENOPIPE_CRATES {
        // Add directives for each workspace crate, if not overriden by RUST_LOG
        if directive_string.contains(&format!("{crate_name}=")) {
            continue;
        }
        match format!("{crate_name}={log_level}").parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(err) => {
                eprintln!("ignoring invalid {GENOPIPE_LOG_ENV_VAR} value {log_level:?}: {err}");
                break;
            }
        }
    }

    (env_filter, log_level)
}

/// Formats the `source()` chain of an error, excluding the error itself, for the
/// `error_source` field of a log event.
///
/// ```ignore
/// tracing::error!(error = %err, error_source = logging::error_source(&err), "run failed");
/// ```
pub fn error_source<E>(err: &E) -> tracing::field::DisplayValue<ErrorSource<'_>>
where
    E: Error + ?Sized,
{
    tracing::field::display(ErrorSource(err.source()))
}

/// Display adapter listing the causes of an error as `[cause1, cause2]`
pub struct ErrorSource<'a>(Option<&'a (dyn Error + 'static)>);

impl fmt::Display for ErrorSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut source = self.0;
        let mut first = true;
        while let Some(err) = source {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
            first = false;
            source = err.source();
        }
        f.write_str("]")
    }
}

/// Renders an error followed by its whole cause chain, one cause per line.
///
/// This is the form persisted in the `error_message` of a worker that exited abnormally.
pub fn error_chain<E>(err: &E) -> String
where
    E: Error + ?Sized,
{
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("module Annotate failed in run")]
    struct Outer(#[source] Middle);

    #[derive(Debug, thiserror::Error)]
    #[error("command exited with status 2")]
    struct Middle(#[source] std::io::Error);

    fn nested() -> Outer {
        Outer(Middle(std::io::Error::other("disk full")))
    }

    #[test]
    fn error_source_lists_causes_only() {
        let err = nested();
        let rendered = error_source(&err).to_string();
        assert_eq!(rendered, "[command exited with status 2, disk full]");
    }

    #[test]
    fn error_chain_includes_every_cause() {
        let err = nested();
        assert_eq!(
            error_chain(&err),
            "module Annotate failed in run\n  caused by: command exited with status 2\n  caused by: disk full"
        );
    }

    #[test]
    fn error_source_of_leaf_error_is_empty() {
        let err = std::io::Error::other("disk full");
        assert_eq!(ErrorSource(err.source()).to_string(), "[]");
    }
}
