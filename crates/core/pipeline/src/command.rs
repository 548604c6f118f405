//! Modules that run an external program.
//!
//! A command module is declared by its argv alone. Placeholders in the arguments are
//! substituted per attempt:
//!
//! | placeholder   | value                                               |
//! |---------------|-----------------------------------------------------|
//! | `{genome_id}` | the claimed genome; empty for once-per-run modules  |
//! | `{module}`    | the module name                                     |
//! | `{submodule}` | one submodule of the attempt                        |
//!
//! When any argument contains `{submodule}` and the attempt covers submodules, the program
//! runs once per submodule, in order. A non-zero exit fails the step.

use std::{process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};

use crate::{
    driver::LifecycleStep,
    error::{BoxError, NotImplemented},
    module::{ModuleContext, PipelineModule},
    registry::ModuleFactory,
};

const GENOME_ID: &str = "{genome_id}";
const MODULE: &str = "{module}";
const SUBMODULE: &str = "{submodule}";

/// The programs of a command module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// argv of the `run` step
    pub run: Vec<String>,
    /// argv of the `undo` step; without it the module cannot be redone
    pub undo: Option<Vec<String>>,
}

impl CommandSpec {
    /// Factory creating a [`CommandModule`] for each attempt
    pub fn factory(self) -> ModuleFactory {
        let spec = Arc::new(self);
        Arc::new(move |ctx| {
            Box::new(CommandModule {
                spec: spec.clone(),
                ctx,
            })
        })
    }
}

/// A module instance running external programs
#[derive(Debug)]
pub struct CommandModule {
    spec: Arc<CommandSpec>,
    ctx: ModuleContext,
}

impl CommandModule {
    pub fn new(spec: CommandSpec, ctx: ModuleContext) -> Self {
        Self {
            spec: Arc::new(spec),
            ctx,
        }
    }

    /// The argv lists to execute for `template`, placeholders substituted
    fn invocations(&self, template: &[String]) -> Vec<Vec<String>> {
        let genome_id = self
            .ctx
            .target
            .genome_id()
            .map(|id| id.to_string())
            .unwrap_or_default();
        let module = self.ctx.module_id.name();
        let submodules = self.ctx.submodules();

        let substitute = |submodule: &str| -> Vec<String> {
            template
                .iter()
                .map(|arg| {
                    arg.replace(GENOME_ID, &genome_id)
                        .replace(MODULE, module)
                        .replace(SUBMODULE, submodule)
                })
                .collect()
        };

        let per_submodule = template.iter().any(|arg| arg.contains(SUBMODULE));
        if per_submodule && !submodules.is_empty() {
            submodules.into_iter().map(substitute).collect()
        } else {
            vec![substitute("")]
        }
    }

    async fn execute(&self, template: &[String]) -> Result<(), CommandError> {
        for argv in self.invocations(template) {
            run_program(self.ctx.module_id.name(), &argv).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineModule for CommandModule {
    async fn undo(&mut self) -> Result<(), BoxError> {
        let Some(undo) = &self.spec.undo else {
            return Err(NotImplemented(LifecycleStep::Undo).into());
        };
        self.execute(undo).await?;
        Ok(())
    }

    async fn run(&mut self) -> Result<(), BoxError> {
        self.execute(&self.spec.run).await?;
        Ok(())
    }
}

/// Runs one program to completion, logging its output at debug level
async fn run_program(module: &str, argv: &[String]) -> Result<(), CommandError> {
    let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;

    tracing::info!(module, program = %program, ?args, "starting module command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(|out| drain(module, "stdout", out));
    let stderr = child.stderr.take().map(|err| drain(module, "stderr", err));

    let status = child.wait().await.map_err(|source| CommandError::Wait {
        program: program.clone(),
        source,
    })?;

    for handle in [stdout, stderr].into_iter().flatten() {
        // Output readers end with the pipe; a panicked reader only loses log lines
        let _ = handle.await;
    }

    tracing::info!(
        module,
        program = %program,
        exit_code = status.code(),
        success = status.success(),
        "module command exited"
    );

    if !status.success() {
        return Err(CommandError::Failed {
            program: program.clone(),
            status,
        });
    }
    Ok(())
}

fn drain<R>(module: &str, stream: &'static str, reader: R) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let module = module.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(module = %module, stream, "{line}");
        }
    })
}

/// Errors running a module command
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("failed to start {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
    },
}
