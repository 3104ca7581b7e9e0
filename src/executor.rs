use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    config::RunnerConfig,
    env::{self, BootstrapError, EnvironmentBootstrap},
    flock::FileLock,
    git::{RepositorySync, SyncError},
    process::{CommandRunner, CommandSpec, ProcessOutput, RunError},
    status::StatusSink,
};

const WARNINGS_HEADER: &str = "\n\nWarnings:\n";

#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Checked before anything else runs the interpreter.
    #[error("Python 3 is not installed on this system. Please install Python 3 to continue.")]
    InterpreterMissing { interpreter: PathBuf },
    #[error("{message}")]
    ScriptFailed { message: String, exit_code: i32 },
    #[error("Failed to execute entry script: {0}")]
    Run(RunError),
}

/// A failure of one pipeline stage; later stages never ran.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Sync(_) => Stage::Sync,
            PipelineError::Bootstrap(_) => Stage::Bootstrap,
            PipelineError::Execution(_) => Stage::Execution,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Sync(e) => e.exit_code(),
            PipelineError::Bootstrap(e) => e.exit_code(),
            PipelineError::Execution(ExecutionError::ScriptFailed { exit_code, .. }) => *exit_code,
            PipelineError::Execution(_) => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sync,
    Bootstrap,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Sync => "repository sync",
            Stage::Bootstrap => "environment bootstrap",
            Stage::Execution => "execution",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    SuccessWithWarnings,
    Failure,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Success => "success",
            Classification::SuccessWithWarnings => "success with warnings",
            Classification::Failure => "failure",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub combined_output: String,
    pub classification: Classification,
    pub exit_code: i32,
    /// Set for failures only.
    pub failed_stage: Option<Stage>,
}

impl ExecutionResult {
    pub fn is_failure(&self) -> bool {
        self.classification == Classification::Failure
    }
}

impl From<PipelineError> for ExecutionResult {
    fn from(error: PipelineError) -> Self {
        ExecutionResult {
            combined_output: error.to_string(),
            classification: Classification::Failure,
            exit_code: error.exit_code(),
            failed_stage: Some(error.stage()),
        }
    }
}

/// Classifies a finished entry script run by its exit code and stderr.
pub fn classify(output: &ProcessOutput) -> ExecutionResult {
    let stdout = output.stdout.trim_end();
    let stderr = output.stderr.trim_end();
    if !output.success() {
        let message = if stderr.is_empty() {
            format!("Process exited with code {}", output.exit_code)
        } else {
            stderr.to_owned()
        };
        return PipelineError::from(ExecutionError::ScriptFailed {
            message,
            exit_code: output.exit_code,
        })
        .into();
    }
    let (combined_output, classification) = if stderr.is_empty() {
        (stdout.to_owned(), Classification::Success)
    } else {
        (
            format!("{stdout}{WARNINGS_HEADER}{stderr}"),
            Classification::SuccessWithWarnings,
        )
    };
    ExecutionResult {
        combined_output,
        classification,
        exit_code: output.exit_code,
        failed_stage: None,
    }
}

/// Sync, then bootstrap, then run the entry script; each stage only runs
/// when the previous one succeeded.
pub struct ScriptExecutor {
    config: RunnerConfig,
    runner: Arc<dyn CommandRunner>,
    sync: RepositorySync,
    bootstrap: EnvironmentBootstrap,
}

impl ScriptExecutor {
    pub fn new(config: RunnerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let sync = RepositorySync::new(&config, runner.clone());
        let bootstrap = EnvironmentBootstrap::new(&config, runner.clone());
        ScriptExecutor {
            config,
            runner,
            sync,
            bootstrap,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn repository(&self) -> &RepositorySync {
        &self.sync
    }

    /// Runs the repository sync alone, under the same lock as [`Self::execute`].
    pub fn sync(&mut self, sink: &dyn StatusSink) -> Result<(), PipelineError> {
        let _lock = self.lock()?;
        self.sync.ensure_up_to_date(sink)?;
        Ok(())
    }

    pub fn execute(&mut self, args: &[String], sink: &dyn StatusSink) -> ExecutionResult {
        let result = match self.run_pipeline(args, sink) {
            Ok(output) => classify(&output),
            Err(error) => {
                info!("Stopped at {}: {}", error.stage(), error);
                error.into()
            }
        };
        sink.on_complete(result.classification, &result.combined_output);
        result
    }

    fn run_pipeline(
        &mut self,
        args: &[String],
        sink: &dyn StatusSink,
    ) -> Result<ProcessOutput, PipelineError> {
        let _lock = self.lock()?;

        self.sync.ensure_up_to_date(sink)?;
        self.check_interpreter()?;
        let repository = self.config.repository.dir.clone();
        let state = self.bootstrap.ensure_ready(&repository, sink)?;

        sink.on_progress("Running entry script...");
        let command = self.entry_command(&state.environment_path, args);
        debug!("Executing command: {}", command.render());
        let output = self.runner.run(&command).map_err(|e| match e {
            RunError::NotFound { .. } => ExecutionError::InterpreterMissing {
                interpreter: env::interpreter_path(&state.environment_path),
            },
            other => ExecutionError::Run(other),
        })?;
        Ok(output)
    }

    fn lock(&self) -> Result<FileLock, SyncError> {
        Ok(FileLock::new(&self.config.lock_path())?)
    }

    fn check_interpreter(&self) -> Result<(), ExecutionError> {
        let interpreter = &self.config.python.interpreter;
        let missing = || ExecutionError::InterpreterMissing {
            interpreter: interpreter.clone(),
        };
        match self.runner.run(&CommandSpec::new(interpreter).arg("--version")) {
            Ok(output) if output.success() => {
                debug!("Using {}", output.stdout.trim());
                Ok(())
            }
            Ok(_) | Err(RunError::NotFound { .. }) => Err(missing()),
            Err(other) => Err(ExecutionError::Run(other)),
        }
    }

    fn entry_command(&self, environment: &Path, args: &[String]) -> CommandSpec {
        let command = CommandSpec::new(env::interpreter_path(environment))
            .arg(self.config.entry_script_path())
            .args(args)
            .current_dir(&self.config.repository.dir);
        let command = env::activate(command, environment);
        match &self.config.python.shell {
            Some(shell) => command.in_shell(shell),
            None => command,
        }
    }
}
