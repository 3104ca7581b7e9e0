use std::{path::PathBuf, sync::Arc, time::UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    executor::{ExecutionResult, PipelineError, ScriptExecutor},
    status::StatusSink,
};

mod builder;

pub use builder::ShortcutRunnerBuilder;

/// Async front of the pipeline.
///
/// Every call runs on the blocking thread pool, so the caller's runtime stays
/// responsive while git, pip or the entry script are working. Calls on the
/// same runner are serialized; runs from other processes wait on a file lock.
#[derive(Clone)]
pub struct ShortcutRunner {
    executor: Arc<Mutex<ScriptExecutor>>,
}

/// Snapshot of the on-disk state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub repository_dir: PathBuf,
    pub remote_url: String,
    pub branch: String,
    pub cloned: bool,
    pub environment_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_environment: Option<PathBuf>,
    pub entry_script_present: bool,
    /// Seconds since the unix epoch of the last successful sync by this runner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ShortcutRunner {
    pub fn builder() -> ShortcutRunnerBuilder {
        ShortcutRunnerBuilder::default()
    }

    pub(crate) fn new(executor: ScriptExecutor) -> Self {
        ShortcutRunner {
            executor: Arc::new(Mutex::new(executor)),
        }
    }

    /// Syncs the repository, bootstraps the environment and runs the entry
    /// script with `args`, passed through untouched.
    pub async fn execute(&self, args: Vec<String>, sink: Arc<dyn StatusSink>) -> ExecutionResult {
        let mut executor = self.executor.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || executor.execute(&args, sink.as_ref()))
            .await
            .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))
    }

    /// Brings the checkout up to date without touching the environment.
    pub async fn sync(&self, sink: Arc<dyn StatusSink>) -> Result<(), PipelineError> {
        let mut executor = self.executor.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || executor.sync(sink.as_ref()))
            .await
            .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))
    }

    pub async fn status(&self) -> StatusReport {
        let executor = self.executor.lock().await;
        let config = executor.config();
        let repository = executor.repository();
        let state = repository.state();
        let environment = config.environment_path();
        let parked = crate::env::parked_path(&environment);

        StatusReport {
            repository_dir: config.repository.dir.clone(),
            remote_url: config.repository.url.clone(),
            branch: config.repository.branch.clone(),
            cloned: repository.is_repository_cloned(),
            environment_ready: environment.is_dir(),
            failed_environment: parked.is_dir().then_some(parked),
            entry_script_present: config.entry_script_path().is_file(),
            last_sync: state
                .last_sync_time
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            last_error: state.last_error.clone(),
        }
    }

    pub async fn config(&self) -> crate::config::RunnerConfig {
        self.executor.lock().await.config().clone()
    }
}
