use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use log::{debug, info, warn};

use crate::{
    config::RunnerConfig,
    process::{CommandRunner, CommandSpec, ProcessOutput},
    status::StatusSink,
};

use super::{RepositoryState, SyncError, SyncState};

/// What a successful sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    Updated,
}

/// Keeps the local checkout equal to the tip of the configured remote branch.
///
/// The checkout is a managed cache: updates hard-reset the working tree and
/// local modifications are discarded.
pub struct RepositorySync {
    runner: Arc<dyn CommandRunner>,
    git: PathBuf,
    url: String,
    branch: String,
    metadata_dir: PathBuf,
    state: RepositoryState,
    phase: SyncState,
}

impl RepositorySync {
    pub fn new(config: &RunnerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let mut sync = RepositorySync {
            runner,
            git: config.git_program.clone(),
            url: config.repository.url.clone(),
            branch: config.repository.branch.clone(),
            metadata_dir: config.layout.metadata_dir.clone(),
            state: RepositoryState::new(config.repository.dir.clone()),
            phase: SyncState::Unknown,
        };
        sync.state.is_cloned = sync.is_repository_cloned();
        sync
    }

    pub fn state(&self) -> &RepositoryState {
        &self.state
    }

    pub fn phase(&self) -> SyncState {
        self.phase
    }

    pub fn local_path(&self) -> &Path {
        &self.state.local_path
    }

    pub fn is_repository_cloned(&self) -> bool {
        self.state.local_path.join(&self.metadata_dir).exists()
    }

    /// Clones on first use, otherwise fetches and hard-resets to the remote branch.
    pub fn ensure_up_to_date(&mut self, sink: &dyn StatusSink) -> Result<SyncAction, SyncError> {
        sink.on_progress("Checking for updates...");
        self.phase = if self.is_repository_cloned() {
            SyncState::Cloned
        } else {
            SyncState::NotCloned
        };
        let cloned = self.phase == SyncState::Cloned;
        self.phase = SyncState::Syncing;

        let result = if cloned {
            sink.on_progress("Pulling latest changes...");
            self.update().map(|_| SyncAction::Updated)
        } else {
            sink.on_progress("Cloning repository...");
            self.clone_repository().map(|_| SyncAction::Cloned)
        };

        match &result {
            Ok(action) => {
                self.phase = SyncState::Updated;
                self.state.is_cloned = true;
                self.state.last_sync_time = Some(SystemTime::now());
                self.state.last_error = None;
                info!(
                    "Repository at {} is up to date ({:?})",
                    self.state.local_path.display(),
                    action
                );
                sink.on_progress("Repository updated successfully");
            }
            Err(error) => {
                self.phase = SyncState::Failed;
                self.state.last_error = Some(error.diagnostic());
                warn!("Repository update failed: {}", error);
            }
        }
        result
    }

    fn clone_repository(&self) -> Result<(), SyncError> {
        let path = &self.state.local_path;
        if path.exists() {
            warn!(
                "{} exists but is not a git checkout, removing it",
                path.display()
            );
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            removed.map_err(|source| SyncError::IO {
                path: path.clone(),
                source,
            })?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SyncError::IO {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!("Cloning {} into {}", self.url, path.display());
        let clone = CommandSpec::new(&self.git)
            .arg("clone")
            .arg(&self.url)
            .arg(path);
        let clone = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => clone.current_dir(parent),
            _ => clone,
        };
        self.git_step("clone", &clone)?;

        self.git_step("checkout", &self.in_checkout(["checkout", self.branch.as_str()]))?;
        Ok(())
    }

    fn update(&self) -> Result<(), SyncError> {
        self.ensure_remote_url()?;
        info!("Fetching {} into {}", self.url, self.state.local_path.display());
        self.git_step("fetch", &self.in_checkout(["fetch", "origin"]))?;
        let target = format!("origin/{}", self.branch);
        self.git_step(
            "reset",
            &self.in_checkout(["reset", "--hard", target.as_str()]),
        )?;
        Ok(())
    }

    /// Re-points `origin` when the configured URL changed since the clone.
    fn ensure_remote_url(&self) -> Result<(), SyncError> {
        let current = self
            .runner
            .run(&self.in_checkout(["remote", "get-url", "origin"]))?;
        if current.success() && current.stdout.trim() == self.url {
            return Ok(());
        }
        debug!(
            "Updating remote url {:?} to {}",
            current.stdout.trim(),
            self.url
        );
        self.git_step(
            "remote set-url",
            &self.in_checkout(["remote", "set-url", "origin", self.url.as_str()]),
        )?;
        Ok(())
    }

    fn in_checkout<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        CommandSpec::new(&self.git)
            .args(args)
            .current_dir(&self.state.local_path)
    }

    fn git_step(&self, step: &'static str, command: &CommandSpec) -> Result<ProcessOutput, SyncError> {
        let output = self.runner.run(command)?;
        if output.success() {
            Ok(output)
        } else {
            Err(SyncError::Git {
                step,
                message: output.diagnostic(&format!("git {step}")),
                exit_code: output.exit_code,
            })
        }
    }
}
