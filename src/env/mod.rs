//! Isolated Python environment living inside the checkout.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::process::{CommandSpec, RunError};

mod bootstrap;

pub use bootstrap::EnvironmentBootstrap;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("{step} failed: {message}")]
    Step {
        step: &'static str,
        message: String,
        exit_code: i32,
    },
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("IO error on {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BootstrapError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Step { exit_code, .. } => *exit_code,
            _ => -1,
        }
    }
}

/// The directory is the durable readiness record: when `environment_path`
/// exists, its dependencies were installed when it was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapState {
    pub environment_path: PathBuf,
    pub dependencies_installed: bool,
}

/// Interpreter inside an environment, for either platform layout.
pub fn interpreter_path(environment: &Path) -> PathBuf {
    let windows = environment.join("Scripts").join("python.exe");
    if windows.exists() {
        windows
    } else {
        environment.join("bin").join("python")
    }
}

/// Where a failed environment is kept for inspection.
pub fn parked_path(environment: &Path) -> PathBuf {
    let mut parked = environment.as_os_str().to_owned();
    parked.push(".failed");
    PathBuf::from(parked)
}

/// Applies what `bin/activate` would: `VIRTUAL_ENV` plus the environment's
/// script directory in front of `PATH`.
pub fn activate(command: CommandSpec, environment: &Path) -> CommandSpec {
    let scripts = interpreter_path(environment)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| environment.join("bin"));
    let mut paths = vec![scripts];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    let command = command.env("VIRTUAL_ENV", environment);
    match std::env::join_paths(paths) {
        Ok(path) => command.env("PATH", path),
        Err(_) => command,
    }
}

#[cfg(test)]
pub(crate) fn activation_value<'a>(command: &'a CommandSpec, key: &str) -> Option<&'a std::ffi::OsString> {
    command
        .env
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}
