use std::{path::PathBuf, time::SystemTime};

use thiserror::Error;

use crate::process::RunError;

mod sync;

pub use sync::{RepositorySync, SyncAction};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("git {step} failed: {message}")]
    Git {
        step: &'static str,
        message: String,
        exit_code: i32,
    },
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("Repository lock cannot be acquired: {0}")]
    Lock(#[from] crate::flock::Error),
    #[error("Failed to prepare {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl SyncError {
    /// Exit code of the failing git process, `-1` if none ran.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Git { exit_code, .. } => *exit_code,
            _ => -1,
        }
    }

    /// The text recorded as the last sync error.
    pub fn diagnostic(&self) -> String {
        match self {
            SyncError::Git { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Where the checkout is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unknown,
    NotCloned,
    Cloned,
    Syncing,
    Updated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryState {
    pub local_path: PathBuf,
    pub is_cloned: bool,
    pub last_sync_time: Option<SystemTime>,
    pub last_error: Option<String>,
}

impl RepositoryState {
    pub fn new(local_path: PathBuf) -> Self {
        RepositoryState {
            local_path,
            is_cloned: false,
            last_sync_time: None,
            last_error: None,
        }
    }
}
