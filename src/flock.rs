use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, info};
use thiserror::Error;

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Exclusive advisory lock held for as long as the value lives.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error("Cannot lock {path}: {source}")]
pub struct Error {
    path: PathBuf,
    source: std::io::Error,
}

impl FileLock {
    pub fn new(path: &Path) -> Result<Self, Error> {
        let error = |source| Error {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(error)?;
        }
        let file = File::create(path).map_err(error)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => {
                    debug!("Acquired a lock on {}", path.display());
                    return Ok(Self { _file: file });
                }
                Err(e)
                    if e.raw_os_error() == fs4::lock_contended_error().raw_os_error()
                        && start.elapsed() < LOCK_TIMEOUT =>
                {
                    info!(
                        "{} is locked by another run, waiting for it to finish",
                        path.display()
                    );
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(e) => return Err(error(e)),
            }
        }
    }
}
