//! Discovery of local Steam accounts, used to pick a value for `--user`.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use regex_lite::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SteamError {
    #[error("Could not find home dir. Please define $HOME env variable.")]
    NoHome,
    #[error("IO error reading {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamUser {
    pub id: String,
    pub name: String,
}

impl SteamUser {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("User {}", self.id)
        } else {
            format!("{} ({})", self.name, self.id)
        }
    }
}

/// Steam's data directory for the current user.
pub fn default_steam_dir() -> Result<PathBuf, SteamError> {
    let home = home::home_dir().ok_or(SteamError::NoHome)?;
    Ok(home.join("Library/Application Support/Steam"))
}

/// Users found under `<steam_dir>/userdata`, named ones first.
///
/// A missing Steam installation yields an empty list.
pub fn find_users(steam_dir: &Path) -> Result<Vec<SteamUser>, SteamError> {
    let userdata = steam_dir.join("userdata");
    if !userdata.is_dir() {
        debug!("No Steam userdata at {}", userdata.display());
        return Ok(Vec::new());
    }

    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| SteamError::IO { path, source }
    };

    let mut users = Vec::new();
    for entry in userdata.read_dir().map_err(io_error(&userdata))? {
        let entry = entry.map_err(io_error(&userdata))?;
        let id = entry.file_name().to_string_lossy().into_owned();
        if !entry.path().is_dir() || id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            trace!("Skipping {}", entry.path().display());
            continue;
        }
        let config = entry.path().join("config/localconfig.vdf");
        let name = std::fs::read_to_string(&config)
            .ok()
            .and_then(|content| persona_name(&content))
            .unwrap_or_default();
        users.push(SteamUser { id, name });
    }
    users.sort_by(compare_users);
    Ok(users)
}

fn compare_users(a: &SteamUser, b: &SteamUser) -> Ordering {
    match (a.name.is_empty(), b.name.is_empty()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, false) => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id)),
        (true, true) => a.id.cmp(&b.id),
    }
}

/// `PersonaName` value from a `localconfig.vdf`.
fn persona_name(content: &str) -> Option<String> {
    let re = Regex::new(r#""PersonaName"\s+"([^"]+)""#).ok()?;
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}
