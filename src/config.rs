use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use anyhow::Context;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_REPOSITORY_URL: &str = "https://github.com/entwickler42/VDF.git";
pub const DEFAULT_BRANCH: &str = "main";
pub const LOCAL_REPOSITORY_NAME: &str = "VDF";
const ENV_PREFIX: &str = "SHORTCUT_RUNNER";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Fully resolved settings, injected into every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub repository: RepositoryConfig,
    pub python: PythonConfig,
    pub git_program: PathBuf,
    pub layout: RepositoryLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub url: String,
    pub branch: String,
    /// Local checkout, owned exclusively by the repository sync.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonConfig {
    /// Host interpreter used to create the environment.
    pub interpreter: PathBuf,
    /// When set, the entry script runs as `<shell> -c "<line>"`.
    pub shell: Option<PathBuf>,
}

/// Paths inside the checkout that are consumed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    pub metadata_dir: PathBuf,
    pub environment_dir: PathBuf,
    pub manifest: PathBuf,
    pub entry_script: PathBuf,
}

impl Default for RepositoryLayout {
    fn default() -> Self {
        RepositoryLayout {
            metadata_dir: PathBuf::from(".git"),
            environment_dir: PathBuf::from(".venv"),
            manifest: PathBuf::from("requirements.txt"),
            entry_script: PathBuf::from("steam_macos_shortcut_creator/fixicons.py"),
        }
    }
}

/// Values given on the command line, they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub repository_dir: Option<PathBuf>,
    pub repository_url: Option<String>,
    pub branch: Option<String>,
    pub interpreter: Option<PathBuf>,
}

impl RunnerConfig {
    /// Loads defaults, then the config file, then `SHORTCUT_RUNNER_*` variables.
    ///
    /// An explicitly given `config_file` must exist, the default one is optional.
    pub fn load(config_file: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = default_data_dir()?;
        let (file, required) = match config_file {
            Some(path) => (path.to_path_buf(), true),
            None => (data_dir.join(CONFIG_FILE_NAME), false),
        };
        let raw = RawConfig::load(None, Some((&file, required)))
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;
        Self::from_raw(raw, &data_dir).anchored()
    }

    /// Defaults only, rooted at `data_dir`.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self::from_raw(RawConfig::default(), data_dir)
    }

    /// Applies `overrides` and anchors relative paths at the current directory.
    pub fn apply(mut self, overrides: ConfigOverrides) -> anyhow::Result<Self> {
        if let Some(dir) = overrides.repository_dir {
            self.repository.dir = dir;
        }
        if let Some(url) = overrides.repository_url {
            self.repository.url = url;
        }
        if let Some(branch) = overrides.branch {
            self.repository.branch = branch;
        }
        if let Some(interpreter) = overrides.interpreter {
            self.python.interpreter = interpreter;
        }
        self.anchored()
    }

    /// Relative paths resolved against the current directory.
    fn anchored(self) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Could not determine the current directory")?;
        Ok(self.anchored_at(&cwd))
    }

    fn anchored_at(mut self, base: &Path) -> Self {
        self.repository.dir = anchor(&self.repository.dir, base);
        self.python.interpreter = anchor_program(&self.python.interpreter, base);
        self.python.shell = self.python.shell.map(|shell| anchor_program(&shell, base));
        self.git_program = anchor_program(&self.git_program, base);
        self
    }

    pub fn environment_path(&self) -> PathBuf {
        self.repository.dir.join(&self.layout.environment_dir)
    }

    pub fn entry_script_path(&self) -> PathBuf {
        self.repository.dir.join(&self.layout.entry_script)
    }

    /// Lock file living next to the checkout, so removing the checkout keeps it.
    pub fn lock_path(&self) -> PathBuf {
        let dir = &self.repository.dir;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| LOCAL_REPOSITORY_NAME.to_owned());
        let lock_name = format!(".{name}.lock");
        match dir.parent() {
            Some(parent) => parent.join(lock_name),
            None => PathBuf::from(lock_name),
        }
    }

    fn from_raw(raw: RawConfig, data_dir: &Path) -> Self {
        RunnerConfig {
            repository: RepositoryConfig {
                url: raw
                    .repository
                    .url
                    .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_owned()),
                branch: raw
                    .repository
                    .branch
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_owned()),
                dir: raw
                    .repository
                    .dir
                    .unwrap_or_else(|| data_dir.join(LOCAL_REPOSITORY_NAME)),
            },
            python: PythonConfig {
                interpreter: raw
                    .python
                    .interpreter
                    .unwrap_or_else(|| PathBuf::from("python3")),
                shell: raw.python.shell,
            },
            git_program: raw.git.program.unwrap_or_else(|| PathBuf::from("git")),
            layout: RepositoryLayout::default(),
        }
    }
}

fn anchor(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .fold(base.to_path_buf(), |acc, c| acc.join(c))
}

/// Bare names are looked up on `PATH` and stay as they are.
fn anchor_program(program: &Path, base: &Path) -> PathBuf {
    if program.components().count() > 1 {
        anchor(program, base)
    } else {
        program.to_path_buf()
    }
}

/// Per-application data directory that holds the checkout.
pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = home::home_dir()
        .context("Could not find home dir. Please define $HOME env variable.")?;
    Ok(data_dir_for(&home, std::env::var_os("XDG_DATA_HOME").map(PathBuf::from)))
}

#[cfg(target_os = "macos")]
fn data_dir_for(home: &Path, _xdg_data_home: Option<PathBuf>) -> PathBuf {
    home.join("Library/Application Support/SteamShortcutCreator")
}

#[cfg(not(target_os = "macos"))]
fn data_dir_for(home: &Path, xdg_data_home: Option<PathBuf>) -> PathBuf {
    xdg_data_home
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| home.join(".local/share"))
        .join("shortcut-runner")
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    repository: RawRepositoryConfig,
    #[serde(default)]
    python: RawPythonConfig,
    #[serde(default)]
    git: RawGitConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawRepositoryConfig {
    url: Option<String>,
    branch: Option<String>,
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawPythonConfig {
    interpreter: Option<PathBuf>,
    shell: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawGitConfig {
    program: Option<PathBuf>,
}

impl RawConfig {
    fn load(
        env: Option<HashMap<String, String>>,
        file: Option<(&Path, bool)>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some((path, required)) = file {
            builder = builder.add_source(File::from(path).required(required));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
