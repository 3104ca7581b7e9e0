use std::{path::PathBuf, sync::Arc};

use crate::{
    config::{ConfigOverrides, RunnerConfig},
    executor::ScriptExecutor,
    process::{CommandRunner, SystemRunner},
    ShortcutRunner,
};

#[derive(Default)]
pub struct ShortcutRunnerBuilder {
    config: Option<RunnerConfig>,
    config_file: Option<PathBuf>,
    overrides: ConfigOverrides,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl ShortcutRunnerBuilder {
    /// Use this configuration as is instead of loading one.
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Configuration file to load.
    ///
    /// Defaults to `config.toml` in the application data directory.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Values applied on top of the loaded configuration.
    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Process runner used by every stage.
    ///
    /// Defaults to [`SystemRunner`].
    pub fn command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn try_build(self) -> anyhow::Result<ShortcutRunner> {
        let Self {
            config,
            config_file,
            overrides,
            runner,
        } = self;
        let config = match config {
            Some(config) => config,
            None => RunnerConfig::load(config_file.as_deref())?,
        }
        .apply(overrides)?;
        log::debug!("Using configuration {:?}", config);

        let runner = runner.unwrap_or_else(|| Arc::new(SystemRunner));
        Ok(ShortcutRunner::new(ScriptExecutor::new(config, runner)))
    }
}
