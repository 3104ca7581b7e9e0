use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{info, warn};

use crate::{
    config::RunnerConfig,
    process::{CommandRunner, CommandSpec},
    status::StatusSink,
};

use super::{interpreter_path, parked_path, BootstrapError, BootstrapState};

const PACKAGE_MANIFESTS: [&str; 2] = ["setup.py", "pyproject.toml"];

/// Creates the environment once and trusts it afterwards.
pub struct EnvironmentBootstrap {
    runner: Arc<dyn CommandRunner>,
    interpreter: PathBuf,
    environment_dir: PathBuf,
    manifest: PathBuf,
}

impl EnvironmentBootstrap {
    pub fn new(config: &RunnerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        EnvironmentBootstrap {
            runner,
            interpreter: config.python.interpreter.clone(),
            environment_dir: config.layout.environment_dir.clone(),
            manifest: config.layout.manifest.clone(),
        }
    }

    pub fn environment_path(&self, repository: &Path) -> PathBuf {
        repository.join(&self.environment_dir)
    }

    /// Returns the environment, creating it and installing dependencies if it
    /// does not exist yet. Installed versions are never re-validated.
    pub fn ensure_ready(
        &self,
        repository: &Path,
        sink: &dyn StatusSink,
    ) -> Result<BootstrapState, BootstrapError> {
        let environment = self.environment_path(repository);
        if environment.exists() {
            info!("Reusing environment at {}", environment.display());
            return Ok(BootstrapState {
                environment_path: environment,
                dependencies_installed: true,
            });
        }

        sink.on_progress("Setting up Python environment...");
        info!("Creating environment at {}", environment.display());
        match self.create(repository, &environment) {
            Ok(()) => Ok(BootstrapState {
                environment_path: environment,
                dependencies_installed: true,
            }),
            Err(error) => {
                self.park_failed(&environment);
                Err(error)
            }
        }
    }

    fn create(&self, repository: &Path, environment: &Path) -> Result<(), BootstrapError> {
        self.step(
            "create environment",
            CommandSpec::new(&self.interpreter)
                .args(["-m", "venv"])
                .arg(environment)
                .current_dir(repository),
        )?;

        let python = interpreter_path(environment);
        let manifest = repository.join(&self.manifest);
        if manifest.exists() {
            self.step(
                "install dependencies",
                pip(&python, repository).arg("-r").arg(&manifest),
            )?;
        } else {
            warn!(
                "{} not found, skipping dependency installation",
                manifest.display()
            );
        }

        if PACKAGE_MANIFESTS
            .iter()
            .any(|name| repository.join(name).exists())
        {
            self.step(
                "install package",
                pip(&python, repository).arg("-e").arg(repository),
            )?;
        } else {
            warn!(
                "No setup.py or pyproject.toml in {}, skipping package installation",
                repository.display()
            );
        }
        Ok(())
    }

    fn step(&self, step: &'static str, command: CommandSpec) -> Result<(), BootstrapError> {
        let output = self.runner.run(&command)?;
        if output.success() {
            Ok(())
        } else {
            Err(BootstrapError::Step {
                step,
                message: output.diagnostic(step),
                exit_code: output.exit_code,
            })
        }
    }

    /// Moves a half-built environment aside so its presence never reads as
    /// ready, keeping it around for inspection.
    fn park_failed(&self, environment: &Path) {
        if !environment.exists() {
            return;
        }
        let parked = parked_path(environment);
        if parked.exists() {
            if let Err(e) = std::fs::remove_dir_all(&parked) {
                warn!("Could not remove {}: {}", parked.display(), e);
            }
        }
        match std::fs::rename(environment, &parked) {
            Ok(()) => warn!(
                "Environment setup failed, partial environment kept at {}",
                parked.display()
            ),
            Err(e) => {
                warn!(
                    "Could not move {} aside ({}), removing it",
                    environment.display(),
                    e
                );
                if let Err(e) = std::fs::remove_dir_all(environment) {
                    warn!("Could not remove {}: {}", environment.display(), e);
                }
            }
        }
    }
}

fn pip(python: &Path, repository: &Path) -> CommandSpec {
    CommandSpec::new(python)
        .args(["-m", "pip", "install"])
        .current_dir(repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        process::testing::{output, ScriptedRunner},
        status::NoopSink,
    };

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Emulates `python -m venv <dir>` by creating the directory.
    fn venv_creating(pip_result: fn() -> crate::process::ProcessOutput) -> ScriptedRunner {
        ScriptedRunner::new(move |cmd| {
            let args = cmd.args_lossy();
            if args.get(1).map(String::as_str) == Some("venv") {
                std::fs::create_dir_all(Path::new(&args[2]).join("bin")).unwrap();
                Ok(output(0, "", ""))
            } else {
                Ok(pip_result())
            }
        })
    }

    fn repository(with_manifest: bool, with_setup: bool) -> (TempDir, RunnerConfig) {
        let dir = TempDir::new().unwrap();
        let mut config = RunnerConfig::with_data_dir(&dir.path().join("App Support"));
        config.python.interpreter = PathBuf::from("/usr/bin/python3");
        std::fs::create_dir_all(&config.repository.dir).unwrap();
        if with_manifest {
            std::fs::write(config.repository.dir.join("requirements.txt"), "vdf\n").unwrap();
        }
        if with_setup {
            std::fs::write(config.repository.dir.join("setup.py"), "").unwrap();
        }
        (dir, config)
    }

    #[test]
    fn creates_environment_and_installs_once() {
        let (_dir, config) = repository(true, true);
        let runner = Arc::new(venv_creating(|| output(0, "installed", "")));
        let bootstrap = EnvironmentBootstrap::new(&config, runner.clone());
        let repo = &config.repository.dir;
        let env = repo.join(".venv");
        let python = env.join("bin/python");

        let state = bootstrap.ensure_ready(repo, &NoopSink).unwrap();
        assert_eq!(
            state,
            BootstrapState {
                environment_path: env.clone(),
                dependencies_installed: true
            }
        );
        assert_eq!(
            runner.call_lines(),
            vec![
                format!("/usr/bin/python3 -m venv {}", env.display()),
                format!(
                    "{} -m pip install -r {}",
                    python.display(),
                    repo.join("requirements.txt").display()
                ),
                format!("{} -m pip install -e {}", python.display(), repo.display()),
            ]
        );
        assert!(runner.calls().iter().all(|c| c.cwd.as_ref() == Some(repo)));

        bootstrap.ensure_ready(repo, &NoopSink).unwrap();
        assert_eq!(runner.calls().len(), 3, "second call must not install again");
    }

    #[test]
    fn existing_environment_is_trusted() {
        let (_dir, config) = repository(true, true);
        std::fs::create_dir_all(config.environment_path()).unwrap();
        let runner = Arc::new(ScriptedRunner::succeeding());
        let bootstrap = EnvironmentBootstrap::new(&config, runner.clone());

        let state = bootstrap
            .ensure_ready(&config.repository.dir, &NoopSink)
            .unwrap();
        assert_eq!(state.environment_path, config.environment_path());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn missing_manifests_only_create_environment() {
        let (_dir, config) = repository(false, false);
        let runner = Arc::new(venv_creating(|| output(0, "", "")));
        let bootstrap = EnvironmentBootstrap::new(&config, runner.clone());

        bootstrap
            .ensure_ready(&config.repository.dir, &NoopSink)
            .unwrap();
        assert_eq!(runner.calls().len(), 1);
        assert!(config.environment_path().exists());
    }

    #[test]
    fn failed_install_is_parked_and_retried_next_time() {
        let (_dir, config) = repository(true, true);
        let runner = Arc::new(venv_creating(|| {
            output(1, "", "ERROR: No matching distribution found for vdf\n")
        }));
        let bootstrap = EnvironmentBootstrap::new(&config, runner.clone());
        let repo = &config.repository.dir;

        let error = bootstrap.ensure_ready(repo, &NoopSink).unwrap_err();
        assert_eq!(
            error.to_string(),
            "install dependencies failed: ERROR: No matching distribution found for vdf"
        );
        assert_eq!(error.exit_code(), 1);
        assert_eq!(runner.calls().len(), 2, "editable install must not run");
        assert!(!repo.join(".venv").exists());
        assert!(repo.join(".venv.failed").is_dir());

        bootstrap.ensure_ready(repo, &NoopSink).unwrap_err();
        assert_eq!(runner.calls().len(), 4, "the full sequence runs again");
        assert!(repo.join(".venv.failed").is_dir());
    }

    #[test]
    fn failed_creation_reports_generic_message() {
        let (_dir, config) = repository(true, true);
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(output(2, "", ""))));
        let bootstrap = EnvironmentBootstrap::new(&config, runner.clone());

        let error = bootstrap
            .ensure_ready(&config.repository.dir, &NoopSink)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "create environment failed: create environment exited with code 2"
        );
        assert_eq!(runner.calls().len(), 1);
        assert!(!config.environment_path().exists());
    }
}
