use std::{error::Error, path::Path, sync::Arc};

use log::{error, info};

use crate::{
    cli::{args::RunArgs, CliSink},
    config::RunnerConfig,
    env,
    executor::ExecutionResult,
    flock::FileLock,
    status::{refine_status, DisplayStatus, LogSink},
    steam, ShortcutRunner,
};

/// Handler to run command
pub async fn do_run(
    runner: &ShortcutRunner,
    run_args: &RunArgs,
) -> Result<ExecutionResult, Box<dyn Error>> {
    let script_args = run_args.script_args();
    if !script_args.iter().any(|a| a.ends_with(".app")) {
        return Err("No application bundles given".into());
    }

    let result = runner.execute(script_args, Arc::new(CliSink)).await;
    match refine_status(&result) {
        DisplayStatus::Failed => match result.failed_stage {
            Some(stage) => error!("Failed during {}", stage),
            None => error!("Failed"),
        },
        DisplayStatus::CompletedWithErrors => error!("{}", DisplayStatus::CompletedWithErrors),
        status => info!("{}", status),
    }
    Ok(result)
}

/// Handler to sync command
pub async fn do_sync(runner: &ShortcutRunner) -> Result<(), Box<dyn Error>> {
    runner.sync(Arc::new(LogSink)).await?;
    Ok(())
}

/// Handler to status command, prints the report as TOML
pub async fn do_status(runner: &ShortcutRunner) -> Result<(), Box<dyn Error>> {
    let report = runner.status().await;
    print!("{}", toml::to_string_pretty(&report)?);
    Ok(())
}

/// Handler to users command
pub fn do_users(steam_dir: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let steam_dir = match steam_dir {
        Some(dir) => dir.to_path_buf(),
        None => steam::default_steam_dir()?,
    };
    let users = steam::find_users(&steam_dir)?;
    if users.is_empty() {
        info!("No Steam users found in {}", steam_dir.display());
    }
    for user in users {
        println!("{}\t{}", user.id, user.display_name());
    }
    Ok(())
}

/// Handler to clean command
/// Removes the environment (and any parked failed one) so the next run
/// bootstraps again; `all` removes the whole checkout.
pub fn do_clean(config: &RunnerConfig, all: bool) -> Result<(), Box<dyn Error>> {
    let _lock = FileLock::new(&config.lock_path())?;

    let targets = if all {
        vec![config.repository.dir.clone()]
    } else {
        let environment = config.environment_path();
        vec![env::parked_path(&environment), environment]
    };

    for path in targets {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => info!("Removed {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("{} is already removed, nothing to do", path.display());
            }
            Err(err) => return Err(format!("Failed to remove {}: {}", path.display(), err).into()),
        }
    }
    Ok(())
}
