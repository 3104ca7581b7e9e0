use std::{error::Error, process::ExitCode};

use clap::Parser;
use log::error;

use shortcut_runner::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::{do_clean, do_run, do_status, do_sync, do_users},
    },
    config::RunnerConfig,
    ShortcutRunner,
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, Box<dyn Error>> {
    let cli_args = CliArgs::parse();

    let build_runner = || {
        let mut builder = ShortcutRunner::builder().overrides(cli_args.overrides());
        if let Some(config_file) = &cli_args.config {
            builder = builder.config_file(config_file);
        }
        builder.try_build()
    };

    match &cli_args.cmd {
        Command::Run(run_args) => {
            let result = do_run(&build_runner()?, run_args).await?;
            if result.is_failure() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Sync => do_sync(&build_runner()?).await?,
        Command::Status => do_status(&build_runner()?).await?,
        Command::Users { steam_dir } => do_users(steam_dir.as_deref())?,
        Command::Clean { all } => {
            let config =
                RunnerConfig::load(cli_args.config.as_deref())?.apply(cli_args.overrides())?;
            do_clean(&config, *all)?
        }
    }
    Ok(ExitCode::SUCCESS)
}
