use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::warn;

use crate::config::ConfigOverrides;

/// Keeps the VDF shortcut tool up to date and runs it.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Configuration file, defaults to config.toml in the application data directory
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Local checkout of the tool repository
    #[clap(long, global = true)]
    pub repo_dir: Option<PathBuf>,
    /// Remote to clone the tool from
    #[clap(long, global = true)]
    pub repo_url: Option<String>,
    /// Branch to track
    #[clap(long, global = true)]
    pub branch: Option<String>,
    /// Host Python interpreter used to create the environment
    #[clap(long, global = true)]
    pub python: Option<PathBuf>,
}

impl CliArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            repository_dir: self.repo_dir.clone(),
            repository_url: self.repo_url.clone(),
            branch: self.branch.clone(),
            interpreter: self.python.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    ///Syncs the tool, prepares its environment and creates Steam shortcuts for the given apps
    Run(RunArgs),
    ///Clones or updates the tool repository only
    Sync,
    ///Shows the state of the checkout and its environment
    Status,
    ///Lists Steam users found on this machine
    Users {
        /// Steam data directory
        #[clap(long)]
        steam_dir: Option<PathBuf>,
    },
    ///Removes the environment so the next run recreates it
    Clean {
        /// Remove the whole checkout as well
        #[clap(long)]
        all: bool,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Application bundles to add to Steam
    #[clap(required = true)]
    pub apps: Vec<String>,
    /// Steam user id, defaults to the tool's own choice
    #[clap(short, long)]
    pub user: Option<String>,
    /// Icon size in pixels
    #[clap(short, long, default_value_t = 128, value_parser = clap::value_parser!(u32).range(64..=512))]
    pub size: u32,
    /// Overwrite existing shortcuts
    #[clap(long)]
    pub overwrite: bool,
    /// Create a new shortcuts.vdf file
    #[clap(long)]
    pub new_vdf: bool,
    /// Leave Steam's HTTP cache alone
    #[clap(long)]
    pub keep_cache: bool,
    /// Ask the tool for debug output
    #[clap(long)]
    pub debug: bool,
}

impl RunArgs {
    /// Argument vector for the entry script, in the order it documents.
    pub fn script_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        for app in &self.apps {
            if !app.trim_end_matches('/').ends_with(".app") {
                warn!("Skipping {}, not an application bundle", app);
                continue;
            }
            if !args.contains(app) {
                args.push(app.clone());
            }
        }

        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            args.push("--user".to_owned());
            args.push(user.to_owned());
        }
        args.push("--size".to_owned());
        args.push(self.size.to_string());
        if self.overwrite {
            args.push("--overwrite".to_owned());
        }
        if self.new_vdf {
            args.push("--new-vdf".to_owned());
        }
        if !self.keep_cache {
            args.push("--clear-cache".to_owned());
        }
        if self.debug {
            args.push("--debug".to_owned());
        }
        args
    }
}
