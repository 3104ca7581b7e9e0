pub mod cli;
pub mod config;
pub mod env;
pub mod executor;
pub mod flock;
pub mod git;
pub mod process;
pub mod status;
pub mod steam;

mod api;

pub use api::{ShortcutRunner, ShortcutRunnerBuilder, StatusReport};
