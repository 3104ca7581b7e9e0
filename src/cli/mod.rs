use log::{info, warn};

use crate::{executor::Classification, status::StatusSink};

pub mod args;
pub mod command_handlers;

/// Progress goes to the log, the tool's own output to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliSink;

impl StatusSink for CliSink {
    fn on_progress(&self, message: &str) {
        info!("{}", message);
    }

    fn on_complete(&self, classification: Classification, text: &str) {
        if !text.is_empty() {
            println!("{}", text);
        }
        if classification != Classification::Success {
            warn!("Finished with {}", classification);
        }
    }
}
