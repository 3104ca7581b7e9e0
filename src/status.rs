use std::fmt;

use crate::executor::{Classification, ExecutionResult};

const ERROR_MARKERS: [&str; 2] = ["Error:", "error:"];
const COMPLETION_MARKER: &str = "Successfully created";

/// Receives progress of a running pipeline. Implemented by whatever front end
/// drives the runner; the pipeline itself never prints.
pub trait StatusSink: Send + Sync {
    fn on_progress(&self, message: &str);
    fn on_complete(&self, classification: Classification, text: &str);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn on_progress(&self, _message: &str) {}
    fn on_complete(&self, _classification: Classification, _text: &str) {}
}

/// Sink forwarding progress to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn on_progress(&self, message: &str) {
        log::info!("{}", message);
    }

    fn on_complete(&self, classification: Classification, _text: &str) {
        log::info!("Finished: {}", classification);
    }
}

/// Status shown to a human, derived from a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Failed,
    CompletedWithErrors,
    CreatedSuccessfully,
    CompletedWithWarnings,
    Completed,
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisplayStatus::Failed => "Failed",
            DisplayStatus::CompletedWithErrors => "Completed with errors",
            DisplayStatus::CreatedSuccessfully => "Shortcuts created successfully",
            DisplayStatus::CompletedWithWarnings => "Completed with warnings",
            DisplayStatus::Completed => "Completed",
        };
        f.write_str(text)
    }
}

/// Refines the exit-code classification by looking for marker text in the
/// output. The entry script does not always exit non-zero on logical errors,
/// so an error marker downgrades a success. A failure is never upgraded.
pub fn refine_status(result: &ExecutionResult) -> DisplayStatus {
    if result.classification == Classification::Failure {
        return DisplayStatus::Failed;
    }
    let text = &result.combined_output;
    if ERROR_MARKERS.iter().any(|marker| text.contains(marker)) {
        DisplayStatus::CompletedWithErrors
    } else if text.contains(COMPLETION_MARKER) {
        DisplayStatus::CreatedSuccessfully
    } else if result.classification == Classification::SuccessWithWarnings {
        DisplayStatus::CompletedWithWarnings
    } else {
        DisplayStatus::Completed
    }
}
