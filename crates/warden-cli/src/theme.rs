//! Terminal styling for human-readable output.
//!
//! `colored` turns itself off when stdout is not a terminal or `NO_COLOR`
//! is set, so machine consumers should still prefer `--json`.

use colored::Colorize;
use warden_core::ExecutionStatus;

pub(crate) struct Theme;

impl Theme {
    pub(crate) fn header(text: &str) -> String {
        text.bold().cyan().to_string()
    }

    pub(crate) fn success(text: &str) -> String {
        format!("{} {text}", "ok".green().bold())
    }

    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "error".red().bold(), text.red())
    }

    pub(crate) fn info(text: &str) -> String {
        format!("{} {text}", "::".blue())
    }

    pub(crate) fn separator() -> String {
        "─".repeat(72).dimmed().to_string()
    }

    /// Status colored by outcome class: green executed cleanly, yellow
    /// refused before execution, red anything that went wrong.
    pub(crate) fn status(status: ExecutionStatus) -> String {
        let text = status.as_str();
        match status {
            ExecutionStatus::Completed => text.green().to_string(),
            ExecutionStatus::Denied | ExecutionStatus::Rejected => text.yellow().to_string(),
            ExecutionStatus::InternalError => text.red().bold().to_string(),
            ExecutionStatus::TimedOut
            | ExecutionStatus::Failed
            | ExecutionStatus::Cancelled
            | ExecutionStatus::Backpressure => text.red().to_string(),
        }
    }
}
