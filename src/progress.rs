//! Terminal rendering of apply progress

use anyhow::Result;
use colored::Colorize;
use configset::{ConfigurationChange, ProgressSink, ResultInformation, SetState, UnitState};

/// Prints one line per finished unit
pub struct TerminalProgress {
    verbose: bool,
}

impl TerminalProgress {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn render(&self, change: &ConfigurationChange) -> Option<String> {
        match change {
            ConfigurationChange::SetState(SetState::InProgress) => {
                Some(format!("  {} Applying...", "→".cyan()))
            }
            ConfigurationChange::SetState(_) => None,
            ConfigurationChange::UnitState {
                state,
                unit,
                result_information,
            } => match state {
                UnitState::InProgress if self.verbose => {
                    Some(format!("    {} {}", "…".dimmed(), unit))
                }
                UnitState::Completed if result_information.succeeded() => {
                    Some(format!("    {} {}", "✓".green(), unit))
                }
                UnitState::Completed => Some(format!(
                    "    {} {} {}",
                    "✗".red(),
                    unit,
                    reason(result_information).dimmed()
                )),
                UnitState::Skipped => Some(format!(
                    "    {} {} {}",
                    "⊘".yellow(),
                    unit,
                    reason(result_information).dimmed()
                )),
                _ => None,
            },
        }
    }
}

/// Short human-readable reason for a result
pub fn reason(info: &ResultInformation) -> String {
    let mut text = match (&info.error, info.description.is_empty()) {
        (_, false) => info.description.clone(),
        (Some(error), true) => error.to_string(),
        (None, true) => String::new(),
    };
    if !info.details.is_empty() {
        text.push_str(&format!(" ({})", info.details));
    }
    text
}

impl ProgressSink for TerminalProgress {
    fn on_change(&mut self, change: &ConfigurationChange) -> Result<()> {
        if let Some(line) = self.render(change) {
            println!("{line}");
        }
        Ok(())
    }
}
