//! Operator-facing progress notices and the end-of-run summary.

use std::io::Write;
use std::time::Duration;

use comfy_table::Table;
use owo_colors::OwoColorize;
use parking_lot::Mutex;

use crate::pipeline::RunSummary;

/// Lifecycle notice for one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Queued {
        id: String,
    },
    Succeeded {
        id: String,
        attempt: u32,
        duration: Duration,
    },
    Failed {
        id: String,
        attempt: u32,
        error: String,
    },
    RetryScheduled {
        id: String,
        next_attempt: u32,
        delay: Duration,
    },
    Abandoned {
        id: String,
        attempts: u32,
        error: String,
    },
}

impl ProgressEvent {
    pub fn id(&self) -> &str {
        match self {
            ProgressEvent::Queued { id }
            | ProgressEvent::Succeeded { id, .. }
            | ProgressEvent::Failed { id, .. }
            | ProgressEvent::RetryScheduled { id, .. }
            | ProgressEvent::Abandoned { id, .. } => id,
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Discards every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }
}

impl ProgressReporter for CollectingReporter {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Timestamped, colored lines on stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    color: bool,
    show_queued: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            show_queued: false,
        }
    }

    pub fn with_queued(mut self, show: bool) -> Self {
        self.show_queued = show;
        self
    }

    /// Render a notice without the timestamp prefix.
    pub fn format_event(&self, event: &ProgressEvent) -> Option<String> {
        let line = match event {
            ProgressEvent::Queued { id } => {
                if !self.show_queued {
                    return None;
                }
                format!("Queued {}", id)
            }
            ProgressEvent::Succeeded { id, duration, .. } => {
                let secs = format!("{:.2}s", duration.as_secs_f64());
                if self.color {
                    format!("Processed {} in {}", id.bold(), secs.green())
                } else {
                    format!("Processed {} in {}", id, secs)
                }
            }
            ProgressEvent::Failed { id, error, .. } => {
                if self.color {
                    format!("Failed to process {}: {}", id.bold(), error.yellow())
                } else {
                    format!("Failed to process {}: {}", id, error)
                }
            }
            ProgressEvent::RetryScheduled {
                id,
                next_attempt,
                delay,
            } => format!(
                "Retrying {} (attempt {}) in {:.1}s",
                id,
                next_attempt,
                delay.as_secs_f64()
            ),
            ProgressEvent::Abandoned {
                id,
                attempts,
                error,
            } => {
                let line = format!("Giving up on {} after {} attempts: {}", id, attempts, error);
                if self.color {
                    line.red().to_string()
                } else {
                    line
                }
            }
        };
        Some(line)
    }
}

impl ProgressReporter for ConsoleReporter {
    fn on_event(&self, event: &ProgressEvent) {
        if let Some(line) = self.format_event(event) {
            let stamp = chrono::Local::now().format("%H:%M:%S");
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "[{}] {}", stamp, line);
        }
    }
}

/// Summary table for a finished run.
pub fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Unit", "Status", "Attempts", "Detail"]);

    for id in &summary.skipped {
        table.add_row(vec![id.as_str(), "skipped", "0", "already processed"]);
    }
    for id in &summary.succeeded {
        let attempts = summary.attempts.get(id).copied().unwrap_or(0).to_string();
        table.add_row(vec![id.clone(), "done".to_string(), attempts, String::new()]);
    }
    for (id, err) in &summary.failed {
        let attempts = summary.attempts.get(id).copied().unwrap_or(0).to_string();
        table.add_row(vec![id.clone(), "failed".to_string(), attempts, err.to_string()]);
    }
    table
}

/// One-line totals printed under the table.
pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{} units: {} done, {} skipped, {} failed, {} dispatch attempts",
        summary.total,
        summary.succeeded.len(),
        summary.skipped.len(),
        summary.failed.len(),
        summary.dispatch_attempts
    )
}
