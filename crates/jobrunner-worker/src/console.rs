// ConsoleNotifier: echoes a job log to the terminal as it is written.

use chrono::{DateTime, Utc};
use jobrunner_common::JobLog;
use jobrunner_sdk::{JobStatus, Notifier};
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleColor {
    Red,
    Green,
    Yellow,
    Default,
}

impl ConsoleColor {
    fn ansi_code(self) -> &'static str {
        match self {
            ConsoleColor::Red => "\x1b[31m",
            ConsoleColor::Green => "\x1b[32m",
            ConsoleColor::Yellow => "\x1b[33m",
            ConsoleColor::Default => "",
        }
    }

    fn for_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Succeeded => ConsoleColor::Green,
            JobStatus::Failing => ConsoleColor::Yellow,
            JobStatus::Failed => ConsoleColor::Red,
            JobStatus::Waiting | JobStatus::Started => ConsoleColor::Default,
        }
    }
}

/// Records into a [`JobLog`] and prints every new line to stdout.
pub struct ConsoleNotifier {
    log: Arc<JobLog>,
    color: bool,
}

impl ConsoleNotifier {
    pub fn new(log: Arc<JobLog>, color: bool) -> Self {
        Self { log, color }
    }

    pub fn log(&self) -> &Arc<JobLog> {
        &self.log
    }

    fn print(&self, line: &str, color: ConsoleColor) {
        let mut out = io::stdout().lock();
        let result = if self.color && color != ConsoleColor::Default {
            writeln!(out, "{}{}\x1b[0m", color.ansi_code(), line)
        } else {
            writeln!(out, "{}", line)
        };
        if let Err(e) = result {
            tracing::debug!("Failed to write to stdout: {}", e);
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn set_status(&self, status: JobStatus) {
        self.log.set_status(status);
        if self.log.status() == Some(status) {
            self.print(&format!("==> {}", status), ConsoleColor::for_status(status));
        }
    }

    fn set_ended(&self, ended: DateTime<Utc>) {
        self.log.set_ended(ended);
    }

    fn write(&self, line: &str) {
        // Print exactly what was recorded, timestamp included.
        let offset = self.log.line_count();
        self.log.write(line);
        for recorded in self.log.lines_since(offset) {
            self.print(&recorded, ConsoleColor::Default);
        }
    }
}
