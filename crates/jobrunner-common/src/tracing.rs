// Per-component trace sources that mask secrets before reaching `tracing`.

use crate::secret_masker::SecretMasker;
use chrono::{DateTime, SecondsFormat, Utc};
use jobrunner_sdk::TraceWriter;
use std::sync::Arc;

/// Trace severity, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceEventType {
    Verbose,
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct TraceSetting {
    /// Minimum severity to emit.
    pub level: TraceEventType,
    /// Echo every emitted line to stdout as well.
    pub print_to_stdout: bool,
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self {
            level: TraceEventType::Verbose,
            print_to_stdout: false,
        }
    }
}

/// A named trace source. Every component of the runner gets its own, and all
/// of them share the process `SecretMasker`.
#[derive(Clone)]
pub struct Tracing {
    name: String,
    secret_masker: Arc<SecretMasker>,
    setting: TraceSetting,
}

impl Tracing {
    pub fn new(
        name: impl Into<String>,
        secret_masker: Arc<SecretMasker>,
        setting: TraceSetting,
    ) -> Self {
        Self {
            name: name.into(),
            secret_masker,
            setting,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn trace(&self, event_type: TraceEventType, message: &str) {
        if event_type < self.setting.level {
            return;
        }

        let masked = self.secret_masker.mask_secrets(message);
        let formatted = format_line(Utc::now(), &self.name, &masked);
        let component = self.name.as_str();
        match event_type {
            TraceEventType::Error => tracing::error!(component, "{}", formatted),
            TraceEventType::Warning => tracing::warn!(component, "{}", formatted),
            TraceEventType::Information => tracing::info!(component, "{}", formatted),
            TraceEventType::Verbose => tracing::debug!(component, "{}", formatted),
        }

        if self.setting.print_to_stdout {
            println!("{}", formatted);
        }
    }
}

/// `[2024-05-01T10:00:00.123Z][JobRunner] message`
fn format_line(timestamp: DateTime<Utc>, component: &str, message: &str) -> String {
    format!(
        "[{}][{}] {}",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        component,
        message
    )
}

impl TraceWriter for Tracing {
    fn info(&self, message: &str) {
        self.trace(TraceEventType::Information, message);
    }

    fn verbose(&self, message: &str) {
        self.trace(TraceEventType::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.trace(TraceEventType::Warning, message);
    }

    fn error(&self, message: &str) {
        self.trace(TraceEventType::Error, message);
    }
}

/// Hands out named [`Tracing`] sources sharing one masker and setting.
pub struct TraceManager {
    secret_masker: Arc<SecretMasker>,
    setting: TraceSetting,
}

impl TraceManager {
    pub fn new(secret_masker: Arc<SecretMasker>, setting: TraceSetting) -> Self {
        Self {
            secret_masker,
            setting,
        }
    }

    pub fn get(&self, name: &str) -> Tracing {
        Tracing::new(name, self.secret_masker.clone(), self.setting.clone())
    }

    /// A trace source that masks with `secret_masker` instead of the
    /// manager's own, typically a masker scoped to one job.
    pub fn get_masked(&self, name: &str, secret_masker: Arc<SecretMasker>) -> Tracing {
        Tracing::new(name, secret_masker, self.setting.clone())
    }

    pub fn secret_masker(&self) -> &Arc<SecretMasker> {
        &self.secret_masker
    }
}
