// JobLog: the in-memory Notifier handed to a job runner, plus the masking
// wrapper the runner puts in front of whatever notifier it was given.

use crate::logging::PagingLogger;
use crate::secret_masker::SecretMasker;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use jobrunner_sdk::{JobStatus, Notifier};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;

#[derive(Default)]
struct JobLogState {
    status: Option<JobStatus>,
    ended: Option<DateTime<Utc>>,
    lines: Vec<String>,
}

/// Status, end time and timestamped log lines of one job.
///
/// Readers may call [`status`](Self::status) or tail with
/// [`lines_since`](Self::lines_since) while the runner is writing. Lines are
/// never removed. When built with [`with_pages`](Self::with_pages) every line
/// is also mirrored to page files on disk.
pub struct JobLog {
    job_id: String,
    state: RwLock<JobLogState>,
    pages: Option<Mutex<PagingLogger>>,
}

impl JobLog {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: RwLock::new(JobLogState::default()),
            pages: None,
        }
    }

    pub fn with_pages(job_id: impl Into<String>, log_directory: &Path) -> Result<Self> {
        let job_id = job_id.into();
        let pages = PagingLogger::new(log_directory, job_id.clone())?;
        Ok(Self {
            job_id,
            state: RwLock::new(JobLogState::default()),
            pages: Some(Mutex::new(pages)),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.state.read().status
    }

    pub fn ended(&self) -> Option<DateTime<Utc>> {
        self.state.read().ended
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.read().lines.clone()
    }

    /// Lines appended at or after `offset`, for tailing.
    pub fn lines_since(&self, offset: usize) -> Vec<String> {
        let state = self.state.read();
        state.lines.get(offset..).map(<[String]>::to_vec).unwrap_or_default()
    }

    pub fn line_count(&self) -> usize {
        self.state.read().lines.len()
    }

    /// Flush and close the current on-disk page, if any.
    pub fn end_pages(&self) {
        if let Some(ref pages) = self.pages {
            pages.lock().end();
        }
    }
}

impl Notifier for JobLog {
    /// Repeating the current status is a no-op; transitions the status
    /// machine does not allow are dropped with a warning.
    fn set_status(&self, status: JobStatus) {
        let mut state = self.state.write();
        match state.status {
            Some(current) if current == status => {}
            Some(current) if !current.can_transition_to(status) => {
                tracing::warn!(job = %self.job_id, %current, next = %status, "ignoring invalid status transition");
            }
            _ => state.status = Some(status),
        }
    }

    fn set_ended(&self, ended: DateTime<Utc>) {
        let mut state = self.state.write();
        if state.ended.is_some() {
            tracing::warn!(job = %self.job_id, "ended timestamp already set");
            return;
        }
        state.ended = Some(ended);
    }

    fn write(&self, line: &str) {
        let stamped = format!(
            "{} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            line
        );
        // Page writes happen under the state lock so disk order matches memory order.
        let mut state = self.state.write();
        if let Some(ref pages) = self.pages {
            pages.lock().write(&stamped);
        }
        state.lines.push(stamped);
    }
}

/// Forwards to another notifier, masking registered secrets in every line.
pub struct MaskingNotifier {
    inner: Arc<dyn Notifier>,
    secret_masker: Arc<SecretMasker>,
}

impl MaskingNotifier {
    pub fn new(inner: Arc<dyn Notifier>, secret_masker: Arc<SecretMasker>) -> Self {
        Self {
            inner,
            secret_masker,
        }
    }
}

impl Notifier for MaskingNotifier {
    fn set_status(&self, status: JobStatus) {
        self.inner.set_status(status);
    }

    fn set_ended(&self, ended: DateTime<Utc>) {
        self.inner.set_ended(ended);
    }

    fn write(&self, line: &str) {
        self.inner.write(&self.secret_masker.mask_secrets(line));
    }
}
