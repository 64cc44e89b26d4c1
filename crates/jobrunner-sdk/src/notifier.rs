use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a job as seen by observers.
///
/// `Waiting → Started → {Failing}* → {Succeeded | Failed}`. `Failing` is not
/// terminal: recovery stages may still bring the job to `Succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Waiting,
    Started,
    Failing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Every non-terminal status may fall straight to `Failed` so that setup
    /// errors can end a job that never started.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Waiting, Started) => true,
            (Started, Failing) | (Started, Succeeded) => true,
            (Failing, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Waiting => "WAITING",
            JobStatus::Started => "STARTED",
            JobStatus::Failing => "FAILING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Sink for job status transitions and the job's append-only log.
///
/// A notifier is owned by whoever asked for the job to run and may be read
/// from other threads while the runner writes to it. Writes must become
/// visible in the order they were made.
pub trait Notifier: Send + Sync {
    fn set_status(&self, status: JobStatus);

    /// Record when the job ended. Called once per job.
    fn set_ended(&self, ended: DateTime<Utc>);

    /// Append one line to the job log.
    fn write(&self, line: &str);
}
