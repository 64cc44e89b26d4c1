// Job-level error taxonomy.
// Setup failures abort the job; step failures are routed through stage edges.

use jobrunner_sdk::CapabilityKind;

/// Everything that can stop a job, or a unit of it, from completing.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A job, stage or action payload was malformed.
    #[error("failed to deserialize {what}")]
    Deserialization {
        what: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("builder '{builder}' did not provide a build host")]
    ResourceAcquisition {
        builder: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no {kind} plugin registered under '{name}'")]
    PluginNotFound { kind: CapabilityKind, name: String },

    #[error("provisioner '{provisioner}' failed to prepare the build host")]
    Provisioning {
        provisioner: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("checkout of '{kind}' sources failed")]
    SourceCheckout {
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no valid transport: host offers [{}] and none are registered", .offered.join(", "))]
    NoValidTransport { offered: Vec<String> },

    #[error("transport '{transport}' failed")]
    Transport {
        transport: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stage '{0}' not found in job definition")]
    StageNotFound(String),

    /// A step reported failure. Recoverable through the stage's `on_failure` edge.
    #[error("step {step} failed with exit code {exit_code}")]
    ActionFailure { step: usize, exit_code: i32 },

    /// Tearing down the lease failed for a reason other than a disconnect.
    #[error("cleanup of build host '{host}' failed")]
    Cleanup {
        host: String,
        #[source]
        source: anyhow::Error,
    },
}

impl JobError {
    pub fn deserialization(what: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        JobError::Deserialization {
            what: what.into(),
            source: source.into(),
        }
    }

    pub fn plugin_not_found(kind: CapabilityKind, name: impl Into<String>) -> Self {
        JobError::PluginNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether this failure happened while setting the job up, before any
    /// stage ran.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            JobError::ResourceAcquisition { .. }
                | JobError::PluginNotFound { .. }
                | JobError::Provisioning { .. }
                | JobError::SourceCheckout { .. }
                | JobError::NoValidTransport { .. }
                | JobError::Transport { .. }
        )
    }

    /// The message followed by every cause, joined with `": "`.
    pub fn describe(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(": ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn messages_name_the_failing_piece() {
        let err = JobError::plugin_not_found(CapabilityKind::Source, "svn");
        assert_eq!(err.to_string(), "no source plugin registered under 'svn'");

        let err = JobError::NoValidTransport {
            offered: vec!["ssh".into(), "winrm".into()],
        };
        assert_eq!(
            err.to_string(),
            "no valid transport: host offers [ssh, winrm] and none are registered"
        );
    }

    #[test]
    fn source_chain_is_preserved() {
        let err = JobError::Provisioning {
            provisioner: "ubuntu".into(),
            source: anyhow::anyhow!("apt-get exited 100"),
        };
        let cause = err.source().map(|s| s.to_string());
        assert_eq!(cause.as_deref(), Some("apt-get exited 100"));
        assert!(err.is_setup_failure());
        assert_eq!(
            err.describe(),
            "provisioner 'ubuntu' failed to prepare the build host: apt-get exited 100"
        );
    }

    #[test]
    fn stage_errors_are_not_setup_failures() {
        assert!(!JobError::StageNotFound("build".into()).is_setup_failure());
        assert!(!JobError::ActionFailure { step: 0, exit_code: 2 }.is_setup_failure());
    }
}
