// JobDefinition: the immutable job record handed to a runner.

use crate::stage::{scalar_as_string, Stage};
use jobrunner_common::JobError;
use jobrunner_sdk::{ScalarMap, SourceDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A job as received from the scheduler.
///
/// Scalar maps reject nested values at deserialization time. Stages stay raw
/// until the walker reaches them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "scalar_as_string")]
    pub version: String,

    #[serde(default, deserialize_with = "scalar_as_string")]
    pub organization: String,

    /// Passed to the builder and provisioner and exported on the transport.
    #[serde(default)]
    pub environment: ScalarMap,

    /// Merged into the context and masked in every log line.
    #[serde(default)]
    pub secrets: ScalarMap,

    #[serde(default)]
    pub context: ScalarMap,

    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,

    #[serde(default)]
    pub stages: HashMap<String, serde_json::Value>,

    /// Initial stage ids. Only the first one is walked.
    #[serde(default)]
    pub sequence: Vec<String>,
}

impl JobDefinition {
    pub fn from_json(payload: &str) -> Result<Self, JobError> {
        serde_json::from_str(payload).map_err(|e| JobError::deserialization("job definition", e))
    }

    pub fn from_yaml(payload: &str) -> Result<Self, JobError> {
        serde_yaml::from_str(payload).map_err(|e| JobError::deserialization("job definition", e))
    }

    pub fn initial_stage(&self) -> Option<&str> {
        self.sequence.first().map(String::as_str)
    }

    /// Look up and deserialize the stage stored under `id`.
    pub fn stage(&self, id: &str) -> Result<Stage, JobError> {
        let payload = self
            .stages
            .get(id)
            .ok_or_else(|| JobError::StageNotFound(id.to_string()))?;
        Stage::from_value(id, payload)
    }
}
