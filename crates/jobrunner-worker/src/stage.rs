// Stage, Step and ActionDescriptor: the per-stage records stored under a
// job's `stages` map. Deserialized lazily, one stage at a time.

use jobrunner_common::JobError;
use jobrunner_sdk::ScalarValue;
use serde::{Deserialize, Deserializer, Serialize};

/// A node of the stage graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "scalar_as_string")]
    pub version: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    /// Stage to run after every step succeeded. `None` ends the walk.
    #[serde(default)]
    pub on_success: Option<String>,

    /// Stage to run after a step failed. `None` ends the walk failed.
    #[serde(default)]
    pub on_failure: Option<String>,
}

impl Stage {
    /// Deserialize a stage from its stored payload.
    pub fn from_value(id: &str, payload: &serde_json::Value) -> Result<Self, JobError> {
        Stage::deserialize(payload).map_err(|e| JobError::deserialization(format!("stage '{id}'"), e))
    }
}

/// One step of a stage. The action descriptor is kept raw and parsed right
/// before the step runs, so a malformed step fails its stage rather than the
/// whole job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: serde_json::Value,
}

impl Step {
    pub fn descriptor(&self) -> Result<ActionDescriptor, serde_json::Error> {
        ActionDescriptor::deserialize(&self.action)
    }
}

/// Names the action capability and carries its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(alias = "type")]
    pub name: String,

    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Accepts `"1.2"`, `3` or `true` for free-form version/id fields.
pub(crate) fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<ScalarValue>::deserialize(deserializer)?;
    Ok(value.map(|v| v.to_string()).unwrap_or_default())
}
