// StageRunner: walks the stage graph of one job and dispatches each step to
// its action plugin.
//
// Cycles in the graph are legal and not detected; a job whose edges loop
// forever runs forever.

use jobrunner_common::{CapabilityRegistry, JobError, Tracing};
use jobrunner_sdk::{exit_codes, ActionOutcome, Context, JobStatus, Notifier, TraceWriter, Transport};
use std::sync::Arc;

use crate::job::JobDefinition;
use crate::job_runner::transition;
use crate::stage::{Stage, Step};

/// How a single stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageResult {
    pub success: bool,
    pub exit_code: i32,
    /// 1-based index of the step that failed.
    pub failed_step: Option<usize>,
}

/// Executes stages against an open transport.
pub struct StageRunner<'a> {
    registry: &'a CapabilityRegistry,
    transport: Arc<dyn Transport>,
    context: Context,
    notifier: Arc<dyn Notifier>,
    trace: Tracing,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        registry: &'a CapabilityRegistry,
        transport: Arc<dyn Transport>,
        context: Context,
        notifier: Arc<dyn Notifier>,
        trace: Tracing,
    ) -> Self {
        Self {
            registry,
            transport,
            context,
            notifier,
            trace,
        }
    }

    /// Walk the graph from the job's initial stage.
    ///
    /// Returns `Ok(true)` when the last edge taken was not a failure edge.
    /// An unknown stage id, a malformed stage or an unregistered action aborts
    /// the walk with an error.
    pub async fn run(&self, job: &JobDefinition) -> Result<bool, JobError> {
        let mut current = job.initial_stage().map(str::to_string);
        let mut failing = false;

        if current.is_none() {
            self.notifier.write("Job has no stages to run");
        }

        while let Some(stage_id) = current.take() {
            let stage = job.stage(&stage_id)?;
            let label = stage_label(&stage);
            self.notifier.write(&format!("Starting stage {}", label));

            let result = self.run_stage(&stage).await?;
            if result.success {
                self.notifier.write(&format!(
                    "Stage {} succeeded with exit code {}",
                    label, result.exit_code
                ));
                if stage.on_success.is_some() {
                    failing = false;
                }
                current = stage.on_success;
            } else {
                let failure = JobError::ActionFailure {
                    step: result.failed_step.unwrap_or_default(),
                    exit_code: result.exit_code,
                };
                self.notifier.write(&format!("Stage {} failed: {}", label, failure));
                failing = true;
                if let Some(ref next) = stage.on_failure {
                    self.trace.info(&format!("Stage '{}' failed, continuing with '{}'", stage_id, next));
                    transition(self.notifier.as_ref(), JobStatus::Failing);
                }
                current = stage.on_failure;
            }
        }

        Ok(!failing)
    }

    /// Run the steps of `stage` in order until one fails.
    pub async fn run_stage(&self, stage: &Stage) -> Result<StageResult, JobError> {
        let mut exit_code = 0;
        for (index, step) in stage.steps.iter().enumerate() {
            let number = index + 1;
            let outcome = self.run_step(number, step).await?;
            exit_code = outcome.exit_code;
            if !outcome.success {
                return Ok(StageResult {
                    success: false,
                    exit_code,
                    failed_step: Some(number),
                });
            }
        }
        Ok(StageResult {
            success: true,
            exit_code,
            failed_step: None,
        })
    }

    /// Resolve, prepare and perform one step.
    ///
    /// Only an unregistered action is an error; every other problem becomes
    /// a failed outcome so it can be routed through the stage's edges.
    async fn run_step(&self, number: usize, step: &Step) -> Result<ActionOutcome, JobError> {
        let descriptor = match step.descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.notifier.write(&format!("Step {}: invalid action descriptor: {}", number, e));
                return Ok(ActionOutcome::failed(exit_codes::INVALID_DESCRIPTOR));
            }
        };

        let mut action = match self.registry.action(&descriptor.name, &descriptor.parameters) {
            Ok(action) => action,
            Err(err @ JobError::PluginNotFound { .. }) => return Err(err),
            Err(e) => {
                self.notifier.write(&format!("Step {}: {}", number, e.describe()));
                return Ok(ActionOutcome::failed(exit_codes::INVALID_DESCRIPTOR));
            }
        };

        self.trace.verbose(&format!("Step {}: performing action '{}'", number, descriptor.name));
        action.prepare(self.transport.clone(), self.context.clone());
        let outcome = match action.perform(self.notifier.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.notifier.write(&format!("Step {}: action '{}' errored: {:#}", number, descriptor.name, e));
                ActionOutcome::failed(exit_codes::ACTION_ERROR)
            }
        };

        self.notifier.write(&format!(
            "Step {}: action '{}' {} with exit code {}",
            number,
            descriptor.name,
            if outcome.success { "succeeded" } else { "failed" },
            outcome.exit_code
        ));
        Ok(outcome)
    }
}

/// `'name' (version v)`, or just `'name'` for an unversioned stage.
fn stage_label(stage: &Stage) -> String {
    if stage.version.is_empty() {
        format!("'{}'", stage.name)
    } else {
        format!("'{}' (version {})", stage.name, stage.version)
    }
}
