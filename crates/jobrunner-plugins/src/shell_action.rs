// ShellAction: runs one interpolated shell command through the job transport.

use async_trait::async_trait;
use jobrunner_sdk::{exit_codes, Action, ActionOutcome, Context, Notifier, Transport};
use serde::Deserialize;
use std::sync::Arc;

/// Registered name of the shell action.
pub const ACTION_NAME: &str = "shell";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellParameters {
    /// Command line; `%{key}` placeholders are resolved from the job context.
    pub command: String,

    #[serde(default)]
    pub working_directory: Option<String>,
}

pub struct ShellAction {
    parameters: ShellParameters,
    transport: Option<Arc<dyn Transport>>,
    context: Option<Context>,
}

impl ShellAction {
    pub fn new(parameters: ShellParameters) -> Self {
        Self {
            parameters,
            transport: None,
            context: None,
        }
    }

    pub fn from_parameters(parameters: &serde_json::Value) -> anyhow::Result<Self> {
        let parameters = ShellParameters::deserialize(parameters)?;
        Ok(Self::new(parameters))
    }
}

#[async_trait]
impl Action for ShellAction {
    fn prepare(&mut self, transport: Arc<dyn Transport>, context: Context) {
        self.transport = Some(transport);
        self.context = Some(context);
    }

    async fn perform(&mut self, notifier: &dyn Notifier) -> anyhow::Result<ActionOutcome> {
        let (Some(transport), Some(context)) = (&self.transport, &self.context) else {
            anyhow::bail!("shell action performed before prepare");
        };

        let resolved = context.interpolate(&self.parameters.command).and_then(|command| {
            let directory = match self.parameters.working_directory {
                Some(ref dir) => Some(context.interpolate(dir)?),
                None => None,
            };
            Ok((command, directory))
        });
        let (command, directory) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                notifier.write(&format!("Cannot run shell step: {}", e));
                return Ok(ActionOutcome::failed(exit_codes::INTERPOLATION_FAILED));
            }
        };

        notifier.write(&format!("$ {}", command));
        let success = transport.exec(&command, directory.as_deref()).await?;
        let exit_code = transport.exit_code();
        Ok(if success {
            ActionOutcome::succeeded(exit_code)
        } else {
            ActionOutcome::failed(exit_code)
        })
    }
}
