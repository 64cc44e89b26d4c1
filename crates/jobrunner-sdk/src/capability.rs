// Capability traits: the plugin contracts the job runner consumes.
// Every plugin implements exactly one of these and is registered by name.

use crate::build_host::BuildHost;
use crate::context::{Context, ScalarMap};
use crate::notifier::Notifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Exit codes reported by steps that never reached a remote process.
pub mod exit_codes {
    /// The action returned an error instead of an outcome.
    pub const ACTION_ERROR: i32 = -1;
    /// A `%{key}` placeholder could not be resolved against the context.
    pub const INTERPOLATION_FAILED: i32 = -2;
    /// The step's action descriptor could not be deserialized.
    pub const INVALID_DESCRIPTOR: i32 = -3;
}

/// The kinds of plugin the runner can resolve by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKind {
    Builder,
    Transport,
    Provisioner,
    Source,
    Action,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityKind::Builder => "builder",
            CapabilityKind::Transport => "transport",
            CapabilityKind::Provisioner => "provisioner",
            CapabilityKind::Source => "source",
            CapabilityKind::Action => "action",
        };
        f.write_str(s)
    }
}

/// Acquires and releases build host leases from some provider.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Lease a host. `Ok(None)` means the provider had nothing to hand out.
    ///
    /// Implementations must not return a partially populated host: provider
    /// errors and timeouts are returned as `Err`.
    async fn get(&self, args: &ScalarMap) -> anyhow::Result<Option<BuildHost>>;

    /// Give a host back to the provider.
    ///
    /// Must tolerate a transport that is already closed (or never opened) and
    /// a host that was never fully provisioned. A host that is already gone
    /// should be logged and reported as [`DisconnectedError`](crate::DisconnectedError)
    /// or `Ok(())`, never as a hard failure.
    async fn release(&self, transport: Option<&dyn Transport>, host: &BuildHost)
        -> anyhow::Result<()>;
}

/// A command-execution channel bound to one build host.
///
/// Transports are shared between the runner and the actions of a job, so all
/// methods take `&self` and implementations keep their own interior state.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registered name of this transport kind.
    fn name(&self) -> &str;

    /// Open the channel. Called once, before any command.
    async fn open(&self) -> anyhow::Result<()>;

    /// Run `command`, optionally in `working_directory`. Returns whether the
    /// command exited successfully; the code is available from [`exit_code`](Self::exit_code).
    async fn exec(&self, command: &str, working_directory: Option<&str>) -> anyhow::Result<bool>;

    /// Exit code of the last command run through [`exec`](Self::exec).
    fn exit_code(&self) -> i32;

    /// Make `environment` visible to every later command.
    async fn export_env(&self, environment: &HashMap<String, String>) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Prepares a freshly leased host (packages, users, OS state).
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn prepare(
        &self,
        transport: &dyn Transport,
        host: &BuildHost,
        environment: &ScalarMap,
    ) -> anyhow::Result<()>;
}

/// One entry of a job's `sources` list.
///
/// `type` names the source plugin; every other field is handed to that
/// plugin untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl SourceDescriptor {
    /// Look up a string field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// Checks out one kind of source onto the build host.
#[async_trait]
pub trait Source: Send + Sync {
    /// Check out every source of this plugin's type in one call so the
    /// plugin can batch its own network operations.
    async fn checkout(
        &self,
        transport: &dyn Transport,
        context: &Context,
        sources: &[SourceDescriptor],
    ) -> anyhow::Result<bool>;
}

/// Result of performing one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub exit_code: i32,
}

impl ActionOutcome {
    pub fn succeeded(exit_code: i32) -> Self {
        Self {
            success: true,
            exit_code,
        }
    }

    pub fn failed(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// A unit of work executed on the build host through the transport.
#[async_trait]
pub trait Action: Send + Sync {
    /// Bind the action to the job's transport and context.
    fn prepare(&mut self, transport: Arc<dyn Transport>, context: Context);

    /// Do the work. Output belongs in `notifier`.
    ///
    /// Expected failures (non-zero exits, unresolved placeholders) are
    /// reported through the outcome; `Err` is reserved for the action itself
    /// breaking.
    async fn perform(&mut self, notifier: &dyn Notifier) -> anyhow::Result<ActionOutcome>;
}
