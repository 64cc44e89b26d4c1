// HostContext: the process-wide services a job runner is constructed with.
// Built once at startup and passed explicitly to every runner.

use crate::registry::CapabilityRegistry;
use crate::secret_masker::SecretMasker;
use crate::settings::RunnerSettings;
use crate::tracing::{TraceManager, TraceSetting, Tracing};
use std::sync::Arc;

/// Shared services for every job runner in the process.
///
/// Only the [`CapabilityRegistry`] is shared across runners as mutable-ish
/// state (read-mostly after warm-up). Build hosts, transports and contexts
/// are owned per runner and never live here.
pub struct HostContext {
    settings: RunnerSettings,
    registry: Arc<CapabilityRegistry>,

    /// Process-wide secrets. Job secrets go into a
    /// [`job_secret_masker`](Self::job_secret_masker) instead.
    pub secret_masker: Arc<SecretMasker>,

    trace_manager: TraceManager,
}

impl HostContext {
    pub fn new(settings: RunnerSettings, registry: Arc<CapabilityRegistry>) -> Arc<Self> {
        let secret_masker = Arc::new(SecretMasker::new());
        let trace_setting = TraceSetting {
            print_to_stdout: settings.print_log_to_stdout,
            ..TraceSetting::default()
        };
        let trace_manager = TraceManager::new(secret_masker.clone(), trace_setting);

        Arc::new(Self {
            settings,
            registry,
            secret_masker,
            trace_manager,
        })
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Get a named trace source.
    pub fn get_trace(&self, name: &str) -> Tracing {
        self.trace_manager.get(name)
    }

    /// A fresh masker for one job, layered over the process masker.
    pub fn job_secret_masker(&self) -> Arc<SecretMasker> {
        Arc::new(SecretMasker::scoped(self.secret_masker.clone()))
    }

    /// A named trace source masking with a job's masker.
    pub fn get_job_trace(&self, name: &str, job_masker: &Arc<SecretMasker>) -> Tracing {
        self.trace_manager.get_masked(name, job_masker.clone())
    }
}
