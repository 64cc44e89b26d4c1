// jobrunner-common: Shared services for the job runner.
// Depends on `jobrunner-sdk`; used by the worker and by embedders.

pub mod constants;
pub mod errors;
pub mod host_context;
pub mod job_log;
pub mod logging;
pub mod registry;
pub mod secret_masker;
pub mod settings;
pub mod tracing;

// ---------------------------------------------------------------------------
// Re-exports for convenient access
// ---------------------------------------------------------------------------

pub use errors::JobError;
pub use host_context::HostContext;
pub use job_log::{JobLog, MaskingNotifier};
pub use logging::PagingLogger;
pub use registry::{
    ActionFactory, BuilderFactory, CapabilityRegistry, PluginFactory, ProvisionerFactory,
    SourceFactory, TransportFactory,
};
pub use secret_masker::SecretMasker;
pub use settings::RunnerSettings;
pub use crate::tracing::{TraceEventType, TraceManager, TraceSetting, Tracing};
