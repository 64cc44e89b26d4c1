// jobrunner-sdk: Foundation layer for the job runner.
// This crate has no dependencies on other workspace crates. It defines the
// capability traits plugins implement and the data they exchange with the core.

pub mod build_host;
pub mod capability;
pub mod context;
pub mod errors;
pub mod notifier;
pub mod process_invoker;
pub mod string_util;
pub mod trace;

// Re-export commonly used items at crate root
pub use build_host::{BuildHost, ConnectInfo};
pub use capability::{
    exit_codes, Action, ActionOutcome, Builder, CapabilityKind, Provisioner, Source,
    SourceDescriptor, Transport,
};
pub use context::{to_string_map, Context, InterpolationError, ScalarMap, ScalarValue};
pub use errors::{is_disconnected, DisconnectedError};
pub use notifier::{JobStatus, Notifier};
pub use process_invoker::{OutputStream, ProcessInvoker, ProcessOutput};
pub use string_util::StringUtil;
pub use trace::{CollectingTraceWriter, NullTraceWriter, TraceLevel, TraceWriter, TracingTraceWriter};
