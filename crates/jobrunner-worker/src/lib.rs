// jobrunner-worker: Job execution engine.
// Depends on `jobrunner-sdk` and `jobrunner-common`.
//
// Architecture:
//   JobRunner::start → BuildLease::acquire → BuildLease::open_transport
//     → Provisioner::prepare → checkout_sources
//   JobRunner::run → StageRunner::run → per-step Action::perform
//     → BuildLease::release

pub mod console;
pub mod job;
pub mod job_runner;
pub mod lease;
pub mod source_checkout;
pub mod stage;
pub mod stage_runner;

#[cfg(test)]
pub(crate) mod test_support;

pub use job::JobDefinition;
pub use job_runner::JobRunner;
pub use lease::{negotiate_transport, BuildLease};
pub use stage::{ActionDescriptor, Stage, Step};
pub use stage_runner::{StageResult, StageRunner};
