// jobrunner-plugins: Built-in plugins for the job runner.
// A localhost builder with its local transport, a no-op provisioner, a git
// source and a shell action; enough to run a job on the runner's own machine.

pub mod git_source;
pub mod local;
pub mod shell_action;

use jobrunner_common::{CapabilityRegistry, RunnerSettings};
use jobrunner_sdk::Action;

// Re-exports for convenient access
pub use git_source::GitSource;
pub use local::{LocalTransport, LocalhostBuilder, NoneProvisioner};
pub use shell_action::ShellAction;

/// Register every built-in plugin.
///
/// The no-op provisioner is registered both as `none` and under this
/// machine's distro id so hosts leased from `localhost` resolve it. The local
/// transport runs commands in `settings.work_directory` when it is set.
pub fn register_builtin(registry: &CapabilityRegistry, settings: &RunnerSettings) {
    registry.register_builder(local::BUILDER_NAME, || Box::new(LocalhostBuilder::new()));
    let work_directory = settings.work_directory.clone();
    registry.register_transport(local::TRANSPORT_NAME, move |connect, log_sink| {
        Box::new(LocalTransport::new(connect, log_sink).with_work_directory(work_directory.clone()))
    });

    registry.register_provisioner(local::NONE_PROVISIONER, || Box::new(NoneProvisioner));
    let distro = local::distro();
    if distro != local::NONE_PROVISIONER {
        registry.register_provisioner(distro, || Box::new(NoneProvisioner));
    }

    registry.register_source(git_source::SOURCE_TYPE, || Box::new(GitSource));
    registry.register_action(shell_action::ACTION_NAME, |parameters| {
        let action: Box<dyn Action> = Box::new(ShellAction::from_parameters(parameters)?);
        Ok(action)
    });
}
