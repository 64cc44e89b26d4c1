// Plugins that run jobs on the machine the runner itself lives on.

pub mod builder;
pub mod provisioner;
pub mod transport;

pub use builder::LocalhostBuilder;
pub use provisioner::NoneProvisioner;
pub use transport::LocalTransport;

/// Registered name of the localhost builder.
pub const BUILDER_NAME: &str = "localhost";

/// Registered name of the local transport.
pub const TRANSPORT_NAME: &str = "local";

/// Registered name of the provisioner that leaves a host untouched.
pub const NONE_PROVISIONER: &str = "none";

/// Distro id of this machine (`ubuntu`, `fedora`, `macos`, ...), used as the
/// leased host's distro so provisioners resolve against it.
pub fn distro() -> String {
    let id = sysinfo::System::distribution_id();
    if id.trim().is_empty() {
        std::env::consts::OS.to_string()
    } else {
        id.trim().to_ascii_lowercase()
    }
}
