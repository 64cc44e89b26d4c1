// LocalhostBuilder: leases the local machine as a build host.

use async_trait::async_trait;
use jobrunner_sdk::{BuildHost, Builder, ScalarMap, ScalarValue, Transport};
use sysinfo::System;

use super::TRANSPORT_NAME;

/// Hands out the runner's own machine. There is exactly one such host and
/// releasing it is a no-op, so every `get` succeeds.
#[derive(Debug, Default)]
pub struct LocalhostBuilder;

impl LocalhostBuilder {
    pub fn new() -> Self {
        Self
    }

    fn describe_host() -> BuildHost {
        let mut host = BuildHost::new(System::host_name().unwrap_or_else(|| "localhost".to_string()));
        host.username = std::env::var("USER").ok().filter(|u| !u.is_empty());
        host.distro = super::distro();
        host.release = System::os_version().unwrap_or_default();
        host.transports = vec![TRANSPORT_NAME.to_string()];
        host.identifiers
            .insert("pid".to_string(), std::process::id().to_string());

        host.facts.insert(
            "build_host_arch".to_string(),
            ScalarValue::from(std::env::consts::ARCH),
        );
        host.facts.insert(
            "build_host_os".to_string(),
            ScalarValue::from(std::env::consts::OS),
        );
        if let Some(kernel) = System::kernel_version() {
            host.facts.insert("build_host_kernel".to_string(), ScalarValue::from(kernel));
        }
        host
    }
}

#[async_trait]
impl Builder for LocalhostBuilder {
    async fn get(&self, _args: &ScalarMap) -> anyhow::Result<Option<BuildHost>> {
        let host = Self::describe_host();
        tracing::debug!("Leasing local machine {:?}", host);
        Ok(Some(host))
    }

    async fn release(&self, _transport: Option<&dyn Transport>, host: &BuildHost) -> anyhow::Result<()> {
        tracing::debug!("Released local machine '{}'", host.host);
        Ok(())
    }
}
