use async_trait::async_trait;
use jobrunner_sdk::{BuildHost, Provisioner, ScalarMap, Transport};

/// Leaves the host as the builder handed it over.
#[derive(Debug, Default)]
pub struct NoneProvisioner;

#[async_trait]
impl Provisioner for NoneProvisioner {
    async fn prepare(
        &self,
        _transport: &dyn Transport,
        host: &BuildHost,
        _environment: &ScalarMap,
    ) -> anyhow::Result<()> {
        tracing::debug!("Nothing to provision on '{}' ({})", host.host, host.distro);
        Ok(())
    }
}
