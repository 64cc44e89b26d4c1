// BuildLease: one build host leased from a builder, plus the transport opened
// to it. Owns teardown so that each resource is given back at most once.

use jobrunner_common::{CapabilityRegistry, HostContext, JobError, Tracing};
use jobrunner_sdk::{
    is_disconnected, BuildHost, Builder, CapabilityKind, Notifier, ScalarMap, TraceWriter, Transport,
};
use std::sync::Arc;

/// Pick the transport for `host`: the first name in the host's preference
/// list that has a registered plugin. Later names are not considered.
pub fn negotiate_transport(registry: &CapabilityRegistry, host: &BuildHost) -> Result<String, JobError> {
    host.transports()
        .iter()
        .find(|name| registry.contains(CapabilityKind::Transport, name))
        .cloned()
        .ok_or_else(|| JobError::NoValidTransport {
            offered: host.transports().to_vec(),
        })
}

pub struct BuildLease {
    builder_name: String,
    builder: Box<dyn Builder>,
    host: BuildHost,
    transport: Option<Arc<dyn Transport>>,
    released: bool,
    trace: Tracing,
}

impl BuildLease {
    /// Resolve `builder_name` and ask it for a host.
    ///
    /// Nothing needs releasing when this fails: a lease exists only once the
    /// builder has handed over a host.
    pub async fn acquire(
        host_context: &HostContext,
        builder_name: &str,
        args: &ScalarMap,
    ) -> Result<Self, JobError> {
        let trace = host_context.get_trace("BuildLease");
        let builder = host_context.registry().builder(builder_name)?;

        trace.info(&format!("Requesting build host from builder '{}'", builder_name));
        let host = match builder.get(args).await {
            Ok(Some(host)) => host,
            Ok(None) => {
                return Err(JobError::ResourceAcquisition {
                    builder: builder_name.to_string(),
                    source: anyhow::anyhow!("no build host available"),
                })
            }
            Err(e) => {
                return Err(JobError::ResourceAcquisition {
                    builder: builder_name.to_string(),
                    source: e,
                })
            }
        };
        trace.info(&format!("Leased build host '{}' ({} {})", host.host, host.distro, host.release));

        Ok(Self {
            builder_name: builder_name.to_string(),
            builder,
            host,
            transport: None,
            released: false,
            trace,
        })
    }

    pub fn host(&self) -> &BuildHost {
        &self.host
    }

    pub fn builder_name(&self) -> &str {
        &self.builder_name
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// Negotiate, construct and open the transport, with `log_sink` as its
    /// output sink.
    ///
    /// The transport is kept (and later closed) only when `open` succeeded.
    pub async fn open_transport(
        &mut self,
        registry: &CapabilityRegistry,
        log_sink: Arc<dyn Notifier>,
    ) -> Result<Arc<dyn Transport>, JobError> {
        if let Some(ref transport) = self.transport {
            return Ok(transport.clone());
        }

        let name = negotiate_transport(registry, &self.host)?;
        let transport: Arc<dyn Transport> =
            Arc::from(registry.transport(&name, self.host.connect_info(), log_sink)?);

        self.trace.info(&format!("Opening '{}' transport to '{}'", name, self.host.host));
        transport.open().await.map_err(|e| JobError::Transport {
            transport: name.clone(),
            source: e,
        })?;

        self.transport = Some(transport.clone());
        Ok(transport)
    }

    /// Close the transport (if one was opened) and give the host back.
    ///
    /// Safe to call more than once; only the first call does anything.
    /// Disconnect errors are logged and swallowed. The first other error is
    /// returned after both steps have been attempted.
    pub async fn release(&mut self) -> Result<(), JobError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut failure: Option<anyhow::Error> = None;

        let transport = self.transport.take();
        if let Some(ref transport) = transport {
            if let Err(e) = transport.close().await {
                self.note_cleanup_error("closing transport", e, &mut failure);
            }
        }

        self.trace.info(&format!(
            "Releasing build host '{}' to builder '{}'",
            self.host.host, self.builder_name
        ));
        if let Err(e) = self.builder.release(transport.as_deref(), &self.host).await {
            self.note_cleanup_error("releasing build host", e, &mut failure);
        }

        match failure {
            Some(source) => Err(JobError::Cleanup {
                host: self.host.host.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    fn note_cleanup_error(&self, what: &str, err: anyhow::Error, failure: &mut Option<anyhow::Error>) {
        if is_disconnected(&err) {
            self.trace.warning(&format!("Ignoring disconnect while {}: {:#}", what, err));
            return;
        }
        self.trace.error(&format!("Failed {}: {:#}", what, err));
        failure.get_or_insert(err);
    }
}
