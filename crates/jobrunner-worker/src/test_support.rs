// Recording fakes for every capability kind, shared by the worker's tests.

use async_trait::async_trait;
use jobrunner_common::{CapabilityRegistry, HostContext, JobLog, RunnerSettings};
use jobrunner_sdk::{
    exit_codes, Action, ActionOutcome, BuildHost, Builder, Context, DisconnectedError,
    Notifier, Provisioner, ScalarMap, Source, SourceDescriptor, Transport,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Where the fakes should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    BuilderGet,
    BuilderEmpty,
    TransportOpen,
    ExportEnv,
    Provision,
    Checkout,
    CheckoutFalse,
    Close,
    CloseDisconnected,
    Release,
}

/// Call counters shared by every fake of one harness.
#[derive(Default)]
pub struct Calls {
    pub get: AtomicUsize,
    pub release: AtomicUsize,
    pub release_saw_transport: AtomicUsize,
    pub open: AtomicUsize,
    pub close: AtomicUsize,
    pub export_env: AtomicUsize,
    pub provision: AtomicUsize,
    pub checkout: AtomicUsize,
    pub opened: Mutex<Vec<String>>,
    pub exported: Mutex<HashMap<String, String>>,
    pub builder_args: Mutex<ScalarMap>,
    pub checked_out: Mutex<Vec<(String, usize)>>,
    pub performed: Mutex<Vec<String>>,
}

impl Calls {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeBuilder {
    calls: Arc<Calls>,
    failure: Failure,
    transports: Vec<String>,
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn get(&self, args: &ScalarMap) -> anyhow::Result<Option<BuildHost>> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        *self.calls.builder_args.lock() = args.clone();
        match self.failure {
            Failure::BuilderGet => anyhow::bail!("pool exhausted"),
            Failure::BuilderEmpty => return Ok(None),
            _ => {}
        }

        let mut host = BuildHost::new("fake-host");
        host.username = Some("builder".to_string());
        host.distro = "fakeos".to_string();
        host.release = "1.0".to_string();
        host.transports = self.transports.clone();
        host.facts.insert("arch".to_string(), "x86_64".into());
        Ok(Some(host))
    }

    async fn release(&self, transport: Option<&dyn Transport>, _host: &BuildHost) -> anyhow::Result<()> {
        self.calls.release.fetch_add(1, Ordering::SeqCst);
        if transport.is_some() {
            self.calls.release_saw_transport.fetch_add(1, Ordering::SeqCst);
        }
        if self.failure == Failure::Release {
            anyhow::bail!("provider rejected release");
        }
        Ok(())
    }
}

pub struct FakeTransport {
    name: String,
    calls: Arc<Calls>,
    failure: Failure,
    log_sink: Arc<dyn Notifier>,
    exit_code: AtomicI32,
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> anyhow::Result<()> {
        self.calls.open.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::TransportOpen {
            anyhow::bail!("connection refused");
        }
        self.calls.opened.lock().push(self.name.clone());
        Ok(())
    }

    async fn exec(&self, command: &str, _working_directory: Option<&str>) -> anyhow::Result<bool> {
        self.log_sink.write(command);
        self.exit_code.store(0, Ordering::SeqCst);
        Ok(true)
    }

    fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    async fn export_env(&self, environment: &HashMap<String, String>) -> anyhow::Result<()> {
        self.calls.export_env.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::ExportEnv {
            anyhow::bail!("remote shell rejected environment");
        }
        self.calls.exported.lock().extend(environment.clone());
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.calls.close.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Failure::Close => anyhow::bail!("close timed out"),
            Failure::CloseDisconnected => Err(DisconnectedError::new("peer hung up").into()),
            _ => Ok(()),
        }
    }
}

pub struct FakeProvisioner {
    calls: Arc<Calls>,
    failure: Failure,
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn prepare(
        &self,
        _transport: &dyn Transport,
        _host: &BuildHost,
        _environment: &ScalarMap,
    ) -> anyhow::Result<()> {
        self.calls.provision.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::Provision {
            anyhow::bail!("package install failed");
        }
        Ok(())
    }
}

pub struct FakeSource {
    kind: String,
    calls: Arc<Calls>,
    failure: Failure,
}

#[async_trait]
impl Source for FakeSource {
    async fn checkout(
        &self,
        _transport: &dyn Transport,
        _context: &Context,
        sources: &[SourceDescriptor],
    ) -> anyhow::Result<bool> {
        self.calls.checkout.fetch_add(1, Ordering::SeqCst);
        self.calls.checked_out.lock().push((self.kind.clone(), sources.len()));
        match self.failure {
            Failure::Checkout => anyhow::bail!("repository not found"),
            Failure::CheckoutFalse => Ok(false),
            _ => Ok(true),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptParams {
    label: String,
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    template: Option<String>,
}

/// An action that records its label and does what its parameters say.
pub struct ScriptedAction {
    params: ScriptParams,
    calls: Arc<Calls>,
    context: Option<Context>,
}

#[async_trait]
impl Action for ScriptedAction {
    fn prepare(&mut self, _transport: Arc<dyn Transport>, context: Context) {
        self.context = Some(context);
    }

    async fn perform(&mut self, notifier: &dyn Notifier) -> anyhow::Result<ActionOutcome> {
        self.calls.performed.lock().push(self.params.label.clone());
        if self.params.error {
            anyhow::bail!("scripted action blew up");
        }

        if let (Some(template), Some(context)) = (&self.params.template, &self.context) {
            match context.interpolate(template) {
                Ok(line) => notifier.write(&line),
                Err(e) => {
                    notifier.write(&e.to_string());
                    return Ok(ActionOutcome::failed(exit_codes::INTERPOLATION_FAILED));
                }
            }
        }

        Ok(match self.params.exit_code {
            0 => ActionOutcome::succeeded(0),
            code => ActionOutcome::failed(code),
        })
    }
}

/// Step JSON for a scripted action.
pub fn script_step(label: &str, exit_code: i32) -> serde_json::Value {
    serde_json::json!({
        "action": {"name": "script", "parameters": {"label": label, "exit_code": exit_code}}
    })
}

pub struct Harness {
    pub calls: Arc<Calls>,
    pub host_context: Arc<HostContext>,
    pub log: Arc<JobLog>,
}

impl Harness {
    /// Build and open an `ssh` fake transport outside of any lease.
    pub async fn open_transport(&self) -> Arc<dyn Transport> {
        let transport: Arc<dyn Transport> = Arc::from(
            self.host_context
                .registry()
                .transport("ssh", BuildHost::new("fake-host").connect_info(), self.log.clone())
                .unwrap(),
        );
        transport.open().await.unwrap();
        transport
    }
}

/// A registry with fakes under builder `fake`, transports `ssh` and `local`,
/// provisioner `fakeos`, source `git` and action `script`.
pub fn harness(failure: Failure, transports: &[&str]) -> Harness {
    let calls = Arc::new(Calls::default());
    let registry = Arc::new(CapabilityRegistry::new());
    let transports: Vec<String> = transports.iter().map(|t| t.to_string()).collect();

    {
        let calls = calls.clone();
        registry.register_builder("fake", move || {
            Box::new(FakeBuilder {
                calls: calls.clone(),
                failure,
                transports: transports.clone(),
            })
        });
    }
    for name in ["ssh", "local"] {
        let calls = calls.clone();
        registry.register_transport(name, move |_connect, log_sink| {
            Box::new(FakeTransport {
                name: name.to_string(),
                calls: calls.clone(),
                failure,
                log_sink,
                exit_code: AtomicI32::new(0),
            })
        });
    }
    {
        let calls = calls.clone();
        registry.register_provisioner("fakeos", move || {
            Box::new(FakeProvisioner {
                calls: calls.clone(),
                failure,
            })
        });
    }
    {
        let calls = calls.clone();
        registry.register_source("git", move || {
            Box::new(FakeSource {
                kind: "git".to_string(),
                calls: calls.clone(),
                failure,
            })
        });
    }
    {
        let calls = calls.clone();
        registry.register_action("script", move |parameters| {
            let params: ScriptParams = serde_json::from_value(parameters.clone())?;
            let action: Box<dyn Action> = Box::new(ScriptedAction {
                params,
                calls: calls.clone(),
                context: None,
            });
            Ok(action)
        });
    }

    let settings = RunnerSettings {
        builder: "fake".to_string(),
        ..RunnerSettings::default()
    };
    Harness {
        calls,
        host_context: HostContext::new(settings, registry),
        log: Arc::new(JobLog::new("test-job")),
    }
}
