// LocalTransport: runs commands through `sh -c` on the local machine and
// streams their output into the job log.

use async_trait::async_trait;
use jobrunner_sdk::{
    ConnectInfo, DisconnectedError, Notifier, OutputStream, ProcessInvoker, ProcessOutput,
    TracingTraceWriter, Transport,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use super::TRANSPORT_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Open,
    Closed,
}

pub struct LocalTransport {
    connect: ConnectInfo,
    log_sink: Arc<dyn Notifier>,
    invoker: ProcessInvoker,
    work_directory: Option<PathBuf>,
    shell: Mutex<Option<PathBuf>>,
    environment: Mutex<HashMap<String, String>>,
    state: Mutex<State>,
    exit_code: AtomicI32,
}

impl LocalTransport {
    pub fn new(connect: ConnectInfo, log_sink: Arc<dyn Notifier>) -> Self {
        Self {
            connect,
            log_sink,
            invoker: ProcessInvoker::new(Arc::new(TracingTraceWriter)),
            work_directory: None,
            shell: Mutex::new(None),
            environment: Mutex::new(HashMap::new()),
            state: Mutex::new(State::New),
            exit_code: AtomicI32::new(0),
        }
    }

    /// Run commands in `work_directory` unless a step names its own
    /// directory. Relative step directories resolve against it.
    pub fn with_work_directory(mut self, work_directory: Option<PathBuf>) -> Self {
        self.work_directory = work_directory;
        self
    }

    fn resolve_directory(&self, working_directory: Option<&str>) -> Option<PathBuf> {
        match (working_directory, &self.work_directory) {
            (Some(dir), Some(base)) if Path::new(dir).is_relative() => Some(base.join(dir)),
            (Some(dir), _) => Some(PathBuf::from(dir)),
            (None, base) => base.clone(),
        }
    }

    fn shell(&self) -> anyhow::Result<PathBuf> {
        match *self.state.lock() {
            State::Open => {}
            State::New => anyhow::bail!("local transport to '{}' is not open", self.connect.host),
            State::Closed => return Err(DisconnectedError::new("local transport is closed").into()),
        }
        self.shell
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no shell resolved for local transport"))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        TRANSPORT_NAME
    }

    async fn open(&self) -> anyhow::Result<()> {
        let shell = which::which("sh").map_err(|e| anyhow::anyhow!("cannot find 'sh' on PATH: {e}"))?;
        tracing::debug!("Local transport using shell {:?}", shell);
        if let Some(ref dir) = self.work_directory {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| anyhow::anyhow!("cannot create work directory {:?}: {e}", dir))?;
        }
        *self.shell.lock() = Some(shell);
        *self.state.lock() = State::Open;
        Ok(())
    }

    async fn exec(&self, command: &str, working_directory: Option<&str>) -> anyhow::Result<bool> {
        let shell = self.shell()?;
        let directory = self.resolve_directory(working_directory);
        let environment = self.environment.lock().clone();
        let sink = self.log_sink.clone();
        let on_output = move |output: &ProcessOutput| match output.stream {
            OutputStream::Stdout => sink.write(&output.data),
            OutputStream::Stderr => sink.write(&format!("[stderr] {}", output.data)),
        };

        let exit_code = self
            .invoker
            .execute(
                directory.as_deref().and_then(Path::to_str),
                &shell.to_string_lossy(),
                &["-c".to_string(), command.to_string()],
                &environment,
                &on_output,
            )
            .await?;
        self.exit_code.store(exit_code, Ordering::SeqCst);
        Ok(exit_code == 0)
    }

    fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    async fn export_env(&self, environment: &HashMap<String, String>) -> anyhow::Result<()> {
        self.environment.lock().extend(environment.clone());
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        *self.state.lock() = State::Closed;
        Ok(())
    }
}
