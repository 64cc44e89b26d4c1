use crate::trace::TraceWriter;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Which stream a line of process output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of output from a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stream: OutputStream,
    pub data: String,
}

/// Spawns a child process and streams its output line by line.
///
/// stdout and stderr are read on separate tasks and funnelled through one
/// channel, so the caller's `on_output` callback runs on the calling task
/// and sees lines in the order they were read.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
}

impl ProcessInvoker {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self { trace }
    }

    /// Run `file_name` with `arguments` and return its exit code.
    ///
    /// A process killed by a signal reports `-1`. Failing to spawn at all is
    /// an error.
    pub async fn execute(
        &self,
        working_directory: Option<&str>,
        file_name: &str,
        arguments: &[String],
        environment: &HashMap<String, String>,
        on_output: &(dyn Fn(&ProcessOutput) + Send + Sync),
    ) -> Result<i32> {
        self.trace.verbose(&format!(
            "Starting process '{file_name}' with {} argument(s)",
            arguments.len()
        ));

        let mut cmd = Command::new(file_name);
        cmd.args(arguments);

        if let Some(dir) = working_directory {
            if !Path::new(dir).is_dir() {
                anyhow::bail!("Working directory '{dir}' does not exist");
            }
            cmd.current_dir(dir);
        }

        cmd.envs(environment);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let start = std::time::Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start process '{file_name}'"))?;
        let pid = child.id().unwrap_or(0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_lines(out, OutputStream::Stdout, tx.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_lines(err, OutputStream::Stderr, tx.clone())));
        drop(tx);

        // The channel closes once both readers hit EOF.
        while let Some(line) = rx.recv().await {
            on_output(&line);
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for process")?;

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let exit_code = status.code().unwrap_or(-1);
        self.trace.verbose(&format!(
            "Finished process {pid} with exit code {exit_code} after {:.2?}",
            start.elapsed()
        ));
        Ok(exit_code)
    }
}

async fn read_lines<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<ProcessOutput>)
where
    R: AsyncRead + Unpin,
{
    // Bytes, not `lines()`: a line that is not UTF-8 must not stop the
    // drain, or the child blocks or dies on a closed pipe.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                let data = String::from_utf8_lossy(line).into_owned();
                if tx.send(ProcessOutput { stream, data }).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}
