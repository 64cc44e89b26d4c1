// Entry point for the `jobrunner` binary.
//
// Runs a single job definition against the configured builder and exits with
// a code that encodes the outcome: 0 succeeded, 1 failed, 2 could not be set up.

use anyhow::{Context, Result};
use clap::Parser;
use jobrunner_common::constants;
use jobrunner_common::{CapabilityRegistry, HostContext, JobError, JobLog, RunnerSettings};
use jobrunner_worker::console::ConsoleNotifier;
use jobrunner_worker::{JobDefinition, JobRunner};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXIT_SUCCEEDED: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_SETUP_ERROR: i32 = 2;

/// Command-line arguments for the job runner.
#[derive(Parser, Debug)]
#[command(name = "jobrunner", version, about = "Run one CI job on a leased build host")]
struct Args {
    /// Job definition file (JSON, or YAML when the extension is .yml/.yaml).
    #[arg(long)]
    job: PathBuf,

    /// Job id; a random UUID when omitted.
    #[arg(long = "job-id")]
    job_id: Option<String>,

    /// Settings file.
    #[arg(long, default_value = constants::SETTINGS_FILE)]
    settings: PathBuf,
}

fn main() {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");

    let exit_code = runtime.block_on(async move { run(args).await });

    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = match RunnerSettings::load(&args.settings) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load settings: {:#}", e);
            return EXIT_SETUP_ERROR;
        }
    };

    let job = match load_job(&args.job) {
        Ok(job) => job,
        Err(e) => {
            tracing::error!("{:#}", e);
            return EXIT_SETUP_ERROR;
        }
    };
    let job_id = args
        .job_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let log = match settings.log_directory {
        Some(ref dir) => match JobLog::with_pages(job_id.clone(), dir) {
            Ok(log) => log,
            Err(e) => {
                tracing::error!("Failed to open job log in {:?}: {:#}", dir, e);
                return EXIT_SETUP_ERROR;
            }
        },
        None => JobLog::new(job_id.clone()),
    };
    let log = Arc::new(log);
    let notifier = Arc::new(ConsoleNotifier::new(log.clone(), std::io::stdout().is_terminal()));

    let registry = Arc::new(CapabilityRegistry::new());
    jobrunner_plugins::register_builtin(&registry, &settings);
    let host_context = HostContext::new(settings, registry);

    tracing::info!("Job runner starting job {} with builder '{}'", job_id, host_context.settings().builder);

    let exit_code = match JobRunner::start_with_definition(host_context, job_id.clone(), job, notifier).await {
        Ok(runner) => match runner.run().await {
            Ok(true) => EXIT_SUCCEEDED,
            Ok(false) => EXIT_FAILED,
            Err(e) => {
                report(&e);
                EXIT_FAILED
            }
        },
        Err(e) => {
            report(&e);
            EXIT_SETUP_ERROR
        }
    };

    log.end_pages();
    tracing::info!("Job {} finished with exit code {}", job_id, exit_code);
    exit_code
}

fn load_job(path: &Path) -> Result<JobDefinition> {
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job definition {:?}", path))?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    );
    let job = if yaml {
        JobDefinition::from_yaml(&payload)
    } else {
        JobDefinition::from_json(&payload)
    };
    job.map_err(|e| anyhow::anyhow!(e.describe()))
}

fn report(err: &JobError) {
    tracing::error!("Job failed: {}", err.describe());
}
