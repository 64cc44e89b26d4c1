// JobRunner: owns one job from build host acquisition to release.
//
// `start` leases and prepares the host, `run` walks the stage graph and
// tears everything down. A runner is consumed by `run`, so a job can only be
// run once.

use chrono::Utc;
use jobrunner_common::constants::context_keys;
use jobrunner_common::{HostContext, JobError, MaskingNotifier, SecretMasker, Tracing};
use jobrunner_sdk::{to_string_map, Context, JobStatus, Notifier, TraceWriter, Transport};
use std::sync::Arc;

use crate::job::JobDefinition;
use crate::lease::BuildLease;
use crate::source_checkout::checkout_sources;
use crate::stage_runner::StageRunner;

/// Set `status` on `notifier` and record the transition in the job log.
pub(crate) fn transition(notifier: &dyn Notifier, status: JobStatus) {
    notifier.set_status(status);
    notifier.write(&format!("Job status: {}", status));
}

/// A job whose build host is leased, connected, provisioned and checked out.
pub struct JobRunner {
    job_id: String,
    job: JobDefinition,
    host_context: Arc<HostContext>,
    notifier: Arc<dyn Notifier>,
    context: Context,
    lease: BuildLease,
    transport: Arc<dyn Transport>,
    secret_masker: Arc<SecretMasker>,
    trace: Tracing,
}

impl JobRunner {
    /// Deserialize `payload` and set the job up.
    ///
    /// A malformed payload is reported before `notifier` is touched.
    pub async fn start(
        host_context: Arc<HostContext>,
        job_id: impl Into<String>,
        payload: &str,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, JobError> {
        let job = JobDefinition::from_json(payload)?;
        Self::start_with_definition(host_context, job_id, job, notifier).await
    }

    /// Set up an already deserialized job.
    ///
    /// 1. Registers the job's secrets with a masker owned by this job and
    ///    builds the context
    /// 2. Leases a host from the configured builder (`WAITING` → `STARTED`)
    /// 3. Opens the negotiated transport and exports the environment
    /// 4. Provisions the host and checks out sources
    ///
    /// On any failure the job is marked `FAILED`, whatever was acquired is
    /// given back, and the original error is returned.
    pub async fn start_with_definition(
        host_context: Arc<HostContext>,
        job_id: impl Into<String>,
        job: JobDefinition,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, JobError> {
        let job_id = job_id.into();

        let secret_masker = host_context.job_secret_masker();
        for secret in job.secrets.values() {
            secret_masker.add_value(&secret.to_string());
        }
        let trace = host_context.get_job_trace("JobRunner", &secret_masker);
        let notifier: Arc<dyn Notifier> = Arc::new(MaskingNotifier::new(notifier, secret_masker.clone()));

        let context = build_context(&job_id, &job);

        trace.info(&format!("Starting job '{}' ({})", job.name, job_id));
        transition(notifier.as_ref(), JobStatus::Waiting);

        let builder_name = host_context.settings().builder.clone();
        let mut lease = match BuildLease::acquire(&host_context, &builder_name, &job.environment).await {
            Ok(lease) => lease,
            Err(err) => return Err(fail_setup(&trace, notifier.as_ref(), None, err).await),
        };

        match prepare_host(&host_context, &job, &context, &notifier, &mut lease).await {
            Ok(transport) => Ok(Self {
                job_id,
                job,
                host_context,
                notifier,
                context,
                lease,
                transport,
                secret_masker,
                trace,
            }),
            Err(err) => Err(fail_setup(&trace, notifier.as_ref(), Some(&mut lease), err).await),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    /// Handle onto the job context, shared with every action.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn lease(&self) -> &BuildLease {
        &self.lease
    }

    /// Walk the stage graph, then close the transport and release the host.
    ///
    /// Returns whether the job succeeded. A stage-graph error (unknown stage,
    /// malformed stage, unregistered action) fails the job and is returned
    /// as `Err`; so is a cleanup failure that is not a disconnect.
    pub async fn run(mut self) -> Result<bool, JobError> {
        let walker = StageRunner::new(
            self.host_context.registry(),
            self.transport.clone(),
            self.context.clone(),
            self.notifier.clone(),
            self.host_context.get_job_trace("StageRunner", &self.secret_masker),
        );
        let walked = walker.run(&self.job).await;
        drop(walker);

        let cleanup = self.lease.release().await;

        if let Err(ref err) = walked {
            self.trace.error(&format!("Job '{}' aborted: {}", self.job_id, err));
            self.notifier.write(&format!("Job aborted: {}", err.describe()));
        }
        let status = match walked {
            Ok(true) => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        };
        transition(self.notifier.as_ref(), status);
        self.notifier.set_ended(Utc::now());
        self.trace.info(&format!("Job '{}' finished: {}", self.job_id, status));

        match (walked, cleanup) {
            (Err(err), Err(cleanup)) => {
                self.trace.error(&format!("Cleanup also failed: {}", cleanup.describe()));
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Ok(succeeded), Ok(())) => Ok(succeeded),
        }
    }
}

/// Seed the context: job definition context, then job metadata, then
/// environment, then secrets. Later sources win on key collision.
fn build_context(job_id: &str, job: &JobDefinition) -> Context {
    let context = Context::new();
    context.merge(&job.context);
    context.insert(context_keys::JOB_ID, job_id);
    context.insert(context_keys::JOB_NAME, job.name.as_str());
    context.insert(context_keys::JOB_VERSION, job.version.as_str());
    context.insert(context_keys::ORGANIZATION, job.organization.as_str());
    context.merge(&job.environment);
    context.merge(&job.secrets);
    context
}

/// Everything between acquiring the host and running the first stage.
async fn prepare_host(
    host_context: &HostContext,
    job: &JobDefinition,
    context: &Context,
    notifier: &Arc<dyn Notifier>,
    lease: &mut BuildLease,
) -> Result<Arc<dyn Transport>, JobError> {
    let registry = host_context.registry();

    notifier.write(&format!(
        "Leased build host '{}' ({} {}) from '{}'",
        lease.host().host,
        lease.host().distro,
        lease.host().release,
        lease.builder_name()
    ));
    transition(notifier.as_ref(), JobStatus::Started);
    context.merge(&lease.host().context_info());

    let transport = lease.open_transport(registry, notifier.clone()).await?;
    notifier.write(&format!("Connected to build host over '{}'", transport.name()));
    transport
        .export_env(&to_string_map(&job.environment))
        .await
        .map_err(|e| JobError::Transport {
            transport: transport.name().to_string(),
            source: e,
        })?;

    let host = lease.host();
    let provisioner = registry.provisioner(&host.distro)?;
    notifier.write(&format!("Provisioning build host with '{}'", host.distro));
    provisioner
        .prepare(transport.as_ref(), host, &job.environment)
        .await
        .map_err(|e| JobError::Provisioning {
            provisioner: host.distro.clone(),
            source: e,
        })?;

    checkout_sources(registry, transport.as_ref(), context, &job.sources, notifier.as_ref()).await?;
    Ok(transport)
}

/// Log a setup failure, give back whatever was acquired and end the job.
/// Returns `err` so the caller can report it.
async fn fail_setup(
    trace: &Tracing,
    notifier: &dyn Notifier,
    lease: Option<&mut BuildLease>,
    err: JobError,
) -> JobError {
    trace.error(&format!("Job setup failed: {}", err));
    notifier.write(&format!("Job setup failed: {}", err.describe()));

    if let Some(lease) = lease {
        if let Err(cleanup) = lease.release().await {
            trace.error(&format!("Cleanup after failed setup also failed: {}", cleanup.describe()));
        }
    }

    transition(notifier, JobStatus::Failed);
    notifier.set_ended(Utc::now());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, script_step, Calls, Failure, Harness};
    use jobrunner_common::JobLog;
    use jobrunner_sdk::ScalarValue;
    use serde_json::json;

    fn job(stages: serde_json::Value, sequence: &[&str]) -> String {
        json!({
            "name": "nightly",
            "version": "3",
            "organization": "acme",
            "environment": {"CI": "true", "SHARED": "from-env"},
            "secrets": {"TOKEN": "hunter2", "SHARED": "from-secret"},
            "context": {"branch": "main", "CI": "from-context"},
            "sources": [
                {"type": "git", "url": "https://example.com/a.git"},
                {"type": "git", "url": "https://example.com/b.git"}
            ],
            "stages": stages,
            "sequence": sequence
        })
        .to_string()
    }

    async fn start(h: &Harness, payload: &str) -> Result<JobRunner, JobError> {
        JobRunner::start(h.host_context.clone(), "job-1", payload, h.log.clone()).await
    }

    #[tokio::test]
    async fn empty_sequence_succeeds() {
        let h = harness(Failure::None, &["ssh"]);
        let runner = start(&h, &job(json!({}), &[])).await.unwrap();
        assert_eq!(h.log.status(), Some(JobStatus::Started));

        assert!(runner.run().await.unwrap());
        assert_eq!(h.log.status(), Some(JobStatus::Succeeded));
        assert!(h.log.ended().is_some());
        assert!(h.calls.performed.lock().is_empty());
        assert_eq!(Calls::count(&h.calls.close), 1);
        assert_eq!(Calls::count(&h.calls.release), 1);
        assert_eq!(Calls::count(&h.calls.release_saw_transport), 1);
    }

    #[tokio::test]
    async fn failure_edge_then_clean_stage_fails_the_job() {
        let h = harness(Failure::None, &["ssh"]);
        let stages = json!({
            "a": {"name": "a", "version": 1, "steps": [script_step("a1", 4), script_step("a2", 0)], "on_failure": "b"},
            "b": {"name": "b", "version": 1, "steps": [script_step("b1", 0)]}
        });
        let runner = start(&h, &job(stages, &["a"])).await.unwrap();
        assert!(!runner.run().await.unwrap());
        assert_eq!(*h.calls.performed.lock(), vec!["a1", "b1"]);
        assert_eq!(h.log.status(), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn status_transitions_are_logged_in_order() {
        let h = harness(Failure::None, &["ssh"]);
        let stages = json!({"a": {"name": "a", "steps": [script_step("a1", 0)]}});
        start(&h, &job(stages, &["a"])).await.unwrap().run().await.unwrap();

        let statuses: Vec<String> = h
            .log
            .lines()
            .into_iter()
            .filter_map(|l| l.split_once("Job status: ").map(|(_, s)| s.to_string()))
            .collect();
        assert_eq!(statuses, vec!["WAITING", "STARTED", "SUCCEEDED"]);
    }

    #[tokio::test]
    async fn context_merge_order() {
        let h = harness(Failure::None, &["ssh"]);
        let runner = start(&h, &job(json!({}), &[])).await.unwrap();
        let context = runner.context();

        assert_eq!(context.get("job_id"), Some(ScalarValue::from("job-1")));
        assert_eq!(context.get("job_name"), Some(ScalarValue::from("nightly")));
        assert_eq!(context.get("job_version"), Some(ScalarValue::from("3")));
        assert_eq!(context.get("organization"), Some(ScalarValue::from("acme")));
        assert_eq!(context.get("branch"), Some(ScalarValue::from("main")));
        // environment over context, secrets over environment
        assert_eq!(context.get("CI"), Some(ScalarValue::from("true")));
        assert_eq!(context.get("SHARED"), Some(ScalarValue::from("from-secret")));
        // host facts arrive once the host is leased
        assert_eq!(context.get("arch"), Some(ScalarValue::from("x86_64")));
        assert_eq!(context.get("build_host"), Some(ScalarValue::from("fake-host")));
        runner.run().await.unwrap();
    }

    #[tokio::test]
    async fn environment_but_not_secrets_is_exported() {
        let h = harness(Failure::None, &["ssh"]);
        start(&h, &job(json!({}), &[])).await.unwrap().run().await.unwrap();

        let exported = h.calls.exported.lock().clone();
        assert_eq!(exported.get("CI").map(String::as_str), Some("true"));
        assert_eq!(exported.get("SHARED").map(String::as_str), Some("from-env"));
        assert!(!exported.contains_key("TOKEN"));
        assert_eq!(h.calls.builder_args.lock().get("CI"), Some(&ScalarValue::from("true")));
    }

    #[tokio::test]
    async fn sources_of_one_type_are_checked_out_together() {
        let h = harness(Failure::None, &["ssh"]);
        start(&h, &job(json!({}), &[])).await.unwrap().run().await.unwrap();
        assert_eq!(*h.calls.checked_out.lock(), vec![("git".to_string(), 2)]);
    }

    #[tokio::test]
    async fn secrets_are_masked_in_the_job_log() {
        let h = harness(Failure::None, &["ssh"]);
        let stages = json!({"a": {"name": "a", "steps": [
            {"action": {"name": "script", "parameters": {"label": "a1", "template": "token=%{TOKEN}"}}}
        ]}});
        start(&h, &job(stages, &["a"])).await.unwrap().run().await.unwrap();

        let lines = h.log.lines();
        assert!(lines.iter().any(|l| l.ends_with("token=***")));
        assert!(lines.iter().all(|l| !l.contains("hunter2")));
    }

    #[tokio::test]
    async fn job_secrets_stay_with_their_job() {
        let h = harness(Failure::None, &["ssh"]);
        for (index, secret) in ["first-pw", "second-pw", "third-pw"].iter().enumerate() {
            let payload = json!({
                "name": "masking",
                "secrets": {"PW": secret},
                "context": {"previous": "first-pw"},
                "stages": {"a": {"name": "a", "steps": [
                    {"action": {"name": "script", "parameters": {
                        "label": "a1", "template": "pw=%{PW} previous=%{previous}"
                    }}}
                ]}},
                "sequence": ["a"]
            })
            .to_string();
            let log = Arc::new(JobLog::new(format!("job-{index}")));
            JobRunner::start(h.host_context.clone(), format!("job-{index}"), &payload, log.clone())
                .await
                .unwrap()
                .run()
                .await
                .unwrap();

            let expected = if index == 0 { "pw=*** previous=***" } else { "pw=*** previous=first-pw" };
            assert!(log.lines().iter().any(|l| l.ends_with(expected)), "job {index}");
        }
        assert_eq!(h.host_context.secret_masker.secret_count(), 0);
    }

    #[tokio::test]
    async fn malformed_payload_touches_nothing() {
        let h = harness(Failure::None, &["ssh"]);
        let err = start(&h, "{not json").await.err().unwrap();
        assert!(matches!(err, JobError::Deserialization { .. }));
        assert_eq!(h.log.status(), None);
        assert!(h.log.lines().is_empty());
        assert_eq!(Calls::count(&h.calls.get), 0);
    }

    #[tokio::test]
    async fn unknown_builder_fails_the_job() {
        let h = harness(Failure::None, &["ssh"]);
        let settings = jobrunner_common::RunnerSettings {
            builder: "nowhere".to_string(),
            ..Default::default()
        };
        let host_context = HostContext::new(settings, h.host_context.registry().clone());
        let err = JobRunner::start(host_context, "job-2", &job(json!({}), &[]), h.log.clone())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, JobError::PluginNotFound { ref name, .. } if name == "nowhere"));
        assert_eq!(h.log.status(), Some(JobStatus::Failed));
        assert_eq!(Calls::count(&h.calls.get), 0);
    }

    /// (failure, expected release calls, expected close calls)
    const SETUP_FAILURES: &[(Failure, usize, usize)] = &[
        (Failure::BuilderGet, 0, 0),
        (Failure::BuilderEmpty, 0, 0),
        (Failure::TransportOpen, 1, 0),
        (Failure::ExportEnv, 1, 1),
        (Failure::Provision, 1, 1),
        (Failure::Checkout, 1, 1),
        (Failure::CheckoutFalse, 1, 1),
    ];

    #[tokio::test]
    async fn setup_failures_release_only_what_was_acquired() {
        for &(failure, releases, closes) in SETUP_FAILURES {
            let h = harness(failure, &["ssh"]);
            let err = start(&h, &job(json!({}), &["a"])).await.err().unwrap();
            assert!(err.is_setup_failure(), "{:?}: {}", failure, err);

            assert_eq!(Calls::count(&h.calls.release), releases, "release after {:?}", failure);
            assert_eq!(Calls::count(&h.calls.close), closes, "close after {:?}", failure);
            assert_eq!(h.log.status(), Some(JobStatus::Failed), "status after {:?}", failure);
            assert!(h.log.ended().is_some());
        }
    }

    #[tokio::test]
    async fn no_valid_transport_fails_before_any_command() {
        let h = harness(Failure::None, &["winrm"]);
        let err = start(&h, &job(json!({}), &[])).await.err().unwrap();
        assert!(matches!(err, JobError::NoValidTransport { .. }));
        assert_eq!(Calls::count(&h.calls.open), 0);
        assert_eq!(Calls::count(&h.calls.export_env), 0);
        assert_eq!(Calls::count(&h.calls.release), 1);
    }

    #[tokio::test]
    async fn missing_stage_fails_and_still_cleans_up() {
        let h = harness(Failure::None, &["ssh"]);
        let runner = start(&h, &job(json!({}), &["ghost"])).await.unwrap();
        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, JobError::StageNotFound(_)));
        assert_eq!(h.log.status(), Some(JobStatus::Failed));
        assert_eq!(Calls::count(&h.calls.close), 1);
        assert_eq!(Calls::count(&h.calls.release), 1);
    }

    #[tokio::test]
    async fn disconnect_on_close_is_not_a_failure() {
        let h = harness(Failure::CloseDisconnected, &["ssh"]);
        let runner = start(&h, &job(json!({}), &[])).await.unwrap();
        assert!(runner.run().await.unwrap());
        assert_eq!(Calls::count(&h.calls.release), 1);
    }

    #[tokio::test]
    async fn other_cleanup_errors_propagate() {
        let h = harness(Failure::Release, &["ssh"]);
        let runner = start(&h, &job(json!({}), &[])).await.unwrap();
        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, JobError::Cleanup { .. }));
        assert_eq!(Calls::count(&h.calls.close), 1);
        // The walk itself succeeded.
        assert_eq!(h.log.status(), Some(JobStatus::Succeeded));
    }

    #[tokio::test]
    async fn runners_share_only_the_registry() {
        let h = harness(Failure::None, &["ssh"]);
        let stages = json!({"a": {"name": "a", "steps": [script_step("x", 0)]}});
        let payload = job(stages, &["a"]);

        let first = JobRunner::start(h.host_context.clone(), "job-a", &payload, h.log.clone());
        let other_log = Arc::new(jobrunner_common::JobLog::new("job-b"));
        let second = JobRunner::start(h.host_context.clone(), "job-b", &payload, other_log);
        let (first, second) = tokio::join!(first, second);
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.context().get("job_id"), Some(ScalarValue::from("job-a")));
        assert_eq!(second.context().get("job_id"), Some(ScalarValue::from("job-b")));

        let (a, b) = tokio::join!(first.run(), second.run());
        assert!(a.unwrap() && b.unwrap());
        assert_eq!(Calls::count(&h.calls.release), 2);
    }
}
