// Constants shared by the runner crates.

/// Settings file looked up in the working directory when none is given.
pub const SETTINGS_FILE: &str = ".jobrunner.json";

/// Builder used when settings do not name one.
pub const DEFAULT_BUILDER: &str = "localhost";

/// Environment variables that override settings.
pub mod env {
    pub const BUILDER: &str = "JOBRUNNER_BUILDER";
    pub const LOG_DIR: &str = "JOBRUNNER_LOG_DIR";
    pub const PRINT_LOG_TO_STDOUT: &str = "JOBRUNNER_PRINT_LOG_TO_STDOUT";
    pub const WORK_DIR: &str = "JOBRUNNER_WORK_DIR";
}

/// Context keys seeded from the job definition.
pub mod context_keys {
    pub const JOB_ID: &str = "job_id";
    pub const JOB_NAME: &str = "job_name";
    pub const JOB_VERSION: &str = "job_version";
    pub const ORGANIZATION: &str = "organization";
}
