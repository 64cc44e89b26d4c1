// RunnerSettings: process configuration loaded from a JSON file with
// environment overrides.

use crate::constants::{self, env};
use anyhow::{Context, Result};
use jobrunner_sdk::StringUtil;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Registered name of the builder that leases build hosts.
    #[serde(default = "default_builder", rename = "Builder")]
    pub builder: String,

    /// Directory for paged job logs. Paging is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "LogDirectory")]
    pub log_directory: Option<PathBuf>,

    /// Echo diagnostic trace lines to stdout.
    #[serde(default, rename = "PrintLogToStdout")]
    pub print_log_to_stdout: bool,

    /// Directory the local transport runs commands in. Created on open.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "WorkDirectory")]
    pub work_directory: Option<PathBuf>,
}

fn default_builder() -> String {
    constants::DEFAULT_BUILDER.to_string()
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            builder: default_builder(),
            log_directory: None,
            print_log_to_stdout: false,
            work_directory: None,
        }
    }
}

impl RunnerSettings {
    /// Load settings from `path` (defaults when the file does not exist) and
    /// apply overrides from the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file {:?}", path))?;
            StringUtil::convert_from_json::<RunnerSettings>(&content)
                .with_context(|| format!("Failed to parse settings file {:?}", path))?
        } else {
            tracing::debug!("Settings file {:?} not found, using defaults", path);
            RunnerSettings::default()
        };

        settings.apply_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Apply overrides looked up through `lookup` (the environment in
    /// production). Unparseable booleans are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(builder) = lookup(env::BUILDER).filter(|v| !v.trim().is_empty()) {
            self.builder = builder.trim().to_string();
        }
        if let Some(dir) = lookup(env::LOG_DIR).filter(|v| !v.is_empty()) {
            self.log_directory = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(env::WORK_DIR).filter(|v| !v.is_empty()) {
            self.work_directory = Some(PathBuf::from(dir));
        }
        if let Some(print) = lookup(env::PRINT_LOG_TO_STDOUT)
            .as_deref()
            .and_then(StringUtil::convert_to_bool)
        {
            self.print_log_to_stdout = print;
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write settings file {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = RunnerSettings::load(&dir.path().join("absent.json")).unwrap();
        // Neutralise whatever the test environment carries.
        settings.apply_overrides(|_| None);
        assert_eq!(settings.builder, constants::DEFAULT_BUILDER);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = RunnerSettings {
            builder: "rpc-pool".to_string(),
            log_directory: Some(PathBuf::from("/var/log/jobs")),
            print_log_to_stdout: true,
            work_directory: None,
        };
        settings.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"Builder\": \"rpc-pool\""));
        let parsed: RunnerSettings = StringUtil::convert_from_json(&raw).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn builder_defaults_when_key_missing() {
        let parsed: RunnerSettings = StringUtil::convert_from_json(r#"{"PrintLogToStdout": true}"#).unwrap();
        assert_eq!(parsed.builder, "localhost");
        assert!(parsed.print_log_to_stdout);
    }

    #[test]
    fn overrides_apply_on_top_of_file_values() {
        let vars: HashMap<&str, &str> = [
            (env::BUILDER, " rpc "),
            (env::LOG_DIR, "/tmp/logs"),
            (env::PRINT_LOG_TO_STDOUT, "yes"),
        ]
        .into_iter()
        .collect();

        let mut settings = RunnerSettings::default();
        settings.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(settings.builder, "rpc");
        assert_eq!(settings.log_directory, Some(PathBuf::from("/tmp/logs")));
        assert!(settings.print_log_to_stdout);
        assert_eq!(settings.work_directory, None);
    }

    #[test]
    fn bad_boolean_override_is_ignored() {
        let mut settings = RunnerSettings::default();
        settings.apply_overrides(|name| {
            (name == env::PRINT_LOG_TO_STDOUT).then(|| "sometimes".to_string())
        });
        assert!(!settings.print_log_to_stdout);
    }
}
