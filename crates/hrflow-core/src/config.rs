//! HRFlow configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{HrFlowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HrFlowConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Per-job overrides keyed by job name (`morning_checkin`, `weekly_report`, ...).
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

impl HrFlowConfig {
    /// Load config from the default path (~/.hrflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HrFlowError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HrFlowError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| HrFlowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the HRFlow home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hrflow")
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.hrflow/hrflow.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Sender identity and template settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// `smtp` or `log` (dry run, mails are only written to the log).
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Directory with `<template_id>.txt` overrides.
    #[serde(default)]
    pub templates_dir: Option<String>,
    #[serde(default)]
    pub html: bool,
}

fn default_transport() -> String { "log".into() }
fn default_from_address() -> String { "noreply@hrflow.local".into() }
fn default_from_name() -> String { "HR Team".into() }

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            from_address: default_from_address(),
            from_name: default_from_name(),
            templates_dir: None,
            html: false,
        }
    }
}

impl MailConfig {
    /// Sender header value, e.g. `HR Team <noreply@hrflow.local>`.
    pub fn sender(&self) -> String {
        if self.from_name.is_empty() {
            self.from_address.clone()
        } else {
            format!("{} <{}>", self.from_name, self.from_address)
        }
    }
}

/// SMTP relay settings (STARTTLS).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_smtp_host() -> String { "localhost".into() }
fn default_smtp_port() -> u16 { 587 }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// Dispatch pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Max mails in flight per job run.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound on a single delivery attempt.
    #[serde(default = "default_deliver_timeout")]
    pub deliver_timeout_secs: u64,
    /// Attempts to commit the guard after a successful delivery.
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,
    /// A send claimed by a worker that never finished it may be taken over
    /// after this long.
    #[serde(default = "default_claim_ttl")]
    pub claim_ttl_secs: u64,
}

fn default_concurrency() -> usize { 8 }
fn default_deliver_timeout() -> u64 { 30 }
fn default_commit_retries() -> u32 { 3 }
fn default_claim_ttl() -> u64 { 600 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            deliver_timeout_secs: default_deliver_timeout(),
            commit_retries: default_commit_retries(),
            claim_ttl_secs: default_claim_ttl(),
        }
    }
}

/// In-process timer loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// How long a job run holds its database lease. Another process may
    /// start the same job once a lease has expired.
    #[serde(default = "default_job_lease")]
    pub job_lease_secs: u64,
}

fn default_check_interval() -> u64 { 30 }
fn default_job_lease() -> u64 { 3600 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            job_lease_secs: default_job_lease(),
        }
    }
}

/// Per-job override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// 5-field cron expression replacing the job's default cadence.
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn bool_true() -> bool { true }

impl Default for JobConfig {
    fn default() -> Self {
        Self { cron: None, enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = HrFlowConfig::parse("").unwrap();
        assert_eq!(config.mail.transport, "log");
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.dispatch.concurrency, 8);
        assert_eq!(config.dispatch.deliver_timeout_secs, 30);
        assert_eq!(config.scheduler.check_interval_secs, 30);
        assert_eq!(config.dispatch.claim_ttl_secs, 600);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_job_overrides() {
        let config = HrFlowConfig::parse(
            r#"
            [mail]
            transport = "smtp"
            from_address = "hr@example.com"

            [jobs.late_checkin]
            cron = "*/15 9-11 * * 1-5"

            [jobs.weekly_report]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.mail.transport, "smtp");
        assert_eq!(config.mail.sender(), "HR Team <hr@example.com>");
        assert_eq!(
            config.jobs["late_checkin"].cron.as_deref(),
            Some("*/15 9-11 * * 1-5")
        );
        assert!(config.jobs["late_checkin"].enabled);
        assert!(!config.jobs["weekly_report"].enabled);
        assert!(!config.jobs.contains_key("monthly_report"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = HrFlowConfig::parse("[dispatch\nconcurrency = ").unwrap_err();
        assert!(matches!(err, HrFlowError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = HrFlowConfig::default();
        config.dispatch.commit_retries = 5;
        config.save_to(&path).unwrap();
        let loaded = HrFlowConfig::load_from(&path).unwrap();
        assert_eq!(loaded.dispatch.commit_retries, 5);
        assert_eq!(loaded.scheduler.job_lease_secs, 3600);
    }
}
