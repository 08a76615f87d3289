//! TaskHub configuration system.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TaskHubError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskHubConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl TaskHubConfig {
    /// Load config from the default path (~/.taskhub/config.toml).
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
            .map_err(|e| TaskHubError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TaskHubError::Config(format!("Failed to parse config: {e}")))?;
        config.scheduler.offset()?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the TaskHub home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskhub")
    }
}

/// Scheduler and reminder scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// UTC offset used for cron evaluation, e.g. "+07:00".
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_every_five_minutes")]
    pub deadline_scan_cron: String,
    #[serde(default = "default_deadline_window")]
    pub deadline_window_mins: i64,
    #[serde(default = "default_digest_cron")]
    pub digest_cron: String,
    #[serde(default = "default_every_five_minutes")]
    pub overtime_scan_cron: String,
    #[serde(default = "default_overtime_grace")]
    pub overtime_grace_mins: i64,
    #[serde(default = "default_midnight_cron")]
    pub ledger_sweep_cron: String,
}

fn default_timezone() -> String { "+00:00".into() }
fn default_check_interval() -> u64 { 30 }
fn default_every_five_minutes() -> String { "*/5 * * * *".into() }
fn default_deadline_window() -> i64 { 30 }
fn default_digest_cron() -> String { "0 8 * * *".into() }
fn default_overtime_grace() -> i64 { 10 }
fn default_midnight_cron() -> String { "0 0 * * *".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            check_interval_secs: default_check_interval(),
            deadline_scan_cron: default_every_five_minutes(),
            deadline_window_mins: default_deadline_window(),
            digest_cron: default_digest_cron(),
            overtime_scan_cron: default_every_five_minutes(),
            overtime_grace_mins: default_overtime_grace(),
            ledger_sweep_cron: default_midnight_cron(),
        }
    }
}

impl SchedulerConfig {
    /// The configured timezone as a fixed UTC offset.
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.timezone)
    }
}

/// Parse "+HH:MM", "-HH:MM", "+HHMM", "Z" or "UTC" into a fixed offset.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }
    s.parse::<FixedOffset>()
        .map_err(|e| TaskHubError::Config(format!("Invalid timezone offset '{s}': {e}")))
}

/// Notification dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_push_batch_size")]
    pub push_batch_size: usize,
    #[serde(default = "default_push_batch_delay")]
    pub push_batch_delay_ms: u64,
    #[serde(default = "default_receipt_delay")]
    pub receipt_delay_secs: u64,
    #[serde(default = "default_push_url")]
    pub push_url: String,
    #[serde(default = "default_receipts_url")]
    pub receipts_url: String,
    #[serde(default)]
    pub push_access_token: Option<String>,
}

fn default_push_batch_size() -> usize { 100 }
fn default_push_batch_delay() -> u64 { 100 }
fn default_receipt_delay() -> u64 { 30 }
fn default_push_url() -> String { "https://exp.host/--/api/v2/push/send".into() }
fn default_receipts_url() -> String { "https://exp.host/--/api/v2/push/getReceipts".into() }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            push_batch_size: default_push_batch_size(),
            push_batch_delay_ms: default_push_batch_delay(),
            receipt_delay_secs: default_receipt_delay(),
            push_url: default_push_url(),
            receipts_url: default_receipts_url(),
            push_access_token: None,
        }
    }
}

/// Outbound SMTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

fn default_smtp_port() -> u16 { 587 }
fn default_display_name() -> String { "TaskHub".into() }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            display_name: default_display_name(),
        }
    }
}

/// Read-through cache TTLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_task_ttl")]
    pub task_ttl_secs: u64,
    #[serde(default = "default_list_ttl")]
    pub list_ttl_secs: u64,
}

fn default_task_ttl() -> u64 { 300 }
fn default_list_ttl() -> u64 { 60 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            task_ttl_secs: default_task_ttl(),
            list_ttl_secs: default_list_ttl(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.taskhub/taskhub.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

impl StoreConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TaskHubConfig::default();
        assert_eq!(config.scheduler.deadline_window_mins, 30);
        assert_eq!(config.scheduler.overtime_grace_mins, 10);
        assert_eq!(config.notify.push_batch_size, 100);
        assert_eq!(config.notify.receipt_delay_secs, 30);
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [scheduler]
            timezone = "+07:00"
            digest_cron = "0 9 * * *"

            [notify]
            push_batch_size = 50

            [email]
            enabled = true
            smtp_host = "smtp.example.com"
            from_address = "noreply@example.com"
        "#;

        let config: TaskHubConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.digest_cron, "0 9 * * *");
        assert_eq!(config.scheduler.offset().unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(config.notify.push_batch_size, 50);
        assert!(config.email.enabled);
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: TaskHubConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.check_interval_secs, 30);
        assert_eq!(config.cache.task_ttl_secs, 300);
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("+0100").unwrap().local_minus_utc(), 3600);
        assert!(parse_utc_offset("Asia/Ho_Chi_Minh").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("+07:00 ").is_ok());
        assert!(parse_utc_offset("0700").is_err());
        assert!(matches!(parse_utc_offset("+7h"), Err(TaskHubError::Config(_))));
    }

    #[test]
    fn test_home_dir() {
        let home = TaskHubConfig::home_dir();
        assert!(home.to_string_lossy().contains("taskhub"));
    }
}
