//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub json_logs: bool,

    /// Also write daily rolling log files to the logs directory
    #[serde(default)]
    pub file_logs: bool,

    /// Active plan file, defaults to `plan.json` in the base directory
    #[serde(default)]
    pub plan_file: Option<String>,

    /// Where packages are fetched from
    #[serde(default)]
    pub repository: RepositorySettings,

    /// Plan update polling interval in seconds
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,

    /// Run and hot-swap the mission for the active plan
    #[serde(default = "default_true")]
    pub enable_observer: bool,

    /// Refresh artifacts from incoming plans
    #[serde(default)]
    pub enable_orchestrator: bool,

    /// Upper bound for a graceful shutdown in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_polling_interval() -> u64 {
    5
}

fn default_max_shutdown_delay() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            file_logs: false,
            plan_file: None,
            repository: RepositorySettings::default(),
            polling_interval_secs: default_polling_interval(),
            enable_observer: true,
            enable_orchestrator: false,
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

/// Package repository settings. A URL takes precedence over a directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositorySettings {
    /// Repository directory on disk
    #[serde(default)]
    pub path: Option<String>,

    /// Base URL of an HTTP repository
    #[serde(default)]
    pub url: Option<String>,
}
