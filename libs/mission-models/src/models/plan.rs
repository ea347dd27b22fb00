//! Plan models

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One deployment wave: phase gates, bounded-wait budgets and the ordered
/// list of appliances to deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Fingerprint of the artifact source
    #[serde(default)]
    pub repository_version: String,

    /// Plan name
    pub name: String,

    /// Fetch and install artifacts
    #[serde(default = "default_true")]
    pub deploy_appliances: bool,

    /// Launch installed appliances
    #[serde(default = "default_true")]
    pub start_appliances: bool,

    /// Refuse to start anything unless every unit installed
    #[serde(default)]
    pub all_appliances_must_deploy: bool,

    #[serde(default = "default_wait_for_deploy")]
    pub wait_for_deploy_seconds: u64,

    #[serde(default = "default_wait_for_start")]
    pub wait_for_start_seconds: u64,

    #[serde(default = "default_wait_for_stop")]
    pub wait_for_stop_seconds: u64,

    /// Deployment units, in launch order
    #[serde(default)]
    pub deployments: Vec<DeploymentUnit>,
}

fn default_true() -> bool {
    true
}

fn default_wait_for_deploy() -> u64 {
    300
}

fn default_wait_for_start() -> u64 {
    30
}

fn default_wait_for_stop() -> u64 {
    30
}

impl Plan {
    /// Create an empty plan with default gates and budgets
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            repository_version: String::new(),
            name: name.into(),
            deploy_appliances: true,
            start_appliances: true,
            all_appliances_must_deploy: false,
            wait_for_deploy_seconds: default_wait_for_deploy(),
            wait_for_start_seconds: default_wait_for_start(),
            wait_for_stop_seconds: default_wait_for_stop(),
            deployments: Vec::new(),
        }
    }

    pub fn wait_for_deploy(&self) -> Duration {
        Duration::from_secs(self.wait_for_deploy_seconds)
    }

    pub fn wait_for_start(&self) -> Duration {
        Duration::from_secs(self.wait_for_start_seconds)
    }

    pub fn wait_for_stop(&self) -> Duration {
        Duration::from_secs(self.wait_for_stop_seconds)
    }

    /// Number of units that finished installation
    pub fn installed_count(&self) -> usize {
        self.deployments.iter().filter(|u| u.has_installed).count()
    }
}

/// A single appliance: its declared identity and execution settings plus the
/// state observed while loading and installing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    pub name: String,

    /// Distinguishes several instances of the same appliance
    #[serde(default)]
    pub alias: String,

    pub build: String,

    /// Per-instantiation identifier
    #[serde(default)]
    pub uid: String,

    /// SHA-256 of the package, hex encoded. Empty skips verification.
    #[serde(default)]
    pub checksum: String,

    /// Command launched from the installation directory
    pub assembly: String,

    #[serde(default)]
    pub arguments: Vec<String>,

    #[serde(default)]
    pub repository_location: String,

    #[serde(default)]
    pub installation_location: String,

    /// Opaque payload handed to the launched process
    #[serde(default)]
    pub configuration: serde_json::Value,

    #[serde(default = "default_true")]
    pub deploy: bool,

    #[serde(default)]
    pub show_window: bool,

    #[serde(default)]
    pub wait_for_start: bool,

    #[serde(skip)]
    pub has_loaded: bool,

    #[serde(skip)]
    pub has_installed: bool,

    /// Fetched package bytes, empty until loaded
    #[serde(skip)]
    pub repository_content: Vec<u8>,
}

impl DeploymentUnit {
    /// Create a unit with the given identity and command
    pub fn new(
        name: impl Into<String>,
        build: impl Into<String>,
        assembly: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            build: build.into(),
            uid: String::new(),
            checksum: String::new(),
            assembly: assembly.into(),
            arguments: Vec::new(),
            repository_location: String::new(),
            installation_location: String::new(),
            configuration: serde_json::Value::Null,
            deploy: true,
            show_window: false,
            wait_for_start: false,
            has_loaded: false,
            has_installed: false,
            repository_content: Vec::new(),
        }
    }

    /// Artifact identity, shared by every alias of the same build
    pub fn artifact_key(&self) -> String {
        format!("{}-{}", self.name, self.build)
    }

    /// Alias when set, otherwise the name
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }

    /// Drop everything observed by a previous load/install
    pub fn clear_observed(&mut self) {
        self.has_loaded = false;
        self.has_installed = false;
        self.repository_content.clear();
    }
}
