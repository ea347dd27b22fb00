//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the agent
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Active plan, watched by the mission observer
    pub fn plan_file(&self) -> File {
        File::new(self.base_dir.join("plan.json"))
    }

    /// Plans dropped here are picked up by the orchestrator
    pub fn incoming_plan_file(&self) -> File {
        File::new(self.base_dir.join("incoming-plan.json"))
    }

    /// Fetched packages
    pub fn repository_cache_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("repository-cache"))
    }

    /// Installed appliances
    pub fn appliances_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("appliances"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), AgentError> {
        self.repository_cache_dir().create().await?;
        self.appliances_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/mission-agent");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mission-agent");

        Self::new(base_dir)
    }
}
