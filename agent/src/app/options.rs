//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::mission::orchestrator;
use crate::storage::layout::StorageLayout;
use crate::workers::observer;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Package source
    pub repository: RepositoryOptions,

    /// Active plan file, defaults to the layout's plan file
    pub plan_file: Option<PathBuf>,

    /// How often plan sources are checked for updates
    pub plan_polling_interval: Duration,

    /// Run the mission observer worker
    pub enable_observer: bool,

    /// Run the orchestrator polling job
    pub enable_orchestrator: bool,

    /// Observer worker options
    pub observer: observer::Options,

    /// Orchestrator options
    pub orchestrator: orchestrator::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            repository: RepositoryOptions::default(),
            plan_file: None,
            plan_polling_interval: Duration::from_secs(5),
            enable_observer: true,
            enable_orchestrator: false,
            observer: observer::Options::default(),
            orchestrator: orchestrator::Options::default(),
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(60),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,
}

/// Where packages are fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryOptions {
    /// Repository directory on disk
    Directory(PathBuf),

    /// Base URL of an HTTP repository
    Http(String),
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        RepositoryOptions::Directory(PathBuf::from("repository"))
    }
}
