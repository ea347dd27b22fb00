//! Cross-process start/stop signaling through sentinel files
//!
//! The supervising agent (host role) and the supervised appliance (appliance
//! role) share nothing but a directory under the appliance's install
//! location:
//!
//! - `started` is written by the appliance on boot and holds its PID
//! - `stopped` is written by the appliance once shutdown finished
//! - `stop-requested` is written by the host to ask for a shutdown
//!
//! A `started` sentinel whose PID is no longer alive also counts as stopped,
//! so a crashed appliance becomes visible without its cooperation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::debug;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;

/// Name of the signal directory inside an install location
pub const SIGNAL_DIR_NAME: &str = ".mission-signal";

/// Environment variable carrying the signal directory to the appliance
pub const SIGNAL_DIR_ENV: &str = "MISSION_SIGNAL_DIR";

const STARTED: &str = "started";
const STOPPED: &str = "stopped";
const STOP_REQUESTED: &str = "stop-requested";

/// Start/stop state channel between host and appliance
#[async_trait]
pub trait SignalController: Send + Sync {
    /// Host: clear every signal before a fresh start attempt
    async fn reset(&self) -> Result<(), AgentError>;

    /// Host: ask the appliance to stop. Does not wait.
    async fn request_stop(&self) -> Result<(), AgentError>;

    /// Appliance: announce that boot completed
    async fn started(&self) -> Result<(), AgentError>;

    /// Appliance: announce that shutdown completed
    async fn stopped(&self) -> Result<(), AgentError>;

    /// Appliance: whether the host asked for a stop
    async fn stop_requested(&self) -> bool;

    async fn has_started(&self) -> bool;

    async fn has_stopped(&self) -> bool;

    /// Directory handed to the launched process
    fn signal_dir(&self) -> &Path;
}

/// Creates host-role controllers for install directories
pub trait SignalProvider: Send + Sync {
    fn host_controller(&self, install_dir: &Path) -> Arc<dyn SignalController>;
}

/// Which side of the protocol a controller speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRole {
    Host,
    Appliance,
}

/// Sentinel-file signal controller
#[derive(Debug, Clone)]
pub struct FileSignalController {
    dir: Dir,
    role: SignalRole,
}

impl FileSignalController {
    /// Host-owner controller for an install directory
    pub fn host(install_dir: &Path) -> Self {
        Self {
            dir: Dir::new(install_dir.join(SIGNAL_DIR_NAME)),
            role: SignalRole::Host,
        }
    }

    /// Appliance-side controller for a signal directory
    pub fn appliance(signal_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Dir::new(signal_dir),
            role: SignalRole::Appliance,
        }
    }

    /// Appliance-side controller from the launch environment
    pub fn appliance_from_env() -> Result<Self, AgentError> {
        let dir = std::env::var(SIGNAL_DIR_ENV)
            .map_err(|_| AgentError::SignalError(format!("{} is not set", SIGNAL_DIR_ENV)))?;
        Ok(Self::appliance(dir))
    }

    pub fn role(&self) -> SignalRole {
        self.role
    }

    fn require(&self, role: SignalRole, operation: &str) -> Result<(), AgentError> {
        if self.role != role {
            return Err(AgentError::SignalError(format!(
                "{} is not allowed for a {:?} controller",
                operation, self.role
            )));
        }
        Ok(())
    }

    async fn recorded_pid(&self) -> Option<u32> {
        let contents = self.dir.file(STARTED).read_string().await.ok()?;
        contents.trim().parse().ok()
    }
}

#[async_trait]
impl SignalController for FileSignalController {
    async fn reset(&self) -> Result<(), AgentError> {
        self.require(SignalRole::Host, "reset")?;
        self.dir.create().await?;
        for name in [STARTED, STOPPED, STOP_REQUESTED] {
            self.dir.file(name).delete().await?;
        }
        debug!("Signals reset in {}", self.dir.path().display());
        Ok(())
    }

    async fn request_stop(&self) -> Result<(), AgentError> {
        self.require(SignalRole::Host, "request_stop")?;
        self.dir
            .file(STOP_REQUESTED)
            .write_string(&chrono::Utc::now().to_rfc3339())
            .await
    }

    async fn started(&self) -> Result<(), AgentError> {
        self.require(SignalRole::Appliance, "started")?;
        self.dir.file(STOPPED).delete().await?;
        self.dir
            .file(STARTED)
            .write_string(&std::process::id().to_string())
            .await
    }

    async fn stopped(&self) -> Result<(), AgentError> {
        self.require(SignalRole::Appliance, "stopped")?;
        self.dir
            .file(STOPPED)
            .write_string(&chrono::Utc::now().to_rfc3339())
            .await
    }

    async fn stop_requested(&self) -> bool {
        self.dir.file(STOP_REQUESTED).exists().await
    }

    async fn has_started(&self) -> bool {
        self.dir.file(STARTED).exists().await
    }

    async fn has_stopped(&self) -> bool {
        if self.dir.file(STOPPED).exists().await {
            return true;
        }
        if !self.has_started().await {
            return false;
        }
        match self.recorded_pid().await {
            Some(pid) => !process_alive(pid),
            None => false,
        }
    }

    fn signal_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Provider handing out [`FileSignalController`]s
#[derive(Debug, Clone, Default)]
pub struct FileSignalProvider;

impl SignalProvider for FileSignalProvider {
    fn host_controller(&self, install_dir: &Path) -> Arc<dyn SignalController> {
        Arc::new(FileSignalController::host(install_dir))
    }
}

fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    match system.process(pid) {
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        None => false,
    }
}
