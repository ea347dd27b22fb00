//! Supervision handle for one deployed appliance

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mission_models::{DeploymentUnit, Plan, StatusModel};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::appliance::signal::{SignalController, SIGNAL_DIR_ENV};
use crate::errors::AgentError;

/// Interval between signal reads while waiting for a start
pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Owns the OS process of one deployment unit.
///
/// Start and stop are commands, not transitions: whether the appliance is up
/// or down is answered by its signal controller, since the launched process
/// may be a shim for the real appliance.
pub struct Appliance {
    plan: Arc<Plan>,
    unit: DeploymentUnit,
    signals: Arc<dyn SignalController>,
    process: Mutex<Option<Child>>,
    launches: AtomicU32,
}

impl Appliance {
    pub fn new(plan: Arc<Plan>, unit: DeploymentUnit, signals: Arc<dyn SignalController>) -> Self {
        Self {
            plan,
            unit,
            signals,
            process: Mutex::new(None),
            launches: AtomicU32::new(0),
        }
    }

    pub fn unit(&self) -> &DeploymentUnit {
        &self.unit
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn alias(&self) -> &str {
        self.unit.display_name()
    }

    /// How many times the process was launched
    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    /// PID of the most recently launched process
    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|child| child.id())
    }

    /// Reset the signals and launch the process. Does not wait for readiness.
    pub async fn start(&self) -> Result<(), AgentError> {
        self.signals.reset().await?;

        let mut process = self.process.lock().await;
        if let Some(previous) = process.as_mut() {
            match previous.try_wait() {
                Ok(Some(status)) => debug!("{} previous process exited with {}", self.alias(), status),
                Ok(None) => warn!("{} previous process is still running, launching again", self.alias()),
                Err(e) => warn!("{} previous process state unknown: {}", self.alias(), e),
            }
        }

        let child = self.command().spawn().map_err(|e| {
            AgentError::ProcessError(format!(
                "Failed to launch {} ({}): {}",
                self.alias(),
                self.unit.assembly,
                e
            ))
        })?;

        info!(
            "Launched {} ({} {}) pid {:?}",
            self.alias(),
            self.unit.name,
            self.unit.build,
            child.id()
        );
        *process = Some(child);
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Poll until the appliance announces itself or the plan's start budget
    /// runs out. `false` means "not confirmed yet", not "failed".
    pub async fn wait_for_start(&self) -> bool {
        let deadline = Instant::now() + self.plan.wait_for_start();
        loop {
            if self.signals.has_started().await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(SIGNAL_POLL_INTERVAL).await;
        }
    }

    /// Ask the appliance to stop. Confirmation comes through `has_stopped`.
    pub async fn stop(&self) -> Result<(), AgentError> {
        debug!("Requesting stop of {}", self.alias());
        self.signals.request_stop().await
    }

    pub async fn has_started(&self) -> bool {
        self.signals.has_started().await
    }

    pub async fn has_stopped(&self) -> bool {
        self.signals.has_stopped().await
    }

    /// Release the process handle. A still-running process is left alone.
    pub async fn dispose(&self) {
        if let Some(mut child) = self.process.lock().await.take() {
            if let Ok(None) = child.try_wait() {
                debug!("{} released while its process is still running", self.alias());
            }
        }
    }

    pub async fn status(&self) -> StatusModel {
        StatusModel::from_unit(
            &self.unit,
            self.signals.has_started().await,
            self.signals.has_stopped().await,
        )
    }

    fn command(&self) -> Command {
        let install_dir = Path::new(&self.unit.installation_location);
        let mut command = Command::new(resolve_program(install_dir, &self.unit.assembly));
        command
            .args(&self.unit.arguments)
            .current_dir(install_dir)
            .env(SIGNAL_DIR_ENV, self.signals.signal_dir())
            .env("MISSION_APPLIANCE_NAME", &self.unit.name)
            .env("MISSION_APPLIANCE_ALIAS", self.alias())
            .env("MISSION_APPLIANCE_UID", &self.unit.uid)
            .env(
                "MISSION_APPLIANCE_CONFIGURATION",
                self.unit.configuration.to_string(),
            )
            .stdin(Stdio::null());

        #[cfg(windows)]
        if !self.unit.show_window {
            command.creation_flags(CREATE_NO_WINDOW);
        }

        command
    }
}

/// A relative assembly shipped in the package wins over one on `PATH`
fn resolve_program(install_dir: &Path, assembly: &str) -> PathBuf {
    let candidate = Path::new(assembly);
    if candidate.is_relative() {
        let packaged = install_dir.join(candidate);
        if packaged.is_file() {
            return packaged;
        }
    }
    candidate.to_path_buf()
}
