//! Keeps deployed artifacts in step with the plan source

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mission_models::Plan;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::AgentError;
use crate::mission::outcome::Outcome;
use crate::mission::traits::{
    ApplianceInstaller, ApplianceLoader, PlanFactory, PlanSource, PlanWriter,
};

const GROUP: &str = "orchestrator";

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between plan update checks
    pub polling_interval: Duration,

    /// How long `terminate` waits for the polling job
    pub max_shutdown_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(5),
            max_shutdown_delay: Duration::from_secs(10),
        }
    }
}

/// Hook applied to every freshly created plan before artifacts are refreshed
#[async_trait]
pub trait PlanConfigurator: Send + Sync {
    async fn configure_plan(
        &self,
        plan: &mut Plan,
        factory: &dyn PlanFactory,
    ) -> Result<(), AgentError> {
        factory.create_repository_version(plan);
        Ok(())
    }
}

/// Stamps a fresh repository version and nothing else
#[derive(Debug, Clone, Default)]
pub struct VersionStamper;

impl PlanConfigurator for VersionStamper {}

struct OrchestratorRun {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<Result<(), AgentError>>,
}

struct OrchestratorCore {
    options: Options,
    source: Arc<dyn PlanSource>,
    factory: Arc<dyn PlanFactory>,
    configurator: Arc<dyn PlanConfigurator>,
    loader: Arc<dyn ApplianceLoader>,
    installer: Arc<dyn ApplianceInstaller>,
    writer: Arc<dyn PlanWriter>,
}

/// Polls the plan source and refreshes artifacts on change. Never starts
/// anything.
pub struct MissionOrchestrator {
    core: Arc<OrchestratorCore>,
    runner: tokio::sync::Mutex<Option<OrchestratorRun>>,
}

impl MissionOrchestrator {
    pub fn new(
        options: Options,
        source: Arc<dyn PlanSource>,
        factory: Arc<dyn PlanFactory>,
        loader: Arc<dyn ApplianceLoader>,
        installer: Arc<dyn ApplianceInstaller>,
        writer: Arc<dyn PlanWriter>,
    ) -> Self {
        Self {
            core: Arc::new(OrchestratorCore {
                options,
                source,
                factory,
                configurator: Arc::new(VersionStamper),
                loader,
                installer,
                writer,
            }),
            runner: tokio::sync::Mutex::new(None),
        }
    }

    /// Replace the plan hook. Fails once the polling job holds the core.
    pub fn with_configurator(
        mut self,
        configurator: Arc<dyn PlanConfigurator>,
    ) -> Result<Self, AgentError> {
        match Arc::get_mut(&mut self.core) {
            Some(core) => {
                core.configurator = configurator;
                Ok(self)
            }
            None => {
                warn!("Plan configurator replaced while the orchestrator is shared");
                Err(AgentError::ConfigError(
                    "plan configurator must be set before the orchestrator runs".to_string(),
                ))
            }
        }
    }

    /// One poll-and-react cycle. Returns whether a new plan was applied.
    pub async fn run_once(&self) -> Result<bool, AgentError> {
        self.core.run_once().await
    }

    /// Spawn the polling job
    pub async fn run(&self) -> Outcome {
        let mut runner = self.runner.lock().await;
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Outcome::failed(GROUP, "run", "Orchestrator is already running");
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let core = self.core.clone();
        let handle = tokio::spawn(async move { core.poll(shutdown_rx).await });
        *runner = Some(OrchestratorRun {
            shutdown_tx,
            handle,
        });

        let mut outcome = Outcome::new();
        outcome.info(
            GROUP,
            "run",
            format!(
                "Polling for plan updates every {:?}",
                self.core.options.polling_interval
            ),
        );
        outcome
    }

    /// Stop the polling job. Reports the error the job ended with, if any.
    pub async fn terminate(&self) -> Outcome {
        let mut outcome = Outcome::new();
        let Some(run) = self.runner.lock().await.take() else {
            outcome.info(GROUP, "terminate", "Orchestrator is not running");
            return outcome;
        };

        let _ = run.shutdown_tx.send(());
        match tokio::time::timeout(self.core.options.max_shutdown_delay, run.handle).await {
            Ok(Ok(Ok(()))) => outcome.info(GROUP, "terminate", "Orchestrator terminated"),
            Ok(Ok(Err(e))) => outcome.error(GROUP, "terminate", format!("Plan refresh failed: {}", e)),
            Ok(Err(e)) => outcome.error(GROUP, "terminate", format!("Polling job failed: {}", e)),
            Err(_) => outcome.violation(
                GROUP,
                "terminate",
                format!(
                    "Orchestrator did not terminate within {:?}",
                    self.core.options.max_shutdown_delay
                ),
            ),
        }
        outcome
    }

    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl OrchestratorCore {
    async fn poll(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), AgentError> {
        info!("Orchestrator polling starting...");

        loop {
            if let Err(e) = self.run_once().await {
                error!("Plan refresh failed, orchestrator stopping: {}", e);
                return Err(e);
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Orchestrator polling shutting down...");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.options.polling_interval) => {}
            }
        }
    }

    async fn run_once(&self) -> Result<bool, AgentError> {
        if !self.source.has_updated_plan().await? {
            debug!("No plan update");
            return Ok(false);
        }

        let mut plan = self.factory.create(self.source.as_ref(), true).await?;
        info!(
            "Plan {} updated, refreshing {} unit(s)",
            plan.name,
            plan.deployments.len()
        );

        self.configurator
            .configure_plan(&mut plan, self.factory.as_ref())
            .await?;

        self.loader.clean(&plan).await?;
        self.installer.clean(&plan).await?;

        // One load/install pair per name and build in each pass
        let mut processed: HashSet<String> = HashSet::new();
        let snapshot = plan.clone();
        for unit in plan.deployments.iter_mut() {
            if !processed.insert(unit.artifact_key()) {
                debug!(
                    "{} already processed, skipping {}",
                    unit.artifact_key(),
                    unit.display_name()
                );
                continue;
            }
            self.loader.load(&snapshot, unit).await?;
            self.installer.install(&snapshot, unit).await?;
        }

        self.factory.save(&plan, self.writer.as_ref()).await?;
        info!(
            "Plan {} version {} saved, {}/{} unit(s) installed",
            plan.name,
            plan.repository_version,
            plan.installed_count(),
            plan.deployments.len()
        );
        Ok(true)
    }
}
