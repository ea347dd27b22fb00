//! Mission lifecycle: clean, deploy, start, supervise, stop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::join_all;
use mission_models::{DeploymentUnit, Plan, StatusModel};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::appliance::{Appliance, ApplianceFactory};
use crate::errors::AgentError;
use crate::mission::fsm::{MissionEvent, MissionFsm, MissionState};
use crate::mission::outcome::Outcome;
use crate::mission::traits::{ApplianceInstaller, ApplianceLoader};

/// Supervision and stop polling interval
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Pause between detecting a crash and relaunching
const RESTART_DELAY: Duration = Duration::from_millis(20);

/// Extra time `terminate` grants on top of the plan's stop budget
const TERMINATE_GRACE: Duration = Duration::from_secs(10);

const GROUP_CLEAN: &str = "clean";
const GROUP_DEPLOY: &str = "deploy";
const GROUP_START: &str = "start";
const GROUP_STOP: &str = "stop";
const GROUP_RUN: &str = "run";

/// Snapshot of a mission for external reporting
#[derive(Debug, Clone, Serialize)]
pub struct MissionStatus {
    pub name: String,
    pub repository_version: String,
    pub state: MissionState,
    pub running: bool,
    pub start_complete: bool,
    pub deployments: Vec<StatusModel>,
    pub result: Outcome,
}

/// What one deploy job produced for its unit
struct UnitDeployment {
    index: usize,
    unit: DeploymentUnit,
    result: Result<(), AgentError>,
}

struct RunHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// State shared between the mission handle and its background run
struct MissionCore {
    plan: RwLock<Arc<Plan>>,
    loader: Arc<dyn ApplianceLoader>,
    installer: Arc<dyn ApplianceInstaller>,
    factory: ApplianceFactory,
    fsm: Mutex<MissionFsm>,
    appliances: RwLock<Vec<Arc<Appliance>>>,
    run_result: Mutex<Outcome>,
    start_phase_done: AtomicBool,
}

/// The active supervision session for one plan
pub struct Mission {
    core: Arc<MissionCore>,
    runner: tokio::sync::Mutex<Option<RunHandle>>,
}

impl Mission {
    pub fn new(
        plan: Plan,
        loader: Arc<dyn ApplianceLoader>,
        installer: Arc<dyn ApplianceInstaller>,
        factory: ApplianceFactory,
    ) -> Self {
        Self {
            core: Arc::new(MissionCore {
                plan: RwLock::new(Arc::new(plan)),
                loader,
                installer,
                factory,
                fsm: Mutex::new(MissionFsm::new()),
                appliances: RwLock::new(Vec::new()),
                run_result: Mutex::new(Outcome::new()),
                start_phase_done: AtomicBool::new(false),
            }),
            runner: tokio::sync::Mutex::new(None),
        }
    }

    /// Remove repository and installation state
    pub async fn clean(&self) -> Outcome {
        let outcome = self.core.clean().await;
        self.core.record(&outcome);
        outcome
    }

    /// Load and install every unit concurrently
    pub async fn deploy(&self) -> Outcome {
        let outcome = self.core.deploy().await;
        self.core.record(&outcome);
        outcome
    }

    /// Launch installed units in plan order
    pub async fn start(&self) -> Outcome {
        let outcome = self.core.start().await;
        self.core.record(&outcome);
        outcome
    }

    /// Signal every started appliance and wait for them to stop
    pub async fn stop(&self) -> Outcome {
        let outcome = self.core.stop().await;
        self.core.record(&outcome);
        outcome
    }

    /// Clear the aggregate outcome. Live appliances are not touched.
    pub fn reset(&self) {
        self.core.lock_result().clear();
    }

    /// Launch clean, deploy, start and supervision in the background.
    ///
    /// The outcome only reports whether the background run was launched.
    pub async fn run(&self) -> Outcome {
        let name = self.core.plan().name.clone();
        let mut runner = self.runner.lock().await;

        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Outcome::failed(GROUP_RUN, &name, "Mission is already running");
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let core = self.core.clone();
        let handle = tokio::spawn(async move {
            core.run_to_completion(shutdown_rx).await;
        });
        *runner = Some(RunHandle {
            shutdown_tx,
            handle,
        });

        let mut outcome = Outcome::new();
        outcome.info(GROUP_RUN, &name, "Mission run started");
        self.core.record(&outcome);
        outcome
    }

    /// Stop the background run and wait for its stop phase to finish
    pub async fn terminate(&self) -> Outcome {
        let plan = self.core.plan();
        let mut outcome = Outcome::new();

        let Some(run) = self.runner.lock().await.take() else {
            outcome.info(GROUP_RUN, &plan.name, "Mission is not running");
            return outcome;
        };

        info!("Terminating mission {}...", plan.name);
        let _ = run.shutdown_tx.send(());

        let max_wait = plan.wait_for_stop() + TERMINATE_GRACE;
        match tokio::time::timeout(max_wait, run.handle).await {
            Ok(Ok(())) => outcome.info(GROUP_RUN, &plan.name, "Mission terminated"),
            Ok(Err(e)) => outcome.error(GROUP_RUN, &plan.name, format!("Mission run failed: {}", e)),
            Err(_) => outcome.violation(
                GROUP_RUN,
                &plan.name,
                format!("Mission did not terminate within {:?}", max_wait),
            ),
        }

        self.core.record(&outcome);
        outcome
    }

    /// Whether a background run is active
    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn state(&self) -> MissionState {
        self.core.state()
    }

    /// The plan as last observed by this mission
    pub fn plan(&self) -> Arc<Plan> {
        self.core.plan()
    }

    /// Aggregate outcome of every phase since the last reset
    pub fn run_result(&self) -> Outcome {
        self.core.lock_result().clone()
    }

    /// The start phase ran and every live appliance reports started
    pub async fn start_complete(&self) -> bool {
        self.core.start_phase_done.load(Ordering::SeqCst) && all_started(&self.core.live()).await
    }

    /// Status of every live appliance
    pub async fn get_appliances(&self) -> Vec<StatusModel> {
        let live = self.core.live();
        join_all(live.iter().map(|a| a.status())).await
    }

    /// Status of the mission and every unit in its plan
    pub async fn get_status(&self) -> MissionStatus {
        let plan = self.core.plan();
        let live = self.core.live();

        let mut deployments = Vec::with_capacity(plan.deployments.len());
        for unit in &plan.deployments {
            let appliance = live
                .iter()
                .find(|a| a.unit().uid == unit.uid && a.unit().alias == unit.alias);
            let status = match appliance {
                Some(appliance) => {
                    let mut status = appliance.status().await;
                    status.has_loaded = unit.has_loaded;
                    status.has_installed = unit.has_installed;
                    status
                }
                None => StatusModel::from_unit(unit, false, false),
            };
            deployments.push(status);
        }

        MissionStatus {
            name: plan.name.clone(),
            repository_version: plan.repository_version.clone(),
            state: self.core.state(),
            running: self.is_running().await,
            start_complete: self.start_complete().await,
            deployments,
            result: self.run_result(),
        }
    }

    pub async fn get_status_as_json(&self) -> Result<String, AgentError> {
        let status = self.get_status().await;
        Ok(serde_json::to_string_pretty(&status)?)
    }
}

impl MissionCore {
    fn plan(&self) -> Arc<Plan> {
        self.plan.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update_plan(&self, update: impl FnOnce(&mut Plan)) {
        let mut guard = self.plan.write().unwrap_or_else(|e| e.into_inner());
        let mut plan = Plan::clone(&guard);
        update(&mut plan);
        *guard = Arc::new(plan);
    }

    fn live(&self) -> Vec<Arc<Appliance>> {
        self.appliances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_result(&self) -> std::sync::MutexGuard<'_, Outcome> {
        self.run_result.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, outcome: &Outcome) {
        self.lock_result().absorb(outcome);
    }

    fn state(&self) -> MissionState {
        self.fsm.lock().unwrap_or_else(|e| e.into_inner()).state()
    }

    fn transition(&self, event: MissionEvent) -> Result<(), String> {
        self.fsm
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .process(event)
    }

    fn finish(&self, event: MissionEvent) {
        if let Err(e) = self.transition(event) {
            warn!("Mission state not advanced: {}", e);
        }
    }

    async fn clean(&self) -> Outcome {
        let plan = self.plan();
        let mut outcome = Outcome::new();

        if let Err(e) = self.transition(MissionEvent::Clean) {
            outcome.violation(GROUP_CLEAN, &plan.name, format!("Clean rejected: {}", e));
            return outcome;
        }

        if any_running(&self.live()).await {
            outcome.violation(
                GROUP_CLEAN,
                &plan.name,
                "Clean rejected: appliances of this mission are still running",
            );
            self.finish(MissionEvent::Abort);
            return outcome;
        }

        if !plan.deploy_appliances {
            outcome.info(
                GROUP_CLEAN,
                &plan.name,
                "Clean skipped: plan does not deploy appliances",
            );
            self.finish(MissionEvent::CleanDone);
            return outcome;
        }

        info!("Cleaning repository and installation for plan {}", plan.name);
        let cleaned = async {
            self.loader.clean(&plan).await?;
            self.installer.clean(&plan).await
        }
        .await;

        match cleaned {
            Ok(()) => {
                self.update_plan(|plan| plan.deployments.iter_mut().for_each(|u| u.clear_observed()));
                outcome.info(GROUP_CLEAN, &plan.name, "Repository and installation cleaned");
            }
            Err(e) => {
                error!("Clean failed for plan {}: {}", plan.name, e);
                outcome.error(GROUP_CLEAN, &plan.name, e.to_string());
            }
        }

        self.finish(MissionEvent::CleanDone);
        outcome
    }

    async fn deploy(&self) -> Outcome {
        let plan = self.plan();
        let mut outcome = Outcome::new();

        if let Err(e) = self.transition(MissionEvent::Deploy) {
            outcome.violation(GROUP_DEPLOY, &plan.name, format!("Deploy rejected: {}", e));
            return outcome;
        }

        if !plan.deploy_appliances {
            outcome.info(
                GROUP_DEPLOY,
                &plan.name,
                "Deploy skipped: plan does not deploy appliances",
            );
            self.finish(MissionEvent::DeployDone);
            return outcome;
        }

        info!(
            "Deploying {} unit(s) of plan {}",
            plan.deployments.len(),
            plan.name
        );
        let started_at = Instant::now();

        let mut jobs = JoinSet::new();
        for (index, unit) in plan.deployments.iter().enumerate() {
            let plan = plan.clone();
            let loader = self.loader.clone();
            let installer = self.installer.clone();
            let mut unit = unit.clone();
            jobs.spawn(async move {
                let result = deploy_unit(&plan, &mut unit, loader.as_ref(), installer.as_ref()).await;
                UnitDeployment {
                    index,
                    unit,
                    result,
                }
            });
        }

        let deadline = started_at + plan.wait_for_deploy();
        let mut finished = Vec::with_capacity(plan.deployments.len());
        loop {
            match tokio::time::timeout_at(deadline, jobs.join_next()).await {
                Ok(Some(Ok(done))) => {
                    match &done.result {
                        Ok(()) if done.unit.has_installed => outcome.info(
                            GROUP_DEPLOY,
                            done.unit.display_name(),
                            format!("Installed to {}", done.unit.installation_location),
                        ),
                        Ok(()) => {
                            outcome.info(GROUP_DEPLOY, done.unit.display_name(), "Not deployed")
                        }
                        Err(e) => {
                            error!("Deployment of {} failed: {}", done.unit.display_name(), e);
                            outcome.error(GROUP_DEPLOY, done.unit.display_name(), e.to_string());
                        }
                    }
                    finished.push(done);
                }
                Ok(Some(Err(e))) => {
                    error!("Deployment job failed: {}", e);
                    outcome.error(GROUP_DEPLOY, &plan.name, format!("Deployment job failed: {}", e));
                }
                Ok(None) => break,
                Err(_) => {
                    outcome.error(
                        GROUP_DEPLOY,
                        &plan.name,
                        format!(
                            "Deployment did not complete within {} seconds; {} unit(s) still pending",
                            plan.wait_for_deploy_seconds,
                            jobs.len()
                        ),
                    );
                    // Pending jobs keep running; their results are no longer awaited.
                    jobs.detach_all();
                    break;
                }
            }
        }

        self.update_plan(|plan| {
            for done in finished {
                plan.deployments[done.index] = done.unit;
            }
        });

        let plan = self.plan();
        outcome.info(
            GROUP_DEPLOY,
            &plan.name,
            format!(
                "{}/{} unit(s) installed in {:?}",
                plan.installed_count(),
                plan.deployments.len(),
                started_at.elapsed()
            ),
        );

        self.finish(MissionEvent::DeployDone);
        outcome
    }

    async fn start(&self) -> Outcome {
        let plan = self.plan();
        let mut outcome = Outcome::new();

        if let Err(e) = self.transition(MissionEvent::Start) {
            outcome.violation(GROUP_START, &plan.name, format!("Start rejected: {}", e));
            return outcome;
        }

        let ready = plan.installed_count();
        let not_installed = plan.deployments.len() - ready;

        if not_installed > 0 && plan.all_appliances_must_deploy {
            outcome.violation(
                GROUP_START,
                &plan.name,
                format!(
                    "Start aborted: {} of {} unit(s) are not installed and all appliances must deploy",
                    not_installed,
                    plan.deployments.len()
                ),
            );
            self.finish(MissionEvent::Abort);
            return outcome;
        }

        if !plan.start_appliances {
            outcome.info(
                GROUP_START,
                &plan.name,
                "Start skipped: plan does not start appliances",
            );
            self.start_phase_done.store(true, Ordering::SeqCst);
            self.finish(MissionEvent::Abort);
            return outcome;
        }

        // Leftovers of an earlier start that already reported stopped
        self.release_all().await;

        info!("Starting {} appliance(s) of plan {}", ready, plan.name);
        for unit in plan.deployments.iter().filter(|u| u.has_installed) {
            let appliance = match self.launch(&plan, unit).await {
                Ok(appliance) => appliance,
                Err(e) => {
                    error!("Failed to start {}: {}", unit.display_name(), e);
                    outcome.error(GROUP_START, unit.display_name(), e.to_string());
                    break;
                }
            };

            outcome.info(GROUP_START, unit.display_name(), "Launched");
            if unit.wait_for_start {
                if appliance.wait_for_start().await {
                    outcome.info(GROUP_START, unit.display_name(), "Confirmed started");
                } else {
                    outcome.info(
                        GROUP_START,
                        unit.display_name(),
                        format!(
                            "Start not confirmed within {} seconds",
                            plan.wait_for_start_seconds
                        ),
                    );
                }
            }
        }

        if not_installed > 0 {
            outcome.info(
                GROUP_START,
                &plan.name,
                format!("{} unit(s) not installed and not started", not_installed),
            );
        }

        self.start_phase_done.store(true, Ordering::SeqCst);
        self.finish(MissionEvent::StartDone);
        outcome
    }

    async fn launch(&self, plan: &Arc<Plan>, unit: &DeploymentUnit) -> Result<Arc<Appliance>, AgentError> {
        let appliance = Arc::new(self.factory.create(plan, unit)?);
        self.appliances
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(appliance.clone());
        appliance.start().await?;
        Ok(appliance)
    }

    async fn stop(&self) -> Outcome {
        let plan = self.plan();
        let mut outcome = Outcome::new();
        let state = self.state();

        if state.is_busy() {
            outcome.violation(
                GROUP_STOP,
                &plan.name,
                format!("Stop rejected: mission is {:?}", state),
            );
            return outcome;
        }

        let stopping = state == MissionState::Running;
        if stopping {
            self.finish(MissionEvent::Stop);
        }

        let live = self.live();
        if live.is_empty() {
            outcome.info(GROUP_STOP, &plan.name, "No appliances to stop");
        } else if all_stopped(&live).await {
            outcome.info(GROUP_STOP, &plan.name, "All appliances already stopped");
            self.release_all().await;
        } else {
            self.stop_live(&plan, &live, &mut outcome).await;
        }

        if stopping {
            self.finish(MissionEvent::StopDone);
        }
        outcome
    }

    /// Fan out stop requests, then wait for all of them at once
    async fn stop_live(&self, plan: &Plan, live: &[Arc<Appliance>], outcome: &mut Outcome) {
        info!("Stopping {} appliance(s) of plan {}", live.len(), plan.name);

        let mut signalled = Vec::new();
        for appliance in live {
            if !appliance.has_started().await {
                debug!("{} never announced a start, not signalled", appliance.alias());
                continue;
            }
            match appliance.stop().await {
                Ok(()) => signalled.push(appliance.clone()),
                Err(e) => outcome.error(GROUP_STOP, appliance.alias(), e.to_string()),
            }
        }

        let deadline = Instant::now() + plan.wait_for_stop();
        loop {
            if all_stopped(&signalled).await {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Appliances of plan {} still running after {} seconds",
                    plan.name, plan.wait_for_stop_seconds
                );
                outcome.info(
                    GROUP_STOP,
                    &plan.name,
                    format!(
                        "Not every appliance reported stopped within {} seconds",
                        plan.wait_for_stop_seconds
                    ),
                );
                break;
            }
            tokio::time::sleep(TICK_INTERVAL).await;
        }

        self.release_all().await;
        outcome.info(GROUP_STOP, &plan.name, "Appliances stopped");
    }

    /// Dispose every live appliance and empty the live set
    async fn release_all(&self) {
        let released: Vec<Arc<Appliance>> = self
            .appliances
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for appliance in released {
            appliance.dispose().await;
        }
    }

    async fn run_to_completion(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let name = self.plan().name.clone();
        info!("Mission {} run starting", name);

        for outcome in [self.clean().await, self.deploy().await, self.start().await] {
            self.record(&outcome);
        }

        self.supervise(&name, &mut shutdown_rx).await;

        let outcome = self.stop().await;
        self.record(&outcome);
        info!("Mission {} run finished", name);
    }

    /// Restart crashed appliances until told to stop
    async fn supervise(&self, name: &str, shutdown_rx: &mut broadcast::Receiver<()>) {
        let mut announced = false;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Mission {} supervision stopping...", name);
                    return;
                }
                _ = tokio::time::sleep(TICK_INTERVAL) => {}
            }

            let live = self.live();
            if !announced && all_started(&live).await {
                announced = true;
                info!("Mission {} fully started ({} appliance(s))", name, live.len());
                let mut milestone = Outcome::new();
                milestone.info(GROUP_RUN, name, "All appliances started");
                self.record(&milestone);
            }

            for appliance in live {
                if !(appliance.has_started().await && appliance.has_stopped().await) {
                    continue;
                }
                error!("{} stopped unexpectedly, restarting", appliance.alias());
                tokio::time::sleep(RESTART_DELAY).await;
                if let Err(e) = appliance.start().await {
                    error!("Failed to restart {}: {}", appliance.alias(), e);
                }
            }
        }
    }
}

async fn deploy_unit(
    plan: &Plan,
    unit: &mut DeploymentUnit,
    loader: &dyn ApplianceLoader,
    installer: &dyn ApplianceInstaller,
) -> Result<(), AgentError> {
    loader.load(plan, unit).await?;
    installer.install(plan, unit).await
}

async fn all_started(appliances: &[Arc<Appliance>]) -> bool {
    join_all(appliances.iter().map(|a| a.has_started()))
        .await
        .into_iter()
        .all(|started| started)
}

async fn all_stopped(appliances: &[Arc<Appliance>]) -> bool {
    join_all(appliances.iter().map(|a| a.has_stopped()))
        .await
        .into_iter()
        .all(|stopped| stopped)
}

async fn any_running(appliances: &[Arc<Appliance>]) -> bool {
    for appliance in appliances {
        if appliance.has_started().await && !appliance.has_stopped().await {
            return true;
        }
    }
    false
}
