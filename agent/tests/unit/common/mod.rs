//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mission_agent::appliance::signal::{SignalController, SignalProvider};
use mission_agent::appliance::ApplianceFactory;
use mission_agent::errors::AgentError;
use mission_agent::filesys::dir::Dir;
use mission_agent::mission::traits::{
    ApplianceInstaller, ApplianceLoader, PlanSource, PlanWriter,
};
use mission_agent::mission::Mission;
use mission_models::{DeploymentUnit, Plan};

/// Loader producing a small payload per unit after an optional delay
#[derive(Default)]
pub struct FakeLoader {
    pub delay: Duration,
    pub missing: HashSet<String>,
    pub loads: AtomicUsize,
    pub cleans: AtomicUsize,
}

impl FakeLoader {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn with_missing(names: &[&str]) -> Self {
        Self {
            missing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn clean_count(&self) -> usize {
        self.cleans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplianceLoader for FakeLoader {
    async fn clean(&self, _plan: &Plan) -> Result<(), AgentError> {
        self.cleans.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, _plan: &Plan, unit: &mut DeploymentUnit) -> Result<(), AgentError> {
        if !unit.deploy {
            return Ok(());
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        if self.missing.contains(&unit.name) {
            return Err(AgentError::NotFound(unit.artifact_key()));
        }
        unit.repository_content = unit.artifact_key().into_bytes();
        unit.has_loaded = true;
        Ok(())
    }
}

/// Installer creating an empty directory per alias
pub struct FakeInstaller {
    pub root: PathBuf,
    pub installs: AtomicUsize,
    pub cleans: AtomicUsize,
}

impl FakeInstaller {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            installs: AtomicUsize::new(0),
            cleans: AtomicUsize::new(0),
        }
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplianceInstaller for FakeInstaller {
    async fn clean(&self, _plan: &Plan) -> Result<(), AgentError> {
        self.cleans.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn install(&self, _plan: &Plan, unit: &mut DeploymentUnit) -> Result<(), AgentError> {
        if !unit.deploy || !unit.has_loaded {
            return Ok(());
        }
        let target = self.root.join(&unit.name).join(unit.display_name());
        std::fs::create_dir_all(&target)?;

        self.installs.fetch_add(1, Ordering::SeqCst);
        unit.installation_location = target.to_string_lossy().to_string();
        unit.repository_content.clear();
        unit.has_installed = true;
        Ok(())
    }
}

/// Signal controller driven by flags instead of sentinel files
pub struct FakeSignals {
    dir: PathBuf,
    auto_start: bool,
    auto_stop: bool,
    started: AtomicBool,
    stopped: AtomicBool,
    stop_requested: AtomicBool,
    resets: AtomicUsize,
}

impl FakeSignals {
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn was_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// The appliance went away without being asked
    pub fn crash(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalController for FakeSignals {
    async fn reset(&self) -> Result<(), AgentError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
        self.started.store(self.auto_start, Ordering::SeqCst);
        Ok(())
    }

    async fn request_stop(&self) -> Result<(), AgentError> {
        self.stop_requested.store(true, Ordering::SeqCst);
        if self.auto_stop {
            self.stopped.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn started(&self) -> Result<(), AgentError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stopped(&self) -> Result<(), AgentError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    async fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn has_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn signal_dir(&self) -> &Path {
        &self.dir
    }
}

/// Hands out [`FakeSignals`] and remembers them
pub struct FakeSignalProvider {
    pub auto_start: bool,
    pub auto_stop: bool,
    created: Mutex<Vec<Arc<FakeSignals>>>,
}

impl FakeSignalProvider {
    /// Appliances that announce themselves and honour stop requests
    pub fn cooperative() -> Self {
        Self::new(true, true)
    }

    pub fn new(auto_start: bool, auto_stop: bool) -> Self {
        Self {
            auto_start,
            auto_stop,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn controllers(&self) -> Vec<Arc<FakeSignals>> {
        self.created.lock().unwrap().clone()
    }
}

impl SignalProvider for FakeSignalProvider {
    fn host_controller(&self, install_dir: &Path) -> Arc<dyn SignalController> {
        let signals = Arc::new(FakeSignals {
            dir: install_dir.join(".signals"),
            auto_start: self.auto_start,
            auto_stop: self.auto_stop,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            resets: AtomicUsize::new(0),
        });
        self.created.lock().unwrap().push(signals.clone());
        signals
    }
}

/// Plan source serving an in-memory document
pub struct MemoryPlanSource {
    document: Mutex<Vec<u8>>,
    updated: AtomicBool,
    consumed: AtomicUsize,
}

impl MemoryPlanSource {
    pub fn new(document: &str) -> Self {
        Self {
            document: Mutex::new(document.as_bytes().to_vec()),
            updated: AtomicBool::new(true),
            consumed: AtomicUsize::new(0),
        }
    }

    pub fn publish(&self, document: &str) {
        *self.document.lock().unwrap() = document.as_bytes().to_vec();
        self.updated.store(true, Ordering::SeqCst);
    }

    pub fn consumed_count(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanSource for MemoryPlanSource {
    async fn has_updated_plan(&self) -> Result<bool, AgentError> {
        Ok(self.updated.load(Ordering::SeqCst))
    }

    async fn get_source(&self) -> Result<Vec<u8>, AgentError> {
        Ok(self.document.lock().unwrap().clone())
    }

    async fn mark_consumed(&self, _source: &[u8]) -> Result<(), AgentError> {
        self.consumed.fetch_add(1, Ordering::SeqCst);
        self.updated.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn reload(&self) -> Result<(), AgentError> {
        self.updated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn polling_interval(&self) -> Duration {
        Duration::from_millis(50)
    }
}

/// Writer keeping every snapshot
#[derive(Default)]
pub struct MemoryPlanWriter {
    pub writes: Mutex<Vec<Vec<u8>>>,
}

impl MemoryPlanWriter {
    pub fn last_plan(&self) -> Option<Plan> {
        let writes = self.writes.lock().unwrap();
        writes
            .last()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl PlanWriter for MemoryPlanWriter {
    async fn write(&self, contents: &[u8]) -> Result<(), AgentError> {
        self.writes.lock().unwrap().push(contents.to_vec());
        Ok(())
    }
}

/// A unit launching `true`, which exits at once; state comes from the signals
pub fn unit(name: &str) -> DeploymentUnit {
    let mut unit = DeploymentUnit::new(name, "1.0", "true");
    unit.uid = format!("uid-{}", name);
    unit
}

pub fn plan(name: &str, units: &[&str]) -> Plan {
    let mut plan = Plan::new(name);
    plan.wait_for_stop_seconds = 2;
    plan.wait_for_start_seconds = 1;
    plan.deployments = units.iter().map(|n| unit(n)).collect();
    plan
}

/// A mission wired to fakes, plus handles on those fakes
pub struct Harness {
    pub mission: Mission,
    pub loader: Arc<FakeLoader>,
    pub installer: Arc<FakeInstaller>,
    pub signals: Arc<FakeSignalProvider>,
    pub root: Dir,
}

impl Harness {
    pub async fn new(plan: Plan, loader: FakeLoader, signals: FakeSignalProvider) -> Self {
        let root = Dir::create_temp_dir("mission-test").await.unwrap();
        let loader = Arc::new(loader);
        let installer = Arc::new(FakeInstaller::new(root.path()));
        let signals = Arc::new(signals);

        let mission = Mission::new(
            plan,
            loader.clone(),
            installer.clone(),
            ApplianceFactory::with_signal_provider(signals.clone()),
        );

        Self {
            mission,
            loader,
            installer,
            signals,
            root,
        }
    }

    pub async fn cleanup(self) {
        self.root.delete().await.unwrap();
    }
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
