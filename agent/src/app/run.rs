//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::mission::observer::MissionObserver;
use crate::mission::orchestrator::MissionOrchestrator;
use crate::mission::outcome::{EventCategory, Outcome};
use crate::workers::observer;

/// Run the mission agent
pub async fn run(
    agent_version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing mission agent {}...", agent_version);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start agent: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, AgentError> {
    let app_state = Arc::new(AppState::init(options).await?);
    info!("Storage at {}", app_state.layout.base_dir.display());

    if options.enable_orchestrator {
        init_orchestrator(app_state.orchestrator.clone(), shutdown_manager).await?;
    }

    if options.enable_observer {
        init_observer_worker(
            options.observer.clone(),
            app_state.observer.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(app_state)
}

async fn init_orchestrator(
    orchestrator: Arc<MissionOrchestrator>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    info!("Initializing orchestrator...");

    let outcome = orchestrator.run().await;
    if !outcome.successful {
        log_outcome("orchestrator start", &outcome);
        return Err(AgentError::MissionError(
            "orchestrator failed to start".to_string(),
        ));
    }

    shutdown_manager.with_orchestrator(orchestrator)
}

async fn init_observer_worker(
    options: observer::Options,
    mission_observer: Arc<MissionObserver>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing observer worker...");

    let worker_observer = mission_observer.clone();
    let observer_handle = tokio::spawn(async move {
        observer::run(
            &options,
            worker_observer.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_observer_worker_handle(observer_handle)?;
    shutdown_manager.with_observer(mission_observer)
}

fn log_outcome(context: &str, outcome: &Outcome) {
    for detail in outcome.of_category(EventCategory::Error) {
        error!("{}: {} {}", context, detail.source, detail.explanation);
    }
    for detail in outcome.of_category(EventCategory::Violation) {
        warn!("{}: {} {}", context, detail.source, detail.explanation);
    }
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    observer_worker_handle: Option<JoinHandle<()>>,
    observer: Option<Arc<MissionObserver>>,
    orchestrator: Option<Arc<MissionOrchestrator>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            observer_worker_handle: None,
            observer: None,
            orchestrator: None,
        }
    }

    pub fn with_observer_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.observer_worker_handle.is_some() {
            return Err(AgentError::ShutdownError("observer_handle already set".to_string()));
        }
        self.observer_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_observer(&mut self, observer: Arc<MissionObserver>) -> Result<(), AgentError> {
        if self.observer.is_some() {
            return Err(AgentError::ShutdownError("observer already set".to_string()));
        }
        self.observer = Some(observer);
        Ok(())
    }

    pub fn with_orchestrator(
        &mut self,
        orchestrator: Arc<MissionOrchestrator>,
    ) -> Result<(), AgentError> {
        if self.orchestrator.is_some() {
            return Err(AgentError::ShutdownError("orchestrator already set".to_string()));
        }
        self.orchestrator = Some(orchestrator);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), AgentError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), AgentError> {
        info!("Shutting down mission agent...");

        // 1. Observer worker, so no new mission starts
        if let Some(handle) = self.observer_worker_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 2. Running mission
        if let Some(observer) = self.observer.take() {
            let outcome = observer.stop().await;
            log_outcome("mission stop", &outcome);
        }

        // 3. Orchestrator
        if let Some(orchestrator) = self.orchestrator.take() {
            let outcome = orchestrator.terminate().await;
            log_outcome("orchestrator stop", &outcome);
        }

        info!("Shutdown complete");
        Ok(())
    }
}
