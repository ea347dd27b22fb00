//! Binds one live mission to the plan it was built from

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::mission::lifecycle::{Mission, MissionStatus};
use crate::mission::outcome::Outcome;
use crate::mission::traits::PlanSource;

/// Everything a mission needs for one plan, dropped as a whole on swap
pub struct MissionScope {
    pub plan_source: Arc<dyn PlanSource>,
    pub mission: Mission,
}

/// Opens a fresh, isolated scope for the current plan
#[async_trait]
pub trait ScopeProvider: Send + Sync {
    async fn open_scope(&self) -> Result<MissionScope, AgentError>;
}

/// Hot-swaps the running mission whenever its plan changes
pub struct MissionObserver {
    provider: Arc<dyn ScopeProvider>,
    scope: Mutex<Option<MissionScope>>,
}

impl MissionObserver {
    pub fn new(provider: Arc<dyn ScopeProvider>) -> Self {
        Self {
            provider,
            scope: Mutex::new(None),
        }
    }

    /// Open a scope and run its mission. No-op while a scope is active.
    pub async fn start(&self) -> Result<(), AgentError> {
        let mut scope = self.scope.lock().await;
        self.start_locked(&mut scope).await
    }

    /// Swap the mission if the plan source reports a new plan
    pub async fn check(&self) -> Result<bool, AgentError> {
        let mut scope = self.scope.lock().await;
        let updated = match scope.as_ref() {
            Some(current) => current.plan_source.has_updated_plan().await?,
            None => return Ok(false),
        };
        if !updated {
            return Ok(false);
        }

        info!("Plan changed, replacing mission...");
        Self::stop_locked(&mut scope).await;
        self.start_locked(&mut scope).await?;
        Ok(true)
    }

    /// Ask the current plan source to report its plan as new
    pub async fn reload(&self) -> Result<(), AgentError> {
        match self.scope.lock().await.as_ref() {
            Some(current) => current.plan_source.reload().await,
            None => Ok(()),
        }
    }

    /// Terminate the mission and drop its scope
    pub async fn stop(&self) -> Outcome {
        let mut scope = self.scope.lock().await;
        Self::stop_locked(&mut scope).await
    }

    pub async fn is_active(&self) -> bool {
        self.scope.lock().await.is_some()
    }

    /// Status of the current mission, if any
    pub async fn status(&self) -> Option<MissionStatus> {
        match self.scope.lock().await.as_ref() {
            Some(current) => Some(current.mission.get_status().await),
            None => None,
        }
    }

    async fn start_locked(&self, scope: &mut Option<MissionScope>) -> Result<(), AgentError> {
        if scope.is_some() {
            return Ok(());
        }

        let opened = self.provider.open_scope().await?;
        let outcome = opened.mission.run().await;
        if !outcome.successful {
            let reason = outcome
                .details
                .last()
                .map(|d| d.explanation.clone())
                .unwrap_or_default();
            return Err(AgentError::MissionError(format!(
                "Mission {} failed to run: {}",
                opened.mission.plan().name,
                reason
            )));
        }

        info!("Mission {} started", opened.mission.plan().name);
        *scope = Some(opened);
        Ok(())
    }

    async fn stop_locked(scope: &mut Option<MissionScope>) -> Outcome {
        let Some(current) = scope.take() else {
            return Outcome::new();
        };

        let outcome = current.mission.terminate().await;
        if !outcome.successful {
            warn!(
                "Mission {} did not terminate cleanly",
                current.mission.plan().name
            );
        }
        outcome
    }
}
