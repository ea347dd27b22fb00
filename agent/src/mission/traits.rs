//! Collaborator traits consumed by missions and the orchestrator

use std::time::Duration;

use async_trait::async_trait;
use mission_models::{DeploymentUnit, Plan};

use crate::errors::AgentError;

/// Where raw plan documents come from
#[async_trait]
pub trait PlanSource: Send + Sync {
    /// Whether the source holds a plan that has not been consumed yet
    async fn has_updated_plan(&self) -> Result<bool, AgentError>;

    /// Raw plan bytes
    async fn get_source(&self) -> Result<Vec<u8>, AgentError>;

    /// Record that `source` has been applied
    async fn mark_consumed(&self, source: &[u8]) -> Result<(), AgentError>;

    /// Force the next update check to report a new plan
    async fn reload(&self) -> Result<(), AgentError>;

    /// How often callers should ask `has_updated_plan`
    fn polling_interval(&self) -> Duration;
}

/// Persists a plan snapshot
#[async_trait]
pub trait PlanWriter: Send + Sync {
    async fn write(&self, contents: &[u8]) -> Result<(), AgentError>;
}

/// Parses and validates plans
#[async_trait]
pub trait PlanFactory: Send + Sync {
    /// Build a plan from the source. Fails on empty or invalid input.
    ///
    /// With `consume_as_update` the source is told the plan was applied.
    async fn create(
        &self,
        source: &dyn PlanSource,
        consume_as_update: bool,
    ) -> Result<Plan, AgentError>;

    /// Stamp a fresh repository version on the plan
    fn create_repository_version(&self, plan: &mut Plan);

    async fn save(&self, plan: &Plan, writer: &dyn PlanWriter) -> Result<(), AgentError>;
}

/// Fetches packages into `unit.repository_content`
#[async_trait]
pub trait ApplianceLoader: Send + Sync {
    async fn clean(&self, plan: &Plan) -> Result<(), AgentError>;

    /// Sets `has_loaded` only after the checksum (if any) matched.
    /// A unit with `deploy == false` is left untouched.
    async fn load(&self, plan: &Plan, unit: &mut DeploymentUnit) -> Result<(), AgentError>;
}

/// Unpacks loaded packages into `unit.installation_location`
#[async_trait]
pub trait ApplianceInstaller: Send + Sync {
    async fn clean(&self, plan: &Plan) -> Result<(), AgentError>;

    async fn install(&self, plan: &Plan, unit: &mut DeploymentUnit) -> Result<(), AgentError>;
}
