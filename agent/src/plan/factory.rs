//! JSON plan parsing, validation and versioning

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use mission_models::Plan;
use tracing::debug;

use crate::errors::AgentError;
use crate::mission::traits::{PlanFactory, PlanSource, PlanWriter};
use crate::utils::generate_uuid;

/// Builds plans from JSON documents
#[derive(Debug, Default)]
pub struct JsonPlanFactory {
    last_version: AtomicU64,
}

impl JsonPlanFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse, validate and normalize a plan document
    pub fn parse(&self, source: &[u8]) -> Result<Plan, AgentError> {
        if source.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(AgentError::PlanError("plan source is empty".to_string()));
        }

        let mut plan: Plan = serde_json::from_slice(source)
            .map_err(|e| AgentError::PlanError(format!("invalid plan document: {}", e)))?;

        normalize(&mut plan);
        validate(&plan)?;
        Ok(plan)
    }

    /// Next `YYYYMMDDHHMMSSmmm` version, strictly above `previous`
    fn next_version(&self, previous: &str) -> u64 {
        let now: u64 = Utc::now()
            .format("%Y%m%d%H%M%S%3f")
            .to_string()
            .parse()
            .unwrap_or_default();
        let floor = previous.parse::<u64>().unwrap_or_default();

        let mut next = now;
        let _ = self
            .last_version
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                next = now.max(last.max(floor) + 1);
                Some(next)
            });
        next
    }
}

#[async_trait]
impl PlanFactory for JsonPlanFactory {
    async fn create(
        &self,
        source: &dyn PlanSource,
        consume_as_update: bool,
    ) -> Result<Plan, AgentError> {
        let bytes = source.get_source().await?;
        let plan = self.parse(&bytes)?;
        if consume_as_update {
            source.mark_consumed(&bytes).await?;
        }
        debug!(
            "Plan {} created with {} unit(s)",
            plan.name,
            plan.deployments.len()
        );
        Ok(plan)
    }

    fn create_repository_version(&self, plan: &mut Plan) {
        plan.repository_version = self.next_version(&plan.repository_version).to_string();
    }

    async fn save(&self, plan: &Plan, writer: &dyn PlanWriter) -> Result<(), AgentError> {
        let contents = serde_json::to_vec_pretty(plan)?;
        writer.write(&contents).await
    }
}

fn normalize(plan: &mut Plan) {
    for unit in plan.deployments.iter_mut() {
        if unit.alias.is_empty() {
            unit.alias = unit.name.clone();
        }
        if unit.uid.is_empty() {
            unit.uid = generate_uuid();
        }
        unit.deploy &= plan.deploy_appliances;
    }
}

fn validate(plan: &Plan) -> Result<(), AgentError> {
    if plan.name.trim().is_empty() {
        return Err(AgentError::PlanError("plan has no name".to_string()));
    }

    let mut instances = HashSet::new();
    for (index, unit) in plan.deployments.iter().enumerate() {
        for (field, value) in [
            ("name", &unit.name),
            ("build", &unit.build),
            ("assembly", &unit.assembly),
        ] {
            if value.trim().is_empty() {
                return Err(AgentError::PlanError(format!(
                    "deployment {} has no {}",
                    index, field
                )));
            }
        }
        if !instances.insert((unit.name.as_str(), unit.alias.as_str())) {
            return Err(AgentError::PlanError(format!(
                "deployment {} duplicates {}/{}",
                index, unit.name, unit.alias
            )));
        }
    }
    Ok(())
}
