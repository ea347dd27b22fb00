//! Appliance construction

use std::path::Path;
use std::sync::Arc;

use mission_models::{DeploymentUnit, Plan};

use crate::appliance::handle::Appliance;
use crate::appliance::signal::{FileSignalProvider, SignalProvider};
use crate::errors::AgentError;

/// Factory for creating appliances from installed units
#[derive(Clone)]
pub struct ApplianceFactory {
    signals: Arc<dyn SignalProvider>,
}

impl ApplianceFactory {
    /// Factory using sentinel-file signaling
    pub fn new() -> Self {
        Self {
            signals: Arc::new(FileSignalProvider),
        }
    }

    pub fn with_signal_provider(signals: Arc<dyn SignalProvider>) -> Self {
        Self { signals }
    }

    /// Create an appliance for an installed unit.
    ///
    /// The signal controller starts in host-owner mode; nothing is launched.
    pub fn create(&self, plan: &Arc<Plan>, unit: &DeploymentUnit) -> Result<Appliance, AgentError> {
        if unit.installation_location.is_empty() {
            return Err(AgentError::MissionError(format!(
                "{} has no installation location",
                unit.display_name()
            )));
        }
        if unit.assembly.is_empty() {
            return Err(AgentError::MissionError(format!(
                "{} has no assembly to launch",
                unit.display_name()
            )));
        }

        let signals = self
            .signals
            .host_controller(Path::new(&unit.installation_location));
        Ok(Appliance::new(plan.clone(), unit.clone(), signals))
    }
}

impl Default for ApplianceFactory {
    fn default() -> Self {
        Self::new()
    }
}
