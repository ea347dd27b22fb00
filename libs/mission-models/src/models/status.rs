//! Status models

use serde::{Deserialize, Serialize};

use crate::models::plan::DeploymentUnit;

/// Reporting projection of one appliance and its deployment unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusModel {
    pub uid: String,
    pub alias: String,
    pub name: String,
    pub build: String,
    pub repository_location: String,
    pub installation_location: String,
    pub assembly: String,
    pub configuration: serde_json::Value,
    pub has_loaded: bool,
    pub has_installed: bool,
    pub has_started: bool,
    pub has_stopped: bool,
}

impl StatusModel {
    /// Build a status entry from a unit and the appliance signal state
    pub fn from_unit(unit: &DeploymentUnit, has_started: bool, has_stopped: bool) -> Self {
        Self {
            uid: unit.uid.clone(),
            alias: unit.alias.clone(),
            name: unit.name.clone(),
            build: unit.build.clone(),
            repository_location: unit.repository_location.clone(),
            installation_location: unit.installation_location.clone(),
            assembly: unit.assembly.clone(),
            configuration: unit.configuration.clone(),
            has_loaded: unit.has_loaded,
            has_installed: unit.has_installed,
            has_started,
            has_stopped,
        }
    }
}
