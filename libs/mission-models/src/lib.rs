//! Mission plan and status models

pub mod models;

pub use models::plan::{DeploymentUnit, Plan};
pub use models::status::StatusModel;
