//! Mission Agent Library
//!
//! Deploys the appliances described by a mission plan onto this node, launches
//! them and keeps them running until the plan changes.

pub mod app;
pub mod appliance;
pub mod artifacts;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod mission;
pub mod plan;
pub mod storage;
pub mod utils;
pub mod workers;
