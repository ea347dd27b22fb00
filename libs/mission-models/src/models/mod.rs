//! Data models

pub mod plan;
pub mod status;
