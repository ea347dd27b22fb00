//! Appliance processes and their signaling

pub mod factory;
pub mod handle;
pub mod signal;

pub use factory::ApplianceFactory;
pub use handle::Appliance;
