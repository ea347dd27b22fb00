pub mod fsm;
pub mod lifecycle;
pub mod observer;
pub mod orchestrator;
pub mod outcome;
pub mod traits;

pub use lifecycle::{Mission, MissionStatus};
pub use observer::{MissionObserver, MissionScope, ScopeProvider};
pub use orchestrator::{MissionOrchestrator, PlanConfigurator, VersionStamper};
pub use outcome::{EventCategory, EventDetail, Outcome};
