//! Finite state machine for the mission lifecycle

use serde::{Deserialize, Serialize};

/// Mission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionState {
    /// Nothing done yet
    Idle,

    /// Removing repository and installation state
    Cleaning,

    Cleaned,

    /// Loading and installing units
    Deploying,

    Deployed,

    /// Launching appliances one by one
    Starting,

    /// Appliances launched, supervision possible
    Running,

    /// Waiting for appliances to report stopped
    Stopping,

    Stopped,
}

impl MissionState {
    /// A phase is executing; no other phase may begin
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            MissionState::Cleaning
                | MissionState::Deploying
                | MissionState::Starting
                | MissionState::Stopping
        )
    }
}

/// Mission event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionEvent {
    Clean,
    CleanDone,
    Deploy,
    DeployDone,
    Start,
    StartDone,
    Stop,
    StopDone,

    /// The running phase gave up before changing anything
    Abort,
}

/// Mission FSM.
///
/// Clean, Deploy and Start may begin from any resting state except Running;
/// Stop only from Running. Abort returns a busy state to where it came from.
#[derive(Debug, Clone)]
pub struct MissionFsm {
    state: MissionState,
    resumed_from: MissionState,
}

impl MissionFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: MissionState::Idle,
            resumed_from: MissionState::Idle,
        }
    }

    /// Get current state
    pub fn state(&self) -> MissionState {
        self.state
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: MissionEvent) -> Result<(), String> {
        use MissionEvent as E;
        use MissionState as S;

        let new_state = match (self.state, event) {
            (S::Idle | S::Cleaned | S::Deployed | S::Stopped, E::Clean) => S::Cleaning,
            (S::Idle | S::Cleaned | S::Deployed | S::Stopped, E::Deploy) => S::Deploying,
            (S::Idle | S::Cleaned | S::Deployed | S::Stopped, E::Start) => S::Starting,
            (S::Running, E::Stop) => S::Stopping,

            (S::Cleaning, E::CleanDone) => S::Cleaned,
            (S::Deploying, E::DeployDone) => S::Deployed,
            (S::Starting, E::StartDone) => S::Running,
            (S::Stopping, E::StopDone) => S::Stopped,

            (busy, E::Abort) if busy.is_busy() => self.resumed_from,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        if !self.state.is_busy() {
            self.resumed_from = self.state;
        }
        self.state = new_state;
        Ok(())
    }
}

impl Default for MissionFsm {
    fn default() -> Self {
        Self::new()
    }
}
