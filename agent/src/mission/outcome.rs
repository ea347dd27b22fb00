//! Phase outcomes and their audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Info,
    Violation,
    Error,
}

/// One entry of an outcome's audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDetail {
    pub category: EventCategory,

    /// Phase or component the event belongs to, e.g. "deploy"
    pub group: String,

    /// What raised it: a unit alias, a plan name, a component
    pub source: String,

    pub explanation: String,

    pub timestamp: DateTime<Utc>,
}

/// Success flag plus an append-only list of details.
///
/// Details are never reordered or deduplicated; the order is the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub successful: bool,
    pub details: Vec<EventDetail>,
}

impl Outcome {
    /// A successful outcome with no details
    pub fn new() -> Self {
        Self {
            successful: true,
            details: Vec::new(),
        }
    }

    /// A failed outcome carrying a single error detail
    pub fn failed(group: &str, source: &str, explanation: impl Into<String>) -> Self {
        let mut outcome = Self::new();
        outcome.error(group, source, explanation);
        outcome
    }

    pub fn info(&mut self, group: &str, source: &str, explanation: impl Into<String>) {
        self.push(EventCategory::Info, group, source, explanation.into());
    }

    /// Records a violation; marks the outcome failed
    pub fn violation(&mut self, group: &str, source: &str, explanation: impl Into<String>) {
        self.successful = false;
        self.push(EventCategory::Violation, group, source, explanation.into());
    }

    /// Records an error; marks the outcome failed
    pub fn error(&mut self, group: &str, source: &str, explanation: impl Into<String>) {
        self.successful = false;
        self.push(EventCategory::Error, group, source, explanation.into());
    }

    /// Append another outcome's details; fails this one if the other failed
    pub fn absorb(&mut self, other: &Outcome) {
        self.successful &= other.successful;
        self.details.extend(other.details.iter().cloned());
    }

    /// Drop all details and return to the successful state
    pub fn clear(&mut self) {
        self.successful = true;
        self.details.clear();
    }

    /// Details of the given category, in recording order
    pub fn of_category(&self, category: EventCategory) -> impl Iterator<Item = &EventDetail> {
        self.details.iter().filter(move |d| d.category == category)
    }

    fn push(&mut self, category: EventCategory, group: &str, source: &str, explanation: String) {
        self.details.push(EventDetail {
            category,
            group: group.to_string(),
            source: source.to_string(),
            explanation,
            timestamp: Utc::now(),
        });
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::new()
    }
}
