//! The lifecycle event a run or job emits as it moves through its states,
//! and the constructors the Worker uses to build them consistently.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// The kind of lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum EventType {
    #[strum(serialize = "START")]
    #[serde(rename = "START")]
    Start,
    #[strum(serialize = "SUCCESS")]
    #[serde(rename = "SUCCESS")]
    Success,
    #[strum(serialize = "FAILURE")]
    #[serde(rename = "FAILURE")]
    Failure,
}

/// One emitted lifecycle event, stored as the `event:<uuid>` hash and
/// dispatched by the Notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub title: String,
    pub message: String,
}

impl Event {
    pub fn new(event_type: EventType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type,
            title: title.into(),
            message: message.into(),
        }
    }

    /// A fresh event key of the form `event:<uuid>`, matching
    /// `chainr_store::keys::event`.
    pub fn new_key() -> String {
        format!("event:{}", Uuid::new_v4())
    }

    pub fn run_started(run_uid: &str) -> Self {
        Self::new(
            EventType::Start,
            "A run started",
            format!("Run with id {run_uid} has started"),
        )
    }

    pub fn run_succeeded(run_uid: &str) -> Self {
        Self::new(
            EventType::Success,
            "A run succeeded",
            format!("Run with id {run_uid} completed successfully"),
        )
    }

    pub fn run_failed(run_uid: &str) -> Self {
        Self::new(
            EventType::Failure,
            "A run failed",
            format!("Run with id {run_uid} did not complete successfully"),
        )
    }

    pub fn job_started(job_key: &str) -> Self {
        Self::new(
            EventType::Start,
            "A job started",
            format!("Job {job_key} has started"),
        )
    }

    pub fn job_succeeded(job_key: &str) -> Self {
        Self::new(
            EventType::Success,
            "A job succeeded",
            format!("Job {job_key} completed successfully"),
        )
    }

    pub fn job_failed(job_key: &str) -> Self {
        Self::new(
            EventType::Failure,
            "A job failed",
            format!("Job {job_key} did not complete successfully"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_to_the_wire_literal() {
        assert_eq!(EventType::Start.to_string(), "START");
        assert_eq!(serde_json::to_string(&EventType::Failure).unwrap(), "\"FAILURE\"");
    }

    #[test]
    fn run_started_mentions_the_uid() {
        let event = Event::run_started("abc-123");
        assert_eq!(event.event_type, EventType::Start);
        assert!(event.message.contains("abc-123"));
    }
}
