//! Event taxonomy shared between the grid subsystems (which emit events)
//! and the persistence layer (which appends them to the event log).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Created,
    Submitted,
    Partial,
    Filled,
    Cancelled,
    Rejected,
    RecoveredFill,
    RecoveredDiscard,
    Drift,
    SafetyBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTrigger {
    Strategy,
    Bootstrap,
    Shutdown,
    Restart,
    Sync,
    Manual,
    Exchange,
}

/// One append-only event-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    pub trigger: EventTrigger,
    pub details: String,
}

impl EngineEvent {
    pub fn new(
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        event_type: EventKind,
        trigger: EventTrigger,
        details: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            timestamp,
            event_type,
            trigger,
            details: details.into(),
        }
    }
}
