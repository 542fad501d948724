// crates/akashi-core/src/core/event.rs
// ============================================================================
// Module: Akashi Event Model
// Description: Append-only run events and their buffered form.
// Purpose: Represent the high-throughput event stream before and after sequencing.
// Dependencies: serde, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! Events are append-only records belonging to a run. Callers submit
//! [`NewEvent`] values; the ingestion buffer assigns each a stable
//! [`crate::core::identifiers::EventId`] at admission (used for WAL replay
//! deduplication) and a server-assigned monotonic `sequence_num` at flush.
//! Stored events are never updated or deleted by application code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Event Kinds
// ============================================================================

/// Typed event kind with a stable wire label.
///
/// # Invariants
/// - Known kinds round-trip through their snake_case label.
/// - Unknown labels are preserved verbatim in [`EventKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A decision was recorded.
    DecisionMade,
    /// A decision was revised.
    DecisionRevised,
    /// A tool call started.
    ToolCallStarted,
    /// A tool call completed.
    ToolCallCompleted,
    /// Control was handed to another agent.
    AgentHandoff,
    /// A run started.
    RunStarted,
    /// A run completed.
    RunCompleted,
    /// A run failed.
    RunFailed,
    /// An error was observed.
    Error,
    /// Caller-defined kind preserved verbatim.
    Custom(String),
}

impl EventKind {
    /// Returns the stable label used in the store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DecisionMade => "decision_made",
            Self::DecisionRevised => "decision_revised",
            Self::ToolCallStarted => "tool_call_started",
            Self::ToolCallCompleted => "tool_call_completed",
            Self::AgentHandoff => "agent_handoff",
            Self::RunStarted => "run_started",
            Self::RunCompleted => "run_completed",
            Self::RunFailed => "run_failed",
            Self::Error => "error",
            Self::Custom(label) => label.as_str(),
        }
    }

    /// Parses a stable label, preserving unknown labels as [`EventKind::Custom`].
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "decision_made" => Self::DecisionMade,
            "decision_revised" => Self::DecisionRevised,
            "tool_call_started" => Self::ToolCallStarted,
            "tool_call_completed" => Self::ToolCallCompleted,
            "agent_handoff" => Self::AgentHandoff,
            "run_started" => Self::RunStarted,
            "run_completed" => Self::RunCompleted,
            "run_failed" => Self::RunFailed,
            "error" => Self::Error,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(Self::parse(&label))
    }
}

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// Caller-submitted event prior to buffering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Owning organization.
    pub org_id: OrgId,
    /// Agent the event belongs to.
    pub agent_id: AgentId,
    /// Run the event belongs to.
    pub run_id: RunId,
    /// Typed event kind.
    pub kind: EventKind,
    /// Timestamp the event occurred at, supplied by the caller.
    pub occurred_at: OffsetDateTime,
    /// Free-form event payload.
    pub payload: Value,
}

/// Event admitted into the buffer, carrying its replay-stable identifier.
///
/// # Invariants
/// - `event_id` is assigned exactly once at admission and survives WAL
///   replay; downstream deduplication keys on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEvent {
    /// Replay-stable event identifier.
    pub event_id: EventId,
    /// The caller-submitted event.
    pub event: NewEvent,
}

impl BufferedEvent {
    /// Admits a new event, assigning its replay-stable identifier.
    #[must_use]
    pub fn admit(event: NewEvent) -> Self {
        Self {
            event_id: EventId::generate(),
            event,
        }
    }
}

/// Stored event row with its server-assigned sequence number.
///
/// # Invariants
/// - `(run_id, sequence_num)` is unique at the store level.
/// - Within a run, `sequence_num` strictly increases in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Event identifier.
    pub id: EventId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Agent the event belongs to.
    pub agent_id: AgentId,
    /// Run the event belongs to.
    pub run_id: RunId,
    /// Server-assigned monotonic sequence number.
    pub sequence_num: i64,
    /// Typed event kind.
    pub kind: EventKind,
    /// Timestamp the event occurred at.
    pub occurred_at: OffsetDateTime,
    /// Timestamp the event was persisted at.
    pub recorded_at: OffsetDateTime,
    /// Free-form event payload.
    pub payload: Value,
}
