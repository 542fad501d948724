// crates/akashi-core/src/core/identifiers.rs
// ============================================================================
// Module: Akashi Identifiers
// Description: Canonical opaque identifiers for Akashi entities.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Akashi.
//! Entity identifiers are UUIDs and serialize as their hyphenated string
//! form on the wire. Agent and session identifiers are caller-supplied
//! opaque strings; decision types carry a normalization helper used by the
//! conflict scorer. Conflict pair ordering relies on the bytewise `Ord` of
//! the underlying UUIDs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: UUID-Backed Identifiers
// ============================================================================

/// Declares a UUID-backed identifier newtype with stable wire form.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a new random (v4) identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_identifier! {
    /// Organization identifier; the tenant boundary for every entity.
    ///
    /// # Invariants
    /// - Every query on org-scoped tables must filter by this identifier.
    OrgId
}

uuid_identifier! {
    /// Agent run identifier scoped to an organization.
    ///
    /// # Invariants
    /// - Event sequence numbers are unique within one run identifier.
    RunId
}

uuid_identifier! {
    /// Decision identifier.
    ///
    /// # Invariants
    /// - Participates in conflict pair ordering via bytewise UUID order.
    DecisionId
}

uuid_identifier! {
    /// Event identifier assigned at buffer admission, before sequencing.
    ///
    /// # Invariants
    /// - Stable across WAL replay; used for replay deduplication.
    EventId
}

uuid_identifier! {
    /// Alternative identifier.
    AlternativeId
}

uuid_identifier! {
    /// Evidence identifier.
    EvidenceId
}

uuid_identifier! {
    /// Decision claim identifier.
    ClaimId
}

uuid_identifier! {
    /// Scored conflict identifier.
    ConflictId
}

uuid_identifier! {
    /// API key identifier.
    ApiKeyId
}

uuid_identifier! {
    /// Access grant identifier.
    GrantId
}

uuid_identifier! {
    /// Integrity proof identifier.
    ProofId
}

uuid_identifier! {
    /// Search outbox entry identifier.
    OutboxEntryId
}

// ============================================================================
// SECTION: String-Backed Identifiers
// ============================================================================

/// Agent identifier supplied by the caller and stable across runs.
///
/// # Invariants
/// - Opaque UTF-8 string; unique per organization at the store level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Creates a new agent identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Session identifier grouping related decisions, recorded by the caller.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new session identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Decision type label, e.g. `architecture` or `caching`.
///
/// # Invariants
/// - Stored verbatim; scorer comparisons use [`DecisionType::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionType(String);

impl DecisionType {
    /// Creates a new decision type label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the normalized form used for type equality in candidate finding.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0.trim().to_lowercase()
    }

    /// Returns true when two labels are equal after normalization.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DecisionType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DecisionType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
