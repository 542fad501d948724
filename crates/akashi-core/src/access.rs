// crates/akashi-core/src/access.rs
// ============================================================================
// Module: Read Access Scope
// Description: Effective read-set computation for org-scoped reads.
// Purpose: Decide which agents' records a caller may read.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Every read of decisions, events, runs, or conflicts is scoped by the
//! caller's effective read set: the caller's own agent, agents covered by an
//! active `agent_traces` grant, and agents sharing at least one tag with the
//! caller. Admin-and-above roles bypass filtering inside their own org.
//! The computation here is pure; grant and tag lookups are store concerns
//! and the short-TTL cache lives with the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::core::agent::Agent;
use crate::core::identifiers::AgentId;

// ============================================================================
// SECTION: Read Scope
// ============================================================================

/// Effective read scope injected into org-scoped queries.
///
/// # Invariants
/// - [`ReadScope::All`] is produced only for admin-and-above callers and
///   still carries the caller's org filter at the query layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadScope {
    /// Unfiltered read within the caller's organization.
    All,
    /// Read restricted to the contained agent identifiers.
    Agents(BTreeSet<AgentId>),
}

impl ReadScope {
    /// Returns true when the scope admits the provided agent.
    #[must_use]
    pub fn permits(&self, agent_id: &AgentId) -> bool {
        match self {
            Self::All => true,
            Self::Agents(ids) => ids.contains(agent_id),
        }
    }

    /// Returns the agent filter as a vector, or `None` for the admin scope.
    #[must_use]
    pub fn as_filter(&self) -> Option<Vec<AgentId>> {
        match self {
            Self::All => None,
            Self::Agents(ids) => Some(ids.iter().cloned().collect()),
        }
    }
}

/// Returns true when two tag sets share at least one tag.
#[must_use]
pub fn tags_overlap(a: &[String], b: &[String]) -> bool {
    a.iter().any(|tag| b.contains(tag))
}

/// Computes the caller's effective read scope.
///
/// `granted` carries agents from active `agent_traces` grants; `tag_shared`
/// carries agents sharing at least one tag with the caller. Both are
/// resolved by the store against the caller's org.
#[must_use]
pub fn effective_read_scope(
    caller: &Agent,
    granted: impl IntoIterator<Item = AgentId>,
    tag_shared: impl IntoIterator<Item = AgentId>,
) -> ReadScope {
    if caller.role.is_admin() {
        return ReadScope::All;
    }
    let mut ids = BTreeSet::new();
    ids.insert(caller.agent_id.clone());
    ids.extend(granted);
    ids.extend(tag_shared);
    ReadScope::Agents(ids)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
