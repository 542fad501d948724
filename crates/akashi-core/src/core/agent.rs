// crates/akashi-core/src/core/agent.rs
// ============================================================================
// Module: Akashi Agent Model
// Description: Agent identities, roles, API keys, and access grants.
// Purpose: Represent the caller-facing identity and sharing model.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Agents are the writers and readers of the audit trail. Each agent carries
//! a role from a total order, a set of sharing tags, and zero or more API
//! keys stored as `(prefix, hash)` pairs. Access grants are time-bounded
//! capabilities letting one agent read another's traces. Key verification is
//! a store concern; this module only models the records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::ApiKeyId;
use crate::core::identifiers::GrantId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Agent role in ascending order of capability.
///
/// # Invariants
/// - Variant order defines the total order used for authorization checks.
/// - Variants are stable for serialization and store round-trips.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Read-only access to shared traces.
    Reader,
    /// Standard writing agent.
    #[default]
    Agent,
    /// Organization administrator; bypasses the read-access filter.
    Admin,
    /// Organization owner.
    OrgOwner,
    /// Platform administrator.
    PlatformAdmin,
}

impl AgentRole {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Agent => "agent",
            Self::Admin => "admin",
            Self::OrgOwner => "org_owner",
            Self::PlatformAdmin => "platform_admin",
        }
    }

    /// Parses a stable label back into a role.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "reader" => Some(Self::Reader),
            "agent" => Some(Self::Agent),
            "admin" => Some(Self::Admin),
            "org_owner" => Some(Self::OrgOwner),
            "platform_admin" => Some(Self::PlatformAdmin),
            _ => None,
        }
    }

    /// Returns true when the role bypasses the read-access filter in its org.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::OrgOwner | Self::PlatformAdmin)
    }
}

// ============================================================================
// SECTION: Agents
// ============================================================================

/// Agent identity record.
///
/// # Invariants
/// - `(org_id, agent_id)` is unique at the store level.
/// - `tags` are compared for overlap when computing tag-shared visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Owning organization.
    pub org_id: OrgId,
    /// Stable textual agent identifier.
    pub agent_id: AgentId,
    /// Human-readable display name.
    pub display_name: String,
    /// Authorization role.
    pub role: AgentRole,
    /// Sharing tags; agents sharing at least one tag see each other's traces.
    pub tags: Vec<String>,
    /// Legacy key hash kept only until the one-shot API key migration runs.
    pub legacy_key_hash: Option<String>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: API Keys
// ============================================================================

/// API key record stored as a lookup prefix plus a verification hash.
///
/// # Invariants
/// - Core fields are immutable after insert; only `label`, `last_used_at`,
///   `revoked_at`, and `expires_at` may change.
/// - The raw key material never appears in this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key identifier.
    pub id: ApiKeyId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Owning agent.
    pub agent_id: AgentId,
    /// Public lookup prefix enabling O(1) retrieval.
    pub prefix: String,
    /// Hex-encoded hash of the full key, verified in constant time.
    pub key_hash: String,
    /// Operator-facing label.
    pub label: Option<String>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last successful verification timestamp.
    pub last_used_at: Option<OffsetDateTime>,
    /// Revocation timestamp; a revoked key never verifies.
    pub revoked_at: Option<OffsetDateTime>,
    /// Expiry timestamp; an expired key never verifies.
    pub expires_at: Option<OffsetDateTime>,
}

impl ApiKey {
    /// Returns true when the key is neither revoked nor expired at `now`.
    #[must_use]
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        self.expires_at.is_none_or(|expires| expires > now)
    }
}

/// Prefix length carved off a raw key for O(1) lookup.
pub const KEY_PREFIX_CHARS: usize = 12;

/// Hashes a raw API key to its stored hex form.
#[must_use]
pub fn hash_key(raw_key: &str) -> String {
    let digest = Sha256::digest(raw_key.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Returns the lookup prefix for a raw key.
#[must_use]
pub fn key_prefix(raw_key: &str) -> String {
    raw_key.chars().take(KEY_PREFIX_CHARS).collect()
}

// ============================================================================
// SECTION: Access Grants
// ============================================================================

/// Resource class covered by an access grant.
///
/// # Invariants
/// - Variants are stable for serialization and store round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantResource {
    /// Read access to the grantor agent's decision traces.
    AgentTraces,
}

impl GrantResource {
    /// Returns the stable label used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentTraces => "agent_traces",
        }
    }

    /// Parses a stable label back into a resource class.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "agent_traces" => Some(Self::AgentTraces),
            _ => None,
        }
    }
}

/// Time-bounded capability letting one agent read another's traces.
///
/// # Invariants
/// - `grantor` and `grantee` belong to `org_id`.
/// - An expired grant contributes nothing to the effective read set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Grant identifier.
    pub id: GrantId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Agent whose traces become readable.
    pub grantor: AgentId,
    /// Agent receiving read access.
    pub grantee: AgentId,
    /// Resource class covered by the grant.
    pub resource: GrantResource,
    /// Optional resource narrowing (reserved; `None` covers all of the class).
    pub resource_id: Option<String>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Expiry timestamp; `None` means the grant does not expire.
    pub expires_at: Option<OffsetDateTime>,
}

impl AccessGrant {
    /// Returns true when the grant is active at `now`.
    #[must_use]
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }
}
