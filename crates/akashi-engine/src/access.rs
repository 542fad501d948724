// crates/akashi-engine/src/access.rs
// ============================================================================
// Module: Access Resolver
// Description: Effective read-scope resolution with a short-TTL cache.
// Purpose: Amortize grant and tag lookups across a session's reads.
// Dependencies: akashi-core, tokio
// ============================================================================

//! ## Overview
//! Every read resolves the caller's effective scope: own agent, agents
//! covered by an active `agent_traces` grant, and agents sharing a tag.
//! Admin-and-above roles bypass filtering. Results memoize per caller with
//! a short TTL so a burst of reads costs one pair of store lookups; grant
//! or tag changes become visible when the entry expires or is invalidated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use akashi_core::Agent;
use akashi_core::AgentId;
use akashi_core::AgentStore;
use akashi_core::OrgId;
use akashi_core::ReadScope;
use akashi_core::StoreError;
use akashi_core::effective_read_scope;
use tokio::sync::RwLock;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Cache key per caller.
type CacheKey = (OrgId, AgentId);

/// One memoized scope with its refresh instant.
struct CachedScope {
    /// Resolution instant.
    resolved_at: Instant,
    /// Memoized scope.
    scope: ReadScope,
}

/// Read-scope resolver with a short-TTL read-through cache.
///
/// # Invariants
/// - Cached entries never outlive the TTL.
/// - Admin scopes are computed, never cached (they are free to compute).
pub struct AccessResolver {
    /// Agent directory used for grant and tag lookups.
    agents: Arc<dyn AgentStore>,
    /// Cache TTL.
    ttl: Duration,
    /// Memoized scopes per caller.
    cache: RwLock<HashMap<CacheKey, CachedScope>>,
}

impl AccessResolver {
    /// Builds a resolver with the given TTL.
    #[must_use]
    pub fn new(agents: Arc<dyn AgentStore>, ttl: Duration) -> Self {
        Self {
            agents,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves the caller's effective read scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when grant or tag lookups fail.
    pub async fn scope_for(&self, caller: &Agent) -> Result<ReadScope, StoreError> {
        if caller.role.is_admin() {
            return Ok(ReadScope::All);
        }
        let key = (caller.org_id, caller.agent_id.clone());
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key)
                && entry.resolved_at.elapsed() < self.ttl
            {
                return Ok(entry.scope.clone());
            }
        }

        let granted: Vec<AgentId> = self
            .agents
            .active_grants_for(caller.org_id, &caller.agent_id)
            .await?
            .into_iter()
            .map(|grant| grant.grantor)
            .collect();
        let tag_shared = if caller.tags.is_empty() {
            Vec::new()
        } else {
            self.agents.agents_with_tag_overlap(caller.org_id, &caller.tags).await?
        };
        let scope = effective_read_scope(caller, granted, tag_shared);

        self.cache.write().await.insert(key, CachedScope {
            resolved_at: Instant::now(),
            scope: scope.clone(),
        });
        Ok(scope)
    }

    /// Drops the memoized scope for one caller.
    pub async fn invalidate(&self, org_id: OrgId, agent_id: &AgentId) {
        self.cache.write().await.remove(&(org_id, agent_id.clone()));
    }

    /// Drops every memoized scope; used at shutdown and on grant writes.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}
