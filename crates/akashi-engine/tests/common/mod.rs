// crates/akashi-engine/tests/common/mod.rs
// ============================================================================
// Module: Engine Test Fixtures
// Description: In-memory stores, index, and providers for engine tests.
// Purpose: Exercise engine behavior without external services.
// ============================================================================
//! ## Overview
//! One in-memory store implements every persistence interface with the
//! same contracts the PostgreSQL adapter honors: atomic trace writes with
//! an outbox row and a captured notification, converging conflict upserts
//! on the ordered pair, bi-temporal filters, and replay-safe idempotency.
//! The stub embedding provider returns scripted vectors so significance is
//! controllable; the stub validator returns a scripted verdict.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    dead_code,
    reason = "Test-only fixtures; not every helper is used by every suite."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use akashi_core::AccessGrant;
use akashi_core::Agent;
use akashi_core::AgentErasure;
use akashi_core::AgentEvent;
use akashi_core::AgentId;
use akashi_core::AgentRun;
use akashi_core::AgentStore;
use akashi_core::Alternative;
use akashi_core::ApiKey;
use akashi_core::ApiKeyId;
use akashi_core::ChildrenPresence;
use akashi_core::ConflictId;
use akashi_core::ConflictQuery;
use akashi_core::ConflictRelationship;
use akashi_core::ConflictResolution;
use akashi_core::ConflictStore;
use akashi_core::ConflictValidator;
use akashi_core::ContentHash;
use akashi_core::Decision;
use akashi_core::DecisionClaim;
use akashi_core::DecisionId;
use akashi_core::DecisionQuery;
use akashi_core::DecisionStore;
use akashi_core::DecisionType;
use akashi_core::DecisionWrite;
use akashi_core::EmbeddingError;
use akashi_core::EmbeddingProvider;
use akashi_core::EventId;
use akashi_core::EventStore;
use akashi_core::Evidence;
use akashi_core::IdempotencyOutcome;
use akashi_core::IdempotencyStore;
use akashi_core::IndexError;
use akashi_core::IndexHit;
use akashi_core::IndexPoint;
use akashi_core::IndexQuery;
use akashi_core::Notifier;
use akashi_core::NotifyChannel;
use akashi_core::OrgId;
use akashi_core::OutboxEntry;
use akashi_core::OutboxEntryId;
use akashi_core::OutboxOperation;
use akashi_core::OutboxStore;
use akashi_core::QueryVector;
use akashi_core::RunId;
use akashi_core::RunStatus;
use akashi_core::RunStore;
use akashi_core::ScoredConflict;
use akashi_core::SessionId;
use akashi_core::StoreError;
use akashi_core::TextSearchHit;
use akashi_core::ValidationInput;
use akashi_core::ValidationVerdict;
use akashi_core::ValidatorClass;
use akashi_core::ValidatorError;
use akashi_core::VectorIndex;
use akashi_core::apply_transition;
use akashi_core::runtime::significance::cosine_similarity;
use async_trait::async_trait;
use serde_json::Value;
use time::Duration;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// Idempotency record held by the memory store.
#[derive(Debug, Clone)]
struct IdemRecord {
    /// Request hash registered with the key.
    request_hash: String,
    /// Stored response once completed.
    response: Option<Value>,
}

/// In-memory store implementing every persistence interface.
#[derive(Default)]
pub struct MemoryStore {
    /// Decisions by identifier.
    pub decisions: Mutex<HashMap<DecisionId, Decision>>,
    /// Alternatives in insertion order.
    pub alternatives: Mutex<Vec<Alternative>>,
    /// Evidence in insertion order.
    pub evidence: Mutex<Vec<Evidence>>,
    /// Claims in insertion order.
    pub claims: Mutex<Vec<DecisionClaim>>,
    /// Runs by identifier.
    pub runs: Mutex<HashMap<RunId, AgentRun>>,
    /// Conflicts keyed by the ordered pair.
    pub conflicts: Mutex<HashMap<(DecisionId, DecisionId), ScoredConflict>>,
    /// Agents keyed by `(org, agent)`.
    pub agents: Mutex<HashMap<(OrgId, AgentId), Agent>>,
    /// API keys in insertion order.
    pub api_keys: Mutex<Vec<ApiKey>>,
    /// Grants in insertion order.
    pub grants: Mutex<Vec<AccessGrant>>,
    /// Events in insertion order.
    pub events: Mutex<Vec<AgentEvent>>,
    /// Outbox rows in insertion order.
    pub outbox: Mutex<Vec<OutboxEntry>>,
    /// Idempotency records.
    idempotency: Mutex<HashMap<(OrgId, AgentId, String, String), IdemRecord>>,
    /// Captured notifications.
    pub notifications: Mutex<Vec<(NotifyChannel, Value)>>,
    /// Global event sequence.
    sequence: AtomicI64,
}

impl MemoryStore {
    /// Builds an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns captured notifications for one channel.
    pub fn notifications_on(&self, channel: NotifyChannel) -> Vec<Value> {
        self.notifications
            .lock()
            .expect("lock")
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Returns every stored conflict.
    pub fn all_conflicts(&self) -> Vec<ScoredConflict> {
        self.conflicts.lock().expect("lock").values().cloned().collect()
    }

    /// Directly overwrites one decision; used to simulate tampering.
    pub fn tamper_decision(&self, id: DecisionId, mutate: impl FnOnce(&mut Decision)) {
        let mut decisions = self.decisions.lock().expect("lock");
        if let Some(decision) = decisions.get_mut(&id) {
            mutate(decision);
        }
    }

    /// Applies the write bundle under one lock scope.
    fn apply_write(&self, write: &DecisionWrite) {
        self.decisions
            .lock()
            .expect("lock")
            .insert(write.decision.id, write.decision.clone());
        self.alternatives.lock().expect("lock").extend(write.alternatives.iter().cloned());
        self.evidence.lock().expect("lock").extend(write.evidence.iter().cloned());
        self.outbox.lock().expect("lock").push(OutboxEntry {
            id: OutboxEntryId::generate(),
            org_id: write.decision.org_id,
            decision_id: write.decision.id,
            operation: OutboxOperation::Upsert,
            attempts: 0,
            last_error: None,
            locked_until: None,
            created_at: write.decision.created_at,
        });
    }

    /// Captures a notification.
    fn capture(&self, channel: NotifyChannel, payload: Value) {
        self.notifications.lock().expect("lock").push((channel, payload));
    }

    /// Applies the structured query filters.
    fn filter(decision: &Decision, query: &DecisionQuery) -> bool {
        if let Some(agent_ids) = &query.agent_ids
            && !agent_ids.contains(&decision.agent_id)
        {
            return false;
        }
        if let Some(decision_type) = &query.decision_type
            && !decision.decision_type.matches(decision_type)
        {
            return false;
        }
        if let Some(confidence_min) = query.confidence_min
            && decision.confidence < confidence_min
        {
            return false;
        }
        if let Some(session) = &query.session_id
            && decision.session_id.as_ref() != Some(session)
        {
            return false;
        }
        if query.current_only && decision.valid_to.is_some() {
            return false;
        }
        true
    }
}

#[async_trait]
impl Notifier for MemoryStore {
    async fn notify(&self, channel: NotifyChannel, payload: &Value) -> Result<(), StoreError> {
        self.capture(channel, payload.clone());
        Ok(())
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn create_decision(&self, write: &DecisionWrite) -> Result<(), StoreError> {
        self.apply_write(write);
        self.capture(
            NotifyChannel::Decisions,
            serde_json::json!({
                "org_id": write.decision.org_id,
                "decision_id": write.decision.id,
            }),
        );
        Ok(())
    }

    async fn revise_decision(
        &self,
        predecessor: DecisionId,
        write: &DecisionWrite,
    ) -> Result<(), StoreError> {
        {
            let mut decisions = self.decisions.lock().expect("lock");
            let Some(previous) = decisions.get_mut(&predecessor) else {
                return Err(StoreError::NotFound(format!("decision {predecessor}")));
            };
            if previous.valid_to.is_some() {
                return Err(StoreError::Invalid(format!(
                    "decision {predecessor} is already superseded"
                )));
            }
            previous.valid_to = Some(write.decision.valid_from);
        }
        self.apply_write(write);
        self.capture(
            NotifyChannel::Decisions,
            serde_json::json!({
                "org_id": write.decision.org_id,
                "decision_id": write.decision.id,
            }),
        );
        Ok(())
    }

    async fn decision(&self, org_id: OrgId, id: DecisionId) -> Result<Decision, StoreError> {
        self.decisions
            .lock()
            .expect("lock")
            .get(&id)
            .filter(|decision| decision.org_id == org_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("decision {id}")))
    }

    async fn revision_chain(
        &self,
        org_id: OrgId,
        id: DecisionId,
    ) -> Result<Vec<Decision>, StoreError> {
        let decisions = self.decisions.lock().expect("lock");
        let target = decisions
            .get(&id)
            .filter(|decision| decision.org_id == org_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("decision {id}")))?;
        let mut chain = vec![target];
        while let Some(previous) = chain[0].supersedes_id {
            let Some(decision) = decisions.get(&previous) else {
                break;
            };
            chain.insert(0, decision.clone());
        }
        loop {
            let tail = chain[chain.len() - 1].id;
            let Some(next) =
                decisions.values().find(|decision| decision.supersedes_id == Some(tail))
            else {
                break;
            };
            chain.push(next.clone());
        }
        Ok(chain)
    }

    async fn query_decisions(
        &self,
        org_id: OrgId,
        query: &DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut matches: Vec<Decision> = self
            .decisions
            .lock()
            .expect("lock")
            .values()
            .filter(|decision| decision.org_id == org_id && Self::filter(decision, query))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn decisions_as_of(
        &self,
        org_id: OrgId,
        as_of: OffsetDateTime,
        query: &DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut matches: Vec<Decision> = self
            .decisions
            .lock()
            .expect("lock")
            .values()
            .filter(|decision| {
                decision.org_id == org_id
                    && decision.transaction_time <= as_of
                    && decision.valid_to.is_none_or(|until| until > as_of)
                    && Self::filter(decision, query)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn search_decisions_text(
        &self,
        org_id: OrgId,
        text: &str,
        decision_type: Option<&DecisionType>,
        agent_ids: Option<&[AgentId]>,
        limit: u32,
    ) -> Result<Vec<TextSearchHit>, StoreError> {
        let needle = text.to_lowercase();
        let hits = self
            .decisions
            .lock()
            .expect("lock")
            .values()
            .filter(|decision| decision.org_id == org_id)
            .filter(|decision| {
                decision_type.is_none_or(|kind| decision.decision_type.matches(kind))
            })
            .filter(|decision| {
                agent_ids.is_none_or(|agents| agents.contains(&decision.agent_id))
            })
            .filter(|decision| {
                decision.outcome.to_lowercase().contains(&needle)
                    || decision.reasoning.to_lowercase().contains(&needle)
                    || decision.decision_type.normalized().contains(&needle)
            })
            .take(limit.max(1) as usize)
            .map(|decision| TextSearchHit {
                decision: decision.clone(),
                rank: 1.0,
            })
            .collect();
        Ok(hits)
    }

    async fn decision_children_presence(
        &self,
        id: DecisionId,
    ) -> Result<ChildrenPresence, StoreError> {
        let has_alternatives = self
            .alternatives
            .lock()
            .expect("lock")
            .iter()
            .any(|alternative| alternative.decision_id == id);
        let has_evidence =
            self.evidence.lock().expect("lock").iter().any(|evidence| evidence.decision_id == id);
        Ok(ChildrenPresence {
            has_alternatives,
            has_evidence,
        })
    }

    async fn find_similar_decisions(
        &self,
        org_id: OrgId,
        embedding: &[f32],
        exclude: &[DecisionId],
        limit: u32,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut scored: Vec<(f64, Decision)> = self
            .decisions
            .lock()
            .expect("lock")
            .values()
            .filter(|decision| decision.org_id == org_id && !exclude.contains(&decision.id))
            .filter_map(|decision| {
                let vector = decision.embedding.as_ref()?;
                let score = cosine_similarity(embedding, vector)?;
                Some((score, decision.clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(limit.max(1) as usize).map(|(_, d)| d).collect())
    }

    async fn set_embeddings(
        &self,
        id: DecisionId,
        embedding: &[f32],
        outcome_embedding: &[f32],
    ) -> Result<(), StoreError> {
        let mut decisions = self.decisions.lock().expect("lock");
        if let Some(decision) = decisions.get_mut(&id) {
            decision.embedding = Some(embedding.to_vec());
            decision.outcome_embedding = Some(outcome_embedding.to_vec());
        }
        Ok(())
    }

    async fn set_completeness(&self, id: DecisionId, score: f64) -> Result<(), StoreError> {
        let mut decisions = self.decisions.lock().expect("lock");
        if let Some(decision) = decisions.get_mut(&id) {
            decision.completeness_score = Some(score);
        }
        Ok(())
    }

    async fn replace_claims(
        &self,
        id: DecisionId,
        claims: &[DecisionClaim],
    ) -> Result<(), StoreError> {
        let mut stored = self.claims.lock().expect("lock");
        stored.retain(|claim| claim.decision_id != id);
        stored.extend(claims.iter().cloned());
        Ok(())
    }

    async fn decisions_missing_embeddings(&self, limit: u32) -> Result<Vec<Decision>, StoreError> {
        Ok(self
            .decisions
            .lock()
            .expect("lock")
            .values()
            .filter(|decision| !decision.has_embeddings())
            .take(limit.max(1) as usize)
            .cloned()
            .collect())
    }

    async fn decisions_pending_conflict_scoring(
        &self,
        limit: u32,
    ) -> Result<Vec<Decision>, StoreError> {
        Ok(self
            .decisions
            .lock()
            .expect("lock")
            .values()
            .filter(|decision| decision.conflict_scored_at.is_none() && decision.has_embeddings())
            .take(limit.max(1) as usize)
            .cloned()
            .collect())
    }

    async fn mark_conflict_scored(
        &self,
        id: DecisionId,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut decisions = self.decisions.lock().expect("lock");
        if let Some(decision) = decisions.get_mut(&id) {
            decision.conflict_scored_at = Some(at);
        }
        Ok(())
    }

    async fn reset_conflict_scored(&self) -> Result<u64, StoreError> {
        let mut decisions = self.decisions.lock().expect("lock");
        let mut reset = 0;
        for decision in decisions.values_mut() {
            if decision.conflict_scored_at.take().is_some() {
                reset += 1;
            }
        }
        Ok(reset)
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, run: &AgentRun) -> Result<(), StoreError> {
        self.runs.lock().expect("lock").insert(run.id, run.clone());
        Ok(())
    }

    async fn run(&self, org_id: OrgId, id: RunId) -> Result<AgentRun, StoreError> {
        self.runs
            .lock()
            .expect("lock")
            .get(&id)
            .filter(|run| run.org_id == org_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))
    }

    async fn latest_running_run(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        session_id: Option<&SessionId>,
    ) -> Result<Option<AgentRun>, StoreError> {
        Ok(self
            .runs
            .lock()
            .expect("lock")
            .values()
            .filter(|run| {
                run.org_id == org_id
                    && run.agent_id == *agent_id
                    && run.status == RunStatus::Running
                    && run.session_id.as_ref() == session_id
            })
            .max_by_key(|run| run.started_at)
            .cloned())
    }

    async fn update_run_status(
        &self,
        org_id: OrgId,
        id: RunId,
        status: RunStatus,
        completed_at: Option<OffsetDateTime>,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().expect("lock");
        let Some(run) = runs.get_mut(&id).filter(|run| run.org_id == org_id) else {
            return Err(StoreError::NotFound(format!("run {id}")));
        };
        run.status = status;
        run.completed_at = completed_at;
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn reserve_sequence_block(&self, count: u32) -> Result<Vec<i64>, StoreError> {
        let mut block = Vec::with_capacity(count as usize);
        for _ in 0..count {
            block.push(self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        }
        Ok(block)
    }

    async fn insert_events(&self, events: &[AgentEvent]) -> Result<u64, StoreError> {
        self.events.lock().expect("lock").extend(events.iter().cloned());
        Ok(events.len() as u64)
    }

    async fn existing_event_ids(&self, ids: &[EventId]) -> Result<Vec<EventId>, StoreError> {
        let events = self.events.lock().expect("lock");
        Ok(events.iter().map(|event| event.id).filter(|id| ids.contains(id)).collect())
    }

    async fn events_for_run(
        &self,
        org_id: OrgId,
        run_id: RunId,
        limit: u32,
    ) -> Result<Vec<AgentEvent>, StoreError> {
        Ok(self
            .events
            .lock()
            .expect("lock")
            .iter()
            .filter(|event| event.org_id == org_id && event.run_id == run_id)
            .take(limit.max(1) as usize)
            .cloned()
            .collect())
    }

    async fn archive_and_purge_before(
        &self,
        org_id: OrgId,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let mut events = self.events.lock().expect("lock");
        let before = events.len();
        events.retain(|event| event.org_id != org_id || event.occurred_at >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[async_trait]
impl ConflictStore for MemoryStore {
    async fn upsert_scored_conflict(
        &self,
        conflict: &ScoredConflict,
    ) -> Result<ConflictId, StoreError> {
        let key = (conflict.pair.a, conflict.pair.b);
        let mut conflicts = self.conflicts.lock().expect("lock");
        let id = if let Some(existing) = conflicts.get_mut(&key) {
            existing.kind = conflict.kind;
            existing.method = conflict.method;
            existing.topic_similarity = conflict.topic_similarity;
            existing.outcome_divergence = conflict.outcome_divergence;
            existing.significance = conflict.significance;
            existing.confidence_weight = conflict.confidence_weight;
            existing.temporal_decay = conflict.temporal_decay;
            existing.relationship = conflict.relationship;
            existing.category = conflict.category.clone();
            existing.severity = conflict.severity.clone();
            existing.explanation = conflict.explanation.clone();
            existing.updated_at = conflict.updated_at;
            existing.id
        } else {
            conflicts.insert(key, conflict.clone());
            conflict.id
        };
        drop(conflicts);
        self.capture(
            NotifyChannel::Conflicts,
            serde_json::json!({"org_id": conflict.org_id, "conflict_id": id}),
        );
        Ok(id)
    }

    async fn conflict(&self, org_id: OrgId, id: ConflictId) -> Result<ScoredConflict, StoreError> {
        self.conflicts
            .lock()
            .expect("lock")
            .values()
            .find(|conflict| conflict.org_id == org_id && conflict.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("conflict {id}")))
    }

    async fn query_conflicts(
        &self,
        org_id: OrgId,
        query: &ConflictQuery,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        let decisions = self.decisions.lock().expect("lock");
        let mut matches: Vec<ScoredConflict> = self
            .conflicts
            .lock()
            .expect("lock")
            .values()
            .filter(|conflict| conflict.org_id == org_id)
            .filter(|conflict| query.kind.is_none_or(|kind| conflict.kind == kind))
            .filter(|conflict| query.status.is_none_or(|status| conflict.status == status))
            .filter(|conflict| {
                query.agent_id.as_ref().is_none_or(|agent| {
                    [conflict.pair.a, conflict.pair.b].iter().any(|id| {
                        decisions.get(id).is_some_and(|decision| decision.agent_id == *agent)
                    })
                })
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.significance.total_cmp(&a.significance));
        Ok(matches)
    }

    async fn open_conflicts_for_type(
        &self,
        org_id: OrgId,
        decision_type: &DecisionType,
        limit: u32,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        let decisions = self.decisions.lock().expect("lock");
        Ok(self
            .conflicts
            .lock()
            .expect("lock")
            .values()
            .filter(|conflict| {
                conflict.org_id == org_id
                    && conflict.status == akashi_core::ConflictStatus::Open
                    && [conflict.pair.a, conflict.pair.b].iter().any(|id| {
                        decisions
                            .get(id)
                            .is_some_and(|decision| decision.decision_type.matches(decision_type))
                    })
            })
            .take(limit.max(1) as usize)
            .cloned()
            .collect())
    }

    async fn resolve_conflict(
        &self,
        org_id: OrgId,
        id: ConflictId,
        resolution: &ConflictResolution,
    ) -> Result<ScoredConflict, StoreError> {
        let mut conflicts = self.conflicts.lock().expect("lock");
        let conflict = conflicts
            .values_mut()
            .find(|conflict| conflict.org_id == org_id && conflict.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("conflict {id}")))?;
        let next = apply_transition(conflict.status, resolution.transition)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        conflict.status = next;
        conflict.resolved_by = Some(resolution.resolved_by.clone());
        conflict.resolved_at = Some(OffsetDateTime::now_utc());
        conflict.resolution_note = resolution.note.clone();
        conflict.resolution_decision_id = resolution.resolution_decision_id;
        conflict.winning_decision_id = resolution.winning_decision_id;
        Ok(conflict.clone())
    }

    async fn count_unvalidated_conflicts(&self) -> Result<u64, StoreError> {
        Ok(self
            .conflicts
            .lock()
            .expect("lock")
            .values()
            .filter(|conflict| conflict.relationship.is_none())
            .count() as u64)
    }

    async fn clear_unvalidated_conflicts(&self) -> Result<u64, StoreError> {
        let mut conflicts = self.conflicts.lock().expect("lock");
        let before = conflicts.len();
        conflicts.retain(|_, conflict| conflict.relationship.is_some());
        Ok((before - conflicts.len()) as u64)
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn lease_outbox_batch(
        &self,
        batch: u32,
        lease: Duration,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut outbox = self.outbox.lock().expect("lock");
        let mut leased = Vec::new();
        for entry in outbox.iter_mut() {
            if leased.len() as u32 >= batch {
                break;
            }
            let claimable = entry.attempts < max_attempts
                && entry.locked_until.is_none_or(|until| until < now);
            if claimable {
                entry.locked_until = Some(now + lease);
                leased.push(entry.clone());
            }
        }
        Ok(leased)
    }

    async fn complete_outbox_entry(&self, id: OutboxEntryId) -> Result<(), StoreError> {
        self.outbox.lock().expect("lock").retain(|entry| entry.id != id);
        Ok(())
    }

    async fn fail_outbox_entry(&self, id: OutboxEntryId, error: &str) -> Result<(), StoreError> {
        let mut outbox = self.outbox.lock().expect("lock");
        if let Some(entry) = outbox.iter_mut().find(|entry| entry.id == id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
            entry.locked_until = None;
        }
        Ok(())
    }

    async fn dead_letter_exhausted(&self, max_attempts: i32) -> Result<u64, StoreError> {
        let mut outbox = self.outbox.lock().expect("lock");
        let before = outbox.len();
        outbox.retain(|entry| entry.attempts < max_attempts);
        Ok((before - outbox.len()) as u64)
    }

    async fn pending_outbox_count(&self) -> Result<u64, StoreError> {
        Ok(self.outbox.lock().expect("lock").len() as u64)
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn ensure_org(&self, _org_id: OrgId, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        let key = (agent.org_id, agent.agent_id.clone());
        let mut agents = self.agents.lock().expect("lock");
        if agents.contains_key(&key) {
            return Err(StoreError::Conflict(format!("agent {}", agent.agent_id)));
        }
        agents.insert(key, agent.clone());
        Ok(())
    }

    async fn agent(&self, org_id: OrgId, agent_id: &AgentId) -> Result<Agent, StoreError> {
        self.agents
            .lock()
            .expect("lock")
            .get(&(org_id, agent_id.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("agent {agent_id}")))
    }

    async fn count_agents(&self) -> Result<u64, StoreError> {
        Ok(self.agents.lock().expect("lock").len() as u64)
    }

    async fn erase_agent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
    ) -> Result<AgentErasure, StoreError> {
        let mut removed = 0;
        {
            let mut agents = self.agents.lock().expect("lock");
            if agents.remove(&(org_id, agent_id.clone())).is_none() {
                return Err(StoreError::NotFound(format!("agent {agent_id}")));
            }
            removed += 1;
        }
        {
            let mut decisions = self.decisions.lock().expect("lock");
            let before = decisions.len();
            decisions
                .retain(|_, decision| !(decision.org_id == org_id && decision.agent_id == *agent_id));
            removed += (before - decisions.len()) as u64;
        }
        Ok(AgentErasure {
            archived_rows: removed,
            removed_rows: removed,
        })
    }

    async fn agents_with_tag_overlap(
        &self,
        org_id: OrgId,
        tags: &[String],
    ) -> Result<Vec<AgentId>, StoreError> {
        Ok(self
            .agents
            .lock()
            .expect("lock")
            .values()
            .filter(|agent| agent.org_id == org_id)
            .filter(|agent| agent.tags.iter().any(|tag| tags.contains(tag)))
            .map(|agent| agent.agent_id.clone())
            .collect())
    }

    async fn active_grants_for(
        &self,
        org_id: OrgId,
        grantee: &AgentId,
    ) -> Result<Vec<AccessGrant>, StoreError> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .grants
            .lock()
            .expect("lock")
            .iter()
            .filter(|grant| {
                grant.org_id == org_id && grant.grantee == *grantee && grant.is_active(now)
            })
            .cloned()
            .collect())
    }

    async fn create_grant(&self, grant: &AccessGrant) -> Result<(), StoreError> {
        self.grants.lock().expect("lock").push(grant.clone());
        Ok(())
    }

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        self.api_keys.lock().expect("lock").push(key.clone());
        Ok(())
    }

    async fn verify_api_key(
        &self,
        prefix: &str,
        raw_key: &str,
    ) -> Result<Option<(Agent, ApiKeyId)>, StoreError> {
        let candidate = akashi_core::core::agent::hash_key(raw_key);
        let keys = self.api_keys.lock().expect("lock");
        let Some(key) = keys.iter().find(|key| key.prefix == prefix) else {
            return Ok(None);
        };
        if key.key_hash != candidate || !key.is_active(OffsetDateTime::now_utc()) {
            return Ok(None);
        }
        let agent = self
            .agents
            .lock()
            .expect("lock")
            .get(&(key.org_id, key.agent_id.clone()))
            .cloned();
        Ok(agent.map(|agent| (agent, key.id)))
    }

    async fn migrate_agent_keys_to_api_keys(&self) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn refresh_agent_state(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn begin_idempotent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        endpoint: &str,
        key: &str,
        request_hash: &ContentHash,
    ) -> Result<IdempotencyOutcome, StoreError> {
        let map_key = (org_id, agent_id.clone(), endpoint.to_string(), key.to_string());
        let mut records = self.idempotency.lock().expect("lock");
        if let Some(record) = records.get(&map_key) {
            if record.request_hash != request_hash.to_hex() {
                return Ok(IdempotencyOutcome::Mismatch);
            }
            return Ok(record.response.clone().map_or(IdempotencyOutcome::InProgress, |response| {
                IdempotencyOutcome::Replay(response)
            }));
        }
        records.insert(map_key, IdemRecord {
            request_hash: request_hash.to_hex(),
            response: None,
        });
        Ok(IdempotencyOutcome::Started)
    }

    async fn complete_idempotent(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        endpoint: &str,
        key: &str,
        response: &Value,
    ) -> Result<(), StoreError> {
        let map_key = (org_id, agent_id.clone(), endpoint.to_string(), key.to_string());
        if let Some(record) = self.idempotency.lock().expect("lock").get_mut(&map_key) {
            record.response = Some(response.clone());
        }
        Ok(())
    }

    async fn purge_idempotency_keys(
        &self,
        _completed_ttl: Duration,
        _abandoned_ttl: Duration,
    ) -> Result<u64, StoreError> {
        Ok(0)
    }
}

// ============================================================================
// SECTION: Memory Index
// ============================================================================

/// In-memory vector index with a health switch.
#[derive(Default)]
pub struct MemoryIndex {
    /// Stored points by decision identifier.
    pub points: Mutex<HashMap<DecisionId, IndexPoint>>,
    /// Health flag; unhealthy forces callers onto text fallback.
    healthy: AtomicBool,
}

impl MemoryIndex {
    /// Builds a healthy index.
    pub fn new() -> Arc<Self> {
        let index = Self::default();
        index.healthy.store(true, Ordering::SeqCst);
        Arc::new(index)
    }

    /// Flips the health flag.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Indexes a decision directly, mirroring the outbox worker.
    pub fn insert_decision(&self, decision: &Decision) {
        if let (Some(embedding), Some(outcome)) =
            (decision.embedding.clone(), decision.outcome_embedding.clone())
        {
            self.points.lock().expect("lock").insert(decision.id, IndexPoint {
                decision_id: decision.id,
                org_id: decision.org_id,
                decision_vector: embedding,
                outcome_vector: outcome,
                decision_type: decision.decision_type.normalized(),
                agent_id: decision.agent_id.as_str().to_string(),
            });
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, point: &IndexPoint) -> Result<(), IndexError> {
        self.points.lock().expect("lock").insert(point.decision_id, point.clone());
        Ok(())
    }

    async fn delete(&self, decision_id: DecisionId) -> Result<(), IndexError> {
        self.points.lock().expect("lock").remove(&decision_id);
        Ok(())
    }

    async fn search(
        &self,
        org_id: OrgId,
        query: &IndexQuery,
    ) -> Result<Vec<IndexHit>, IndexError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("index marked unhealthy".to_string()));
        }
        let mut hits: Vec<IndexHit> = self
            .points
            .lock()
            .expect("lock")
            .values()
            .filter(|point| point.org_id == org_id)
            .filter(|point| !query.exclude.contains(&point.decision_id))
            .filter(|point| {
                query.decision_type.as_ref().is_none_or(|kind| point.decision_type == *kind)
            })
            .filter_map(|point| {
                let vector = match query.using {
                    QueryVector::Decision => &point.decision_vector,
                    QueryVector::Outcome => &point.outcome_vector,
                };
                let score = cosine_similarity(&query.vector, vector)?;
                Some(IndexHit {
                    decision_id: point.decision_id,
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.limit.max(1) as usize);
        Ok(hits)
    }

    async fn healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Stub Providers
// ============================================================================

/// Embedding provider returning scripted vectors by substring match.
pub struct StubEmbeddings {
    /// `(needle, vector)` rules checked in order.
    rules: Mutex<Vec<(String, Vec<f32>)>>,
    /// Fallback vector when no rule matches.
    fallback: Vec<f32>,
}

impl StubEmbeddings {
    /// Builds a provider with a unit fallback vector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(Vec::new()),
            fallback: vec![1.0, 0.0],
        })
    }

    /// Adds a substring rule mapping texts to a fixed vector.
    pub fn rule(&self, needle: &str, vector: Vec<f32>) {
        self.rules.lock().expect("lock").push((needle.to_string(), vector));
    }

    /// Resolves the vector for one text.
    fn resolve(&self, text: &str) -> Vec<f32> {
        let rules = self.rules.lock().expect("lock");
        for (needle, vector) in rules.iter() {
            if text.contains(needle.as_str()) {
                return vector.clone();
            }
        }
        self.fallback.clone()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.resolve(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.resolve(text)).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Validator returning one scripted verdict for every pair.
pub struct StubValidator {
    /// Implementation class to report.
    pub class: ValidatorClass,
    /// Scripted relationship.
    pub relationship: ConflictRelationship,
}

#[async_trait]
impl ConflictValidator for StubValidator {
    fn class(&self) -> ValidatorClass {
        self.class
    }

    async fn validate(
        &self,
        _input: &ValidationInput,
    ) -> Result<ValidationVerdict, ValidatorError> {
        Ok(ValidationVerdict {
            relationship: self.relationship,
            category: Some("test".to_string()),
            severity: Some("high".to_string()),
            explanation: Some("scripted verdict".to_string()),
        })
    }
}
