// crates/akashi-engine/src/service.rs
// ============================================================================
// Module: Decision Service
// Description: Trace orchestration, revisions, verification, queries, search.
// Purpose: Drive the write path and the read operations of the audit trail.
// Dependencies: akashi-core, akashi-ingest, serde_json, sha2, tokio
// ============================================================================

//! ## Overview
//! The trace operation resolves the caller's run, computes the canonical
//! content hash, writes the decision with its children and outbox row in
//! one store transaction, emits a `decision_made` event, and schedules
//! async enrichment: embeddings, claim splitting, completeness, and
//! conflict scoring. Enrichment is best-effort; a user write fails only
//! when the transactional core fails. Idempotency keys replay the original
//! receipt and reject reuse with a different request hash. Reads are
//! access-scoped by the caller's effective read set, and user-facing search
//! degrades to the text backend when the vector index is unavailable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use akashi_core::Agent;
use akashi_core::AgentErasure;
use akashi_core::AgentId;
use akashi_core::AgentRole;
use akashi_core::AgentRun;
use akashi_core::AgentStore;
use akashi_core::Alternative;
use akashi_core::AlternativeId;
use akashi_core::ApiKey;
use akashi_core::ApiKeyId;
use akashi_core::ClaimId;
use akashi_core::ConflictId;
use akashi_core::ConflictQuery;
use akashi_core::ConflictResolution;
use akashi_core::ConflictStore;
use akashi_core::ContentHash;
use akashi_core::Decision;
use akashi_core::DecisionClaim;
use akashi_core::DecisionDraft;
use akashi_core::DecisionId;
use akashi_core::DecisionQuery;
use akashi_core::DecisionStore;
use akashi_core::DecisionType;
use akashi_core::DecisionWrite;
use akashi_core::DraftLimits;
use akashi_core::EmbeddingProvider;
use akashi_core::EventKind;
use akashi_core::Evidence;
use akashi_core::EvidenceId;
use akashi_core::IdempotencyOutcome;
use akashi_core::IdempotencyStore;
use akashi_core::IndexQuery;
use akashi_core::NewEvent;
use akashi_core::OrgId;
use akashi_core::QueryVector;
use akashi_core::ReadScope;
use akashi_core::RunId;
use akashi_core::RunStatus;
use akashi_core::RunStore;
use akashi_core::ScoredConflict;
use akashi_core::SessionId;
use akashi_core::StoreError;
use akashi_core::TraceReceipt;
use akashi_core::VectorIndex;
use akashi_core::core::agent::hash_key;
use akashi_core::core::agent::key_prefix;
use akashi_core::core::time::truncate_micros;
use akashi_core::decision_content_hash;
use akashi_core::runtime::claims::DEFAULT_MAX_CLAIMS;
use akashi_core::runtime::claims::split_claims;
use akashi_core::runtime::completeness::CompletenessInputs;
use akashi_core::runtime::completeness::completeness_score;
use akashi_core::runtime::validation::validate_draft;
use akashi_ingest::EventBuffer;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::scorer::ConflictScorer;

// ============================================================================
// SECTION: Requests and Reports
// ============================================================================

/// Trace request carried from the outer surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRequest {
    /// Caller organization.
    pub org_id: OrgId,
    /// Caller agent.
    pub agent_id: AgentId,
    /// API key used for the write, when known.
    pub api_key_id: Option<ApiKeyId>,
    /// Decision payload.
    pub decision: DecisionDraft,
    /// Influential prior decision.
    pub precedent_ref: Option<DecisionId>,
    /// Optional idempotency key.
    pub idempotency_key: Option<String>,
}

/// Revision request carried from the outer surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviseRequest {
    /// Caller organization.
    pub org_id: OrgId,
    /// Caller agent.
    pub agent_id: AgentId,
    /// API key used for the write, when known.
    pub api_key_id: Option<ApiKeyId>,
    /// Decision being revised.
    pub predecessor: DecisionId,
    /// Replacement payload.
    pub decision: DecisionDraft,
}

/// Content hash verification report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// True when the stored and recomputed hashes match.
    pub valid: bool,
    /// Hash stored with the decision.
    pub stored_hash: ContentHash,
    /// Hash recomputed from the stored content fields.
    pub computed_hash: ContentHash,
}

/// Precedent check report.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    /// True when at least one matching decision exists.
    pub has_precedent: bool,
    /// Matching decisions.
    pub decisions: Vec<Decision>,
    /// Open conflicts involving the decision type.
    pub conflicts: Vec<ScoredConflict>,
}

/// Search backend actually used; surfaces as the `X-Search-Backend` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    /// ANN over the vector index.
    Vector,
    /// Full-text fallback in the store.
    Text,
}

impl SearchBackend {
    /// Returns the stable header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Text => "text",
        }
    }
}

/// One search hit with its backend score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Matching decision.
    pub decision: Decision,
    /// Backend similarity or relevance score.
    pub score: f64,
}

/// Search outcome with the backend indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Backend that produced the hits.
    pub backend: SearchBackend,
    /// Ranked hits.
    pub hits: Vec<SearchHit>,
}

/// Service configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Draft validation limits.
    pub limits: DraftLimits,
    /// Claim cap per outcome.
    pub max_claims: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            limits: DraftLimits::default(),
            max_claims: DEFAULT_MAX_CLAIMS,
        }
    }
}

/// Endpoint label recorded with trace idempotency keys.
const TRACE_ENDPOINT: &str = "trace";

// ============================================================================
// SECTION: Service
// ============================================================================

/// Decision service orchestrating writes, enrichment, and reads.
#[derive(Clone)]
pub struct DecisionService {
    /// Decision store.
    decisions: Arc<dyn DecisionStore>,
    /// Run store.
    runs: Arc<dyn RunStore>,
    /// Conflict store.
    conflicts: Arc<dyn ConflictStore>,
    /// Agent directory.
    agents: Arc<dyn AgentStore>,
    /// Idempotency store.
    idempotency: Arc<dyn IdempotencyStore>,
    /// Embedding provider.
    embeddings: Arc<dyn EmbeddingProvider>,
    /// Vector index for user-facing search.
    index: Arc<dyn VectorIndex>,
    /// Conflict scorer invoked after enrichment.
    scorer: Arc<ConflictScorer>,
    /// Event ingestion buffer.
    events: Arc<EventBuffer>,
    /// Service configuration.
    options: ServiceOptions,
}

impl DecisionService {
    /// Builds the service.
    #[expect(clippy::too_many_arguments, reason = "Lifecycle wiring passes each seam once.")]
    #[must_use]
    pub fn new(
        decisions: Arc<dyn DecisionStore>,
        runs: Arc<dyn RunStore>,
        conflicts: Arc<dyn ConflictStore>,
        agents: Arc<dyn AgentStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        scorer: Arc<ConflictScorer>,
        events: Arc<EventBuffer>,
        options: ServiceOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            decisions,
            runs,
            conflicts,
            agents,
            idempotency,
            embeddings,
            index,
            scorer,
            events,
            options,
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Records one decision trace atomically and schedules enrichment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a malformed draft,
    /// [`StoreError::Conflict`] for idempotency reuse with a different
    /// request, and the store error when the transactional write fails.
    pub async fn trace(&self, request: TraceRequest) -> Result<TraceReceipt, StoreError> {
        validate_draft(&request.decision, &self.options.limits)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;

        if let Some(key) = &request.idempotency_key {
            let hash = request_hash(&json!({
                "agent_id": request.agent_id,
                "decision": request.decision,
                "precedent_ref": request.precedent_ref,
            }));
            match self
                .idempotency
                .begin_idempotent(request.org_id, &request.agent_id, TRACE_ENDPOINT, key, &hash)
                .await?
            {
                IdempotencyOutcome::Started => {}
                IdempotencyOutcome::Replay(response) => {
                    let receipt: TraceReceipt = serde_json::from_value(response)
                        .map_err(|err| StoreError::Fatal(format!("stored receipt: {err}")))?;
                    return Ok(receipt);
                }
                IdempotencyOutcome::Mismatch => {
                    return Err(StoreError::Conflict(
                        "idempotency key reused with a different request".to_string(),
                    ));
                }
                IdempotencyOutcome::InProgress => {
                    return Err(StoreError::Conflict(
                        "idempotent write still in progress".to_string(),
                    ));
                }
            }
        }

        let run = self
            .resolve_run(request.org_id, &request.agent_id, request.decision.session_id.as_ref())
            .await?;
        let write = build_write(&request, run.id);
        let decision = write.decision.clone();
        self.decisions.create_decision(&write).await?;

        let event_count = self.emit_decision_event(&decision, EventKind::DecisionMade).await;
        let receipt = TraceReceipt {
            run_id: run.id,
            decision_id: decision.id,
            event_count,
        };

        if let Some(key) = &request.idempotency_key {
            let response = serde_json::to_value(receipt)
                .map_err(|err| StoreError::Fatal(format!("receipt encode: {err}")))?;
            self.idempotency
                .complete_idempotent(
                    request.org_id,
                    &request.agent_id,
                    TRACE_ENDPOINT,
                    key,
                    &response,
                )
                .await?;
        }

        self.spawn_enrichment(decision);
        Ok(receipt)
    }

    /// Revises a decision: closes the predecessor and writes the successor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for a missing predecessor and
    /// [`StoreError::Invalid`] when it is already superseded.
    pub async fn revise(&self, request: ReviseRequest) -> Result<TraceReceipt, StoreError> {
        validate_draft(&request.decision, &self.options.limits)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        // Existence and tenancy check before the write transaction.
        let predecessor = self.decisions.decision(request.org_id, request.predecessor).await?;

        let run = self
            .resolve_run(request.org_id, &request.agent_id, request.decision.session_id.as_ref())
            .await?;
        let trace_request = TraceRequest {
            org_id: request.org_id,
            agent_id: request.agent_id,
            api_key_id: request.api_key_id,
            decision: request.decision,
            precedent_ref: None,
            idempotency_key: None,
        };
        let mut write = build_write(&trace_request, run.id);
        write.decision.supersedes_id = Some(predecessor.id);
        let decision = write.decision.clone();
        self.decisions.revise_decision(predecessor.id, &write).await?;

        let event_count = self.emit_decision_event(&decision, EventKind::DecisionRevised).await;
        self.spawn_enrichment(decision.clone());
        Ok(TraceReceipt {
            run_id: run.id,
            decision_id: decision.id,
            event_count,
        })
    }

    /// Resolves the caller's running run, creating one when absent.
    async fn resolve_run(
        &self,
        org_id: OrgId,
        agent_id: &AgentId,
        session_id: Option<&SessionId>,
    ) -> Result<AgentRun, StoreError> {
        if let Some(run) = self.runs.latest_running_run(org_id, agent_id, session_id).await? {
            return Ok(run);
        }
        let run = AgentRun {
            id: RunId::generate(),
            org_id,
            agent_id: agent_id.clone(),
            session_id: session_id.cloned(),
            parent_run_id: None,
            status: RunStatus::Running,
            started_at: OffsetDateTime::now_utc(),
            completed_at: None,
        };
        self.runs.create_run(&run).await?;
        Ok(run)
    }

    /// Emits the decision lifecycle event; enrichment-grade best effort.
    async fn emit_decision_event(&self, decision: &Decision, kind: EventKind) -> u64 {
        let event = NewEvent {
            org_id: decision.org_id,
            agent_id: decision.agent_id.clone(),
            run_id: decision.run_id,
            kind,
            occurred_at: decision.created_at,
            payload: json!({
                "decision_id": decision.id,
                "decision_type": decision.decision_type,
            }),
        };
        match self.events.append(event).await {
            Ok(_) => 1,
            Err(err) => {
                tracing::warn!(decision = %decision.id, error = %err, "decision event dropped");
                0
            }
        }
    }

    // ------------------------------------------------------------------
    // Enrichment
    // ------------------------------------------------------------------

    /// Schedules async enrichment for a freshly written decision.
    fn spawn_enrichment(&self, decision: Decision) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(err) = service.enrich_decision(decision).await {
                tracing::warn!(error = %err, "decision enrichment failed");
            }
        });
    }

    /// Enriches one decision: embeddings, claims, completeness, scoring.
    ///
    /// Exposed for the backfill loops and deterministic tests; failures
    /// never propagate to the original writer. Completeness inputs come
    /// from the stored row and its committed children, so the write path
    /// and the backfill path score the same decision identically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a store update fails; provider failures
    /// map to the transient kind.
    pub async fn enrich_decision(&self, mut decision: Decision) -> Result<(), StoreError> {
        let decision_text = format!(
            "{}\n{}\n{}",
            decision.decision_type.as_str(),
            decision.outcome,
            decision.reasoning
        );
        let embedding = self
            .embeddings
            .embed(&decision_text)
            .await
            .map_err(|err| StoreError::Transient(err.to_string()))?;
        let outcome_embedding = self
            .embeddings
            .embed(&decision.outcome)
            .await
            .map_err(|err| StoreError::Transient(err.to_string()))?;
        self.decisions.set_embeddings(decision.id, &embedding, &outcome_embedding).await?;
        decision.embedding = Some(embedding);
        decision.outcome_embedding = Some(outcome_embedding);

        let fragments = split_claims(&decision.outcome, self.options.max_claims);
        if !fragments.is_empty() {
            let vectors = self
                .embeddings
                .embed_batch(&fragments)
                .await
                .map_err(|err| StoreError::Transient(err.to_string()))?;
            let claims: Vec<DecisionClaim> = fragments
                .into_iter()
                .zip(vectors)
                .enumerate()
                .map(|(position, (text, vector))| DecisionClaim {
                    id: ClaimId::generate(),
                    decision_id: decision.id,
                    position: u32::try_from(position).unwrap_or(u32::MAX),
                    text,
                    embedding: Some(vector),
                })
                .collect();
            self.decisions.replace_claims(decision.id, &claims).await?;
        }

        let presence = self.decisions.decision_children_presence(decision.id).await?;
        let score = completeness_score(&CompletenessInputs {
            decision_type: &decision.decision_type,
            outcome: &decision.outcome,
            reasoning: &decision.reasoning,
            confidence: decision.confidence,
            has_alternatives: presence.has_alternatives,
            has_evidence: presence.has_evidence,
        });
        self.decisions.set_completeness(decision.id, score).await?;
        decision.completeness_score = Some(score);

        let conflicts = self.scorer.score_decision(&decision).await?;
        tracing::debug!(decision = %decision.id, conflicts, "enrichment complete");
        Ok(())
    }

    /// Backfills embeddings and scoring for decisions that missed them.
    ///
    /// Idempotent and bounded by `batch`; re-running converges to no work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the batch query fails.
    pub async fn backfill_embeddings(&self, batch: u32) -> Result<u64, StoreError> {
        let missing = self.decisions.decisions_missing_embeddings(batch).await?;
        let mut updated = 0;
        for decision in missing {
            if let Err(err) = self.enrich_decision(decision).await {
                tracing::warn!(error = %err, "embedding backfill failed for one decision");
                continue;
            }
            updated += 1;
        }
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Verification and Reads
    // ------------------------------------------------------------------

    /// Verifies a stored decision's content hash.
    ///
    /// A mismatch is reported, logged as tamper evidence, and does not
    /// crash the process.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the decision is absent.
    pub async fn verify(&self, org_id: OrgId, id: DecisionId) -> Result<VerifyReport, StoreError> {
        let decision = self.decisions.decision(org_id, id).await?;
        let computed = decision_content_hash(
            decision.id,
            &decision.decision_type,
            &decision.outcome,
            decision.confidence,
            &decision.reasoning,
            decision.valid_from,
        );
        let valid = computed.ct_eq(&decision.content_hash);
        if !valid {
            tracing::error!(decision = %id, "stored content hash mismatch");
        }
        Ok(VerifyReport {
            valid,
            stored_hash: decision.content_hash,
            computed_hash: computed,
        })
    }

    /// Returns the full revision chain containing `id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the decision is absent.
    pub async fn revisions(
        &self,
        org_id: OrgId,
        id: DecisionId,
    ) -> Result<Vec<Decision>, StoreError> {
        self.decisions.revision_chain(org_id, id).await
    }

    /// Queries decisions under the caller's read scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub async fn query(
        &self,
        org_id: OrgId,
        scope: &ReadScope,
        mut query: DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError> {
        query.agent_ids = scope.as_filter();
        self.decisions.query_decisions(org_id, &query).await
    }

    /// Point-in-time query under the caller's read scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub async fn temporal_query(
        &self,
        org_id: OrgId,
        scope: &ReadScope,
        as_of: OffsetDateTime,
        mut query: DecisionQuery,
    ) -> Result<Vec<Decision>, StoreError> {
        query.agent_ids = scope.as_filter();
        self.decisions.decisions_as_of(org_id, as_of, &query).await
    }

    /// Precedent check: matching decisions plus open conflicts for a type.
    ///
    /// Both branches constrain by decision type server-side, so `limit`
    /// bounds typed results and a ranked-out precedent is never dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a query fails.
    pub async fn check(
        &self,
        org_id: OrgId,
        scope: &ReadScope,
        decision_type: &DecisionType,
        query_text: Option<&str>,
        limit: u32,
    ) -> Result<CheckReport, StoreError> {
        let decisions = if let Some(text) = query_text {
            let outcome = self.search(org_id, scope, text, Some(decision_type), limit).await?;
            outcome.hits.into_iter().map(|hit| hit.decision).collect()
        } else {
            let query = DecisionQuery {
                agent_ids: scope.as_filter(),
                decision_type: Some(decision_type.clone()),
                current_only: true,
                limit,
                ..DecisionQuery::default()
            };
            self.decisions.query_decisions(org_id, &query).await?
        };
        let conflicts = self.conflicts.open_conflicts_for_type(org_id, decision_type, limit).await?;
        Ok(CheckReport {
            has_precedent: !decisions.is_empty(),
            decisions,
            conflicts,
        })
    }

    /// Semantic search with text fallback when the index is unavailable.
    ///
    /// A decision type, when provided, is applied server-side on both
    /// backends so `limit` bounds typed results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when both backends fail.
    pub async fn search(
        &self,
        org_id: OrgId,
        scope: &ReadScope,
        text: &str,
        decision_type: Option<&DecisionType>,
        limit: u32,
    ) -> Result<SearchOutcome, StoreError> {
        if self.index.healthy().await
            && let Ok(vector) = self.embeddings.embed(text).await
        {
            let query = IndexQuery {
                vector,
                using: QueryVector::Decision,
                decision_type: decision_type.map(DecisionType::normalized),
                exclude: Vec::new(),
                limit,
            };
            match self.index.search(org_id, &query).await {
                Ok(hits) => {
                    let mut results = Vec::with_capacity(hits.len());
                    for hit in hits {
                        match self.decisions.decision(org_id, hit.decision_id).await {
                            Ok(decision) => {
                                if scope.permits(&decision.agent_id) {
                                    results.push(SearchHit {
                                        decision,
                                        score: hit.score,
                                    });
                                }
                            }
                            Err(StoreError::NotFound(_)) => {}
                            Err(err) => return Err(err),
                        }
                    }
                    return Ok(SearchOutcome {
                        backend: SearchBackend::Vector,
                        hits: results,
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "vector search failed; degrading to text");
                }
            }
        }

        let agent_filter = scope.as_filter();
        let hits = self
            .decisions
            .search_decisions_text(org_id, text, decision_type, agent_filter.as_deref(), limit)
            .await?;
        Ok(SearchOutcome {
            backend: SearchBackend::Text,
            hits: hits
                .into_iter()
                .map(|hit| SearchHit {
                    decision: hit.decision,
                    score: hit.rank,
                })
                .collect(),
        })
    }

    // ------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------

    /// Lists conflicts ordered by significance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub async fn list_conflicts(
        &self,
        org_id: OrgId,
        query: &ConflictQuery,
    ) -> Result<Vec<ScoredConflict>, StoreError> {
        self.conflicts.query_conflicts(org_id, query).await
    }

    /// Applies a resolution transition on behalf of `caller`.
    ///
    /// Non-admin callers may resolve only conflicts involving their own
    /// decisions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Forbidden`] for an unauthorized caller,
    /// [`StoreError::Invalid`] for an illegal transition, and
    /// [`StoreError::NotFound`] for a missing conflict.
    pub async fn resolve_conflict(
        &self,
        caller: &Agent,
        conflict_id: ConflictId,
        resolution: ConflictResolution,
    ) -> Result<ScoredConflict, StoreError> {
        if !caller.role.is_admin() {
            let conflict = self.conflicts.conflict(caller.org_id, conflict_id).await?;
            let side_a = self.decisions.decision(caller.org_id, conflict.pair.a).await?;
            let side_b = self.decisions.decision(caller.org_id, conflict.pair.b).await?;
            if side_a.agent_id != caller.agent_id && side_b.agent_id != caller.agent_id {
                return Err(StoreError::Forbidden(
                    "conflict involves other agents' decisions".to_string(),
                ));
            }
        }
        self.conflicts.resolve_conflict(caller.org_id, conflict_id, &resolution).await
    }

    // ------------------------------------------------------------------
    // Agent Administration
    // ------------------------------------------------------------------

    /// Creates an agent with an initial API key; admin-only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Forbidden`] for non-admin callers and
    /// [`StoreError::Conflict`] for a duplicate agent identifier.
    pub async fn create_agent(
        &self,
        caller: &Agent,
        agent_id: AgentId,
        display_name: String,
        role: AgentRole,
        raw_api_key: &str,
        tags: Vec<String>,
    ) -> Result<Agent, StoreError> {
        if !caller.role.is_admin() {
            return Err(StoreError::Forbidden("agent creation requires admin".to_string()));
        }
        let now = OffsetDateTime::now_utc();
        let agent = Agent {
            org_id: caller.org_id,
            agent_id,
            display_name,
            role,
            tags,
            legacy_key_hash: None,
            created_at: now,
        };
        self.agents.create_agent(&agent).await?;
        let key = ApiKey {
            id: ApiKeyId::generate(),
            org_id: agent.org_id,
            agent_id: agent.agent_id.clone(),
            prefix: key_prefix(raw_api_key),
            key_hash: hash_key(raw_api_key),
            label: Some("initial key".to_string()),
            created_at: now,
            last_used_at: None,
            revoked_at: None,
            expires_at: None,
        };
        self.agents.create_api_key(&key).await?;
        Ok(agent)
    }

    /// Erases an agent with archive-before-delete semantics; admin-only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Forbidden`] for non-admin callers and
    /// [`StoreError::NotFound`] for a missing agent.
    pub async fn delete_agent(
        &self,
        caller: &Agent,
        agent_id: &AgentId,
    ) -> Result<AgentErasure, StoreError> {
        if !caller.role.is_admin() {
            return Err(StoreError::Forbidden("agent erasure requires admin".to_string()));
        }
        self.agents.erase_agent(caller.org_id, agent_id).await
    }
}

// ============================================================================
// SECTION: Write Construction
// ============================================================================

/// Builds the atomic write bundle for a trace request.
fn build_write(request: &TraceRequest, run_id: RunId) -> DecisionWrite {
    let now = truncate_micros(OffsetDateTime::now_utc());
    let id = DecisionId::generate();
    let draft = &request.decision;
    let content_hash = decision_content_hash(
        id,
        &draft.decision_type,
        &draft.outcome,
        draft.confidence,
        &draft.reasoning,
        now,
    );
    let decision = Decision {
        id,
        org_id: request.org_id,
        agent_id: request.agent_id.clone(),
        run_id,
        api_key_id: request.api_key_id,
        session_id: draft.session_id.clone(),
        decision_type: draft.decision_type.clone(),
        outcome: draft.outcome.clone(),
        confidence: draft.confidence,
        reasoning: draft.reasoning.clone(),
        content_hash,
        valid_from: now,
        valid_to: None,
        transaction_time: now,
        created_at: now,
        supersedes_id: None,
        precedent_ref: request.precedent_ref,
        embedding: None,
        outcome_embedding: None,
        agent_context: draft.agent_context.clone(),
        metadata: draft.metadata.clone(),
        completeness_score: None,
        conflict_scored_at: None,
    };
    let alternatives = draft
        .alternatives
        .iter()
        .map(|alternative| Alternative {
            id: AlternativeId::generate(),
            decision_id: id,
            label: alternative.label.clone(),
            score: alternative.score,
            selected: alternative.selected,
            rejection_reason: alternative.rejection_reason.clone(),
        })
        .collect();
    let evidence = draft
        .evidence
        .iter()
        .map(|evidence| Evidence {
            id: EvidenceId::generate(),
            org_id: request.org_id,
            decision_id: id,
            source_type: evidence.source_type.clone(),
            uri: evidence.uri.clone(),
            content: evidence.content.clone(),
            relevance: evidence.relevance,
            embedding: None,
        })
        .collect();
    DecisionWrite {
        decision,
        alternatives,
        evidence,
    }
}

/// Hashes a request body for idempotency comparison.
fn request_hash(value: &Value) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    ContentHash::from_bytes(hasher.finalize().into())
}
