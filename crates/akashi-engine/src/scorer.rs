// crates/akashi-engine/src/scorer.rs
// ============================================================================
// Module: Conflict Scorer
// Description: Two-stage conflict detection over decision embeddings.
// Purpose: Find candidates cheaply, classify expensively, persist upserts.
// Dependencies: akashi-core, time, tokio
// ============================================================================

//! ## Overview
//! Scoring is two-stage. The cheap stage asks the vector index for
//! neighbors of the target's decision embedding, excluding the target's
//! whole revision chain (walked transitively in both directions: a
//! decision and its own revision are supersession by construction) and any
//! candidate whose normalized decision type differs. Each surviving pair
//! gets a significance score (topic similarity times outcome divergence
//! times temporal decay times confidence weight); pairs below the
//! threshold are skipped. The expensive stage, when a validator is
//! configured, classifies the relationship; only contradiction and
//! supersession persist. Unparseable validator output rejects the pair;
//! transport failures persist the pair unvalidated so the signal survives.
//! When the index is unavailable, candidates come from the store's own
//! embedding search.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use akashi_core::ConflictId;
use akashi_core::ConflictKind;
use akashi_core::ConflictPair;
use akashi_core::ConflictStatus;
use akashi_core::ConflictStore;
use akashi_core::ConflictValidator;
use akashi_core::Decision;
use akashi_core::DecisionId;
use akashi_core::DecisionStore;
use akashi_core::IndexQuery;
use akashi_core::QueryVector;
use akashi_core::ScoredConflict;
use akashi_core::ScoringMethod;
use akashi_core::StoreError;
use akashi_core::ValidationInput;
use akashi_core::ValidatorClass;
use akashi_core::ValidatorError;
use akashi_core::VectorIndex;
use akashi_core::runtime::significance;
use time::OffsetDateTime;
use tokio::task::JoinSet;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Conflict scorer configuration.
///
/// # Invariants
/// - `significance_threshold` lies in `[0, 1]`; `lambda_days` is positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorerOptions {
    /// Significance threshold below which pairs are skipped.
    pub significance_threshold: f64,
    /// Temporal decay lambda in days.
    pub lambda_days: f64,
    /// Candidates fetched per scoring pass.
    pub candidate_limit: u32,
    /// Decisions fetched per backfill batch.
    pub backfill_batch: u32,
    /// Configured backfill worker count; the local validator caps it at one.
    pub backfill_workers: usize,
}

impl Default for ScorerOptions {
    fn default() -> Self {
        Self {
            significance_threshold: significance::DEFAULT_SIGNIFICANCE_THRESHOLD,
            lambda_days: significance::DEFAULT_DECAY_LAMBDA_DAYS,
            candidate_limit: 50,
            backfill_batch: 100,
            backfill_workers: 2,
        }
    }
}

// ============================================================================
// SECTION: Scorer
// ============================================================================

/// Two-stage conflict scorer.
#[derive(Clone)]
pub struct ConflictScorer {
    /// Decision store.
    decisions: Arc<dyn DecisionStore>,
    /// Conflict store.
    conflicts: Arc<dyn ConflictStore>,
    /// Candidate index.
    index: Arc<dyn VectorIndex>,
    /// Optional relationship classifier.
    validator: Arc<dyn ConflictValidator>,
    /// Scorer configuration.
    options: ScorerOptions,
}

impl ConflictScorer {
    /// Builds the scorer.
    #[must_use]
    pub fn new(
        decisions: Arc<dyn DecisionStore>,
        conflicts: Arc<dyn ConflictStore>,
        index: Arc<dyn VectorIndex>,
        validator: Arc<dyn ConflictValidator>,
        options: ScorerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            decisions,
            conflicts,
            index,
            validator,
            options,
        })
    }

    /// Scores one target decision against its candidates.
    ///
    /// Returns the number of conflict rows written. The target is marked
    /// conflict-scored regardless of how many rows were written, which
    /// bounds the backfill.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a store operation fails; candidate-level
    /// problems are skipped, never fatal.
    pub async fn score_decision(&self, target: &Decision) -> Result<u32, StoreError> {
        let (Some(target_embedding), Some(target_outcome)) =
            (target.embedding.as_ref(), target.outcome_embedding.as_ref())
        else {
            return Ok(0);
        };

        let excluded = self.revision_chain_ids(target).await?;
        let candidates = self.find_candidates(target, target_embedding, &excluded).await?;

        let mut written = 0;
        for candidate in candidates {
            if excluded.contains(&candidate.id) || candidate.id == target.id {
                continue;
            }
            if !candidate.decision_type.matches(&target.decision_type) {
                continue;
            }
            let (Some(candidate_embedding), Some(candidate_outcome)) =
                (candidate.embedding.as_ref(), candidate.outcome_embedding.as_ref())
            else {
                continue;
            };

            let delta_days = (target.valid_from - candidate.valid_from).abs().as_seconds_f64()
                / 86_400.0;
            let Some(breakdown) = significance::score(&significance::SignificanceInputs {
                target_embedding,
                candidate_embedding,
                target_outcome,
                candidate_outcome,
                target_confidence: target.confidence,
                candidate_confidence: candidate.confidence,
                delta_days,
                lambda_days: self.options.lambda_days,
            }) else {
                continue;
            };
            if breakdown.significance < self.options.significance_threshold {
                continue;
            }

            if let Some(id) = self.classify_and_persist(target, &candidate, &breakdown).await? {
                tracing::debug!(conflict = %id, "conflict persisted");
                written += 1;
            }
        }

        self.decisions.mark_conflict_scored(target.id, OffsetDateTime::now_utc()).await?;
        Ok(written)
    }

    /// Collects the target's full revision chain, both directions.
    async fn revision_chain_ids(
        &self,
        target: &Decision,
    ) -> Result<BTreeSet<DecisionId>, StoreError> {
        let chain = self.decisions.revision_chain(target.org_id, target.id).await?;
        Ok(chain.into_iter().map(|decision| decision.id).collect())
    }

    /// Finds candidate decisions, preferring the index over the store.
    async fn find_candidates(
        &self,
        target: &Decision,
        target_embedding: &[f32],
        excluded: &BTreeSet<DecisionId>,
    ) -> Result<Vec<Decision>, StoreError> {
        let exclude: Vec<DecisionId> = excluded.iter().copied().collect();
        if self.index.healthy().await {
            let query = IndexQuery {
                vector: target_embedding.to_vec(),
                using: QueryVector::Decision,
                decision_type: Some(target.decision_type.normalized()),
                exclude: exclude.clone(),
                limit: self.options.candidate_limit,
            };
            match self.index.search(target.org_id, &query).await {
                Ok(hits) => {
                    let mut candidates = Vec::with_capacity(hits.len());
                    for hit in hits {
                        match self.decisions.decision(target.org_id, hit.decision_id).await {
                            Ok(decision) => candidates.push(decision),
                            Err(StoreError::NotFound(_)) => {}
                            Err(err) => return Err(err),
                        }
                    }
                    return Ok(candidates);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "index candidate search failed; using store");
                }
            }
        }
        self.decisions
            .find_similar_decisions(
                target.org_id,
                target_embedding,
                &exclude,
                self.options.candidate_limit,
            )
            .await
    }

    /// Runs the optional classification stage and upserts the conflict row.
    ///
    /// Returns the row identifier when one was written.
    async fn classify_and_persist(
        &self,
        target: &Decision,
        candidate: &Decision,
        breakdown: &significance::SignificanceBreakdown,
    ) -> Result<Option<ConflictId>, StoreError> {
        let Some(pair) = ConflictPair::ordered(target.id, candidate.id) else {
            return Ok(None);
        };
        let kind = ConflictKind::from_agents(&target.agent_id, &candidate.agent_id);

        let (method, relationship, category, severity, explanation) =
            if self.validator.class() == ValidatorClass::Noop {
                (ScoringMethod::Embedding, None, None, None, None)
            } else {
                let input = ValidationInput {
                    outcome_a: target.outcome.clone(),
                    outcome_b: candidate.outcome.clone(),
                    reasoning_a: target.reasoning.clone(),
                    reasoning_b: candidate.reasoning.clone(),
                    agent_a: target.agent_id.clone(),
                    agent_b: candidate.agent_id.clone(),
                    delta_days: (target.valid_from - candidate.valid_from)
                        .abs()
                        .as_seconds_f64()
                        / 86_400.0,
                    project_hint: target.agent_context.project_hint().map(str::to_string),
                    repo_hint: target.agent_context.repo.clone(),
                    same_session: target.session_id.is_some()
                        && target.session_id == candidate.session_id,
                };
                match self.validator.validate(&input).await {
                    Ok(verdict) => {
                        if !verdict.relationship.is_conflicting() {
                            return Ok(None);
                        }
                        (
                            self.validator.class().scoring_method(),
                            Some(verdict.relationship),
                            verdict.category,
                            verdict.severity,
                            verdict.explanation,
                        )
                    }
                    // Unparseable output is a rejection of the pair.
                    Err(ValidatorError::Response(message)) => {
                        tracing::debug!(reason = %message, "validator rejected pair");
                        return Ok(None);
                    }
                    // Transport problems keep the embedding signal.
                    Err(err) => {
                        tracing::warn!(error = %err, "validator unavailable; persisting unvalidated");
                        (ScoringMethod::Embedding, None, None, None, None)
                    }
                }
            };

        let now = OffsetDateTime::now_utc();
        let conflict = ScoredConflict {
            id: ConflictId::generate(),
            org_id: target.org_id,
            pair,
            kind,
            method,
            topic_similarity: breakdown.topic_similarity,
            outcome_divergence: breakdown.outcome_divergence,
            significance: breakdown.significance,
            confidence_weight: Some(breakdown.confidence_weight),
            temporal_decay: Some(breakdown.temporal_decay),
            relationship,
            category,
            severity,
            explanation,
            status: ConflictStatus::Open,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
            resolution_decision_id: None,
            winning_decision_id: None,
            detected_at: now,
            updated_at: now,
        };
        self.conflicts.upsert_scored_conflict(&conflict).await.map(Some)
    }

    /// Scores every decision still missing a conflict pass.
    ///
    /// Safe to re-run: `conflict_scored_at` bounds the walk. The worker
    /// count follows the validator class (a local chat model gets one).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when fetching a backfill batch fails.
    pub async fn backfill(&self) -> Result<u64, StoreError> {
        let workers =
            self.validator.class().max_backfill_workers(self.options.backfill_workers).max(1);
        let mut total: u64 = 0;
        let mut last_first: Option<DecisionId> = None;
        loop {
            let batch = self
                .decisions
                .decisions_pending_conflict_scoring(self.options.backfill_batch)
                .await?;
            if batch.is_empty() {
                break;
            }
            // No forward progress means a persistent failure; the next
            // refresh tick retries instead of hot-looping here.
            let first = batch.first().map(|decision| decision.id);
            if first == last_first {
                tracing::warn!("conflict backfill stalled; deferring to the next tick");
                break;
            }
            last_first = first;
            total += batch.len() as u64;

            let mut join_set = JoinSet::new();
            let mut queue = batch.into_iter();
            loop {
                while join_set.len() < workers {
                    let Some(decision) = queue.next() else {
                        break;
                    };
                    let scorer = self.clone();
                    join_set.spawn(async move {
                        if let Err(err) = scorer.score_decision(&decision).await {
                            tracing::warn!(
                                decision = %decision.id,
                                error = %err,
                                "conflict backfill scoring failed"
                            );
                        }
                    });
                }
                if join_set.join_next().await.is_none() {
                    break;
                }
            }
        }
        if total > 0 {
            tracing::info!(scored = total, "conflict backfill complete");
        }
        Ok(total)
    }

    /// Clears stale conflicts and rescoring marks when the validator class
    /// changed or a rescore is forced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a store operation fails.
    pub async fn maybe_rescore(&self, force: bool) -> Result<bool, StoreError> {
        let class_changed = self.validator.class() != ValidatorClass::Noop
            && self.conflicts.count_unvalidated_conflicts().await? > 0;
        if !force && !class_changed {
            return Ok(false);
        }
        let cleared = self.conflicts.clear_unvalidated_conflicts().await?;
        let reset = self.decisions.reset_conflict_scored().await?;
        tracing::info!(cleared, reset, force, "conflict rescore triggered");
        Ok(true)
    }
}
