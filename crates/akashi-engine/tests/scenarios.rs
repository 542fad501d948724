// crates/akashi-engine/tests/scenarios.rs
// ============================================================================
// Module: Engine Scenario Tests
// Description: End-to-end behavior over in-memory backends.
// ============================================================================
//! ## Overview
//! Drives the full engine against in-memory backends: atomic traces,
//! revision chains, cross-agent and self contradictions with revision-chain
//! exclusion, idempotent retries, temporal queries, search degradation,
//! hash verification, and outbox delivery.

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
    clippy::float_cmp,
    reason = "Test-only output, panic-based assertions, and exact float checks are permitted."
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use akashi_core::AgentId;
use akashi_core::ConflictKind;
use akashi_core::ConflictRelationship;
use akashi_core::ConflictValidator;
use akashi_core::DecisionDraft;
use akashi_core::DecisionId;
use akashi_core::DecisionQuery;
use akashi_core::DecisionType;
use akashi_core::NotifyChannel;
use akashi_core::OrgId;
use akashi_core::OutboxOperation;
use akashi_core::ReadScope;
use akashi_core::StoreError;
use akashi_core::TraceReceipt;
use akashi_core::ValidatorClass;
use akashi_core::core::decision::AgentContext;
use akashi_core::core::decision::AlternativeDraft;
use akashi_core::core::decision::EvidenceDraft;
use akashi_engine::ConflictScorer;
use akashi_engine::DecisionService;
use akashi_engine::OutboxWorker;
use akashi_engine::OutboxWorkerOptions;
use akashi_engine::ScorerOptions;
use akashi_engine::SearchBackend;
use akashi_engine::ReviseRequest;
use akashi_engine::ServiceOptions;
use akashi_engine::TraceRequest;
use akashi_ingest::BufferOptions;
use akashi_ingest::EventBuffer;
use serde_json::Value;

use common::MemoryIndex;
use common::MemoryStore;
use common::StubEmbeddings;
use common::StubValidator;

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Assembled engine over in-memory backends.
struct Harness {
    /// Shared store.
    store: Arc<MemoryStore>,
    /// Shared index.
    index: Arc<MemoryIndex>,
    /// Scripted embeddings.
    embeddings: Arc<StubEmbeddings>,
    /// The service under test.
    service: Arc<DecisionService>,
    /// The scorer under test.
    scorer: Arc<ConflictScorer>,
    /// The outbox worker under test.
    worker: Arc<OutboxWorker>,
    /// Event buffer feeding the store.
    buffer: Arc<EventBuffer>,
    /// Test organization.
    org: OrgId,
}

/// Builds the engine with the provided validator.
fn harness(validator: Arc<dyn ConflictValidator>) -> Harness {
    let store = MemoryStore::new();
    let index = MemoryIndex::new();
    let embeddings = StubEmbeddings::new();
    let buffer = Arc::new(EventBuffer::start(
        BufferOptions {
            capacity: 1_024,
            flush_max_events: 8,
            flush_interval: Duration::from_millis(20),
            flush_retry_attempts: 3,
            retry_backoff: Duration::from_millis(5),
        },
        None,
        Arc::clone(&store) as _,
    ));
    let scorer = ConflictScorer::new(
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&index) as _,
        validator,
        ScorerOptions::default(),
    );
    let worker = OutboxWorker::new(
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&index) as _,
        OutboxWorkerOptions::default(),
    );
    let service = DecisionService::new(
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&embeddings) as _,
        Arc::clone(&index) as _,
        Arc::clone(&scorer),
        Arc::clone(&buffer),
        ServiceOptions::default(),
    );
    Harness {
        store,
        index,
        embeddings,
        service,
        scorer,
        worker,
        buffer,
        org: OrgId::generate(),
    }
}

/// Builds a caching draft with the provided outcome.
fn caching_draft(outcome: &str, confidence: f64) -> DecisionDraft {
    DecisionDraft {
        decision_type: DecisionType::new("caching"),
        outcome: outcome.to_string(),
        confidence,
        reasoning: "observed latency profile".to_string(),
        alternatives: Vec::new(),
        evidence: Vec::new(),
        agent_context: AgentContext::default(),
        session_id: None,
        metadata: Value::Null,
    }
}

/// Traces a draft for the given agent.
async fn trace(
    harness: &Harness,
    agent: &str,
    draft: DecisionDraft,
) -> Result<TraceReceipt, StoreError> {
    harness
        .service
        .trace(TraceRequest {
            org_id: harness.org,
            agent_id: AgentId::new(agent),
            api_key_id: None,
            decision: draft,
            precedent_ref: None,
            idempotency_key: None,
        })
        .await
}

/// Enriches one stored decision deterministically and indexes it.
async fn enrich_and_index(harness: &Harness, id: DecisionId) {
    let decision = harness.store.decision(harness.org, id).await.expect("decision");
    harness.service.enrich_decision(decision).await.expect("enrich");
    let enriched = harness.store.decision(harness.org, id).await.expect("decision");
    harness.index.insert_decision(&enriched);
}

/// Installs the standard caching topic rules on the stub embeddings.
fn install_caching_rules(harness: &Harness) {
    harness.embeddings.rule("caching\n", vec![1.0, 0.0]);
    harness.embeddings.rule("Use Redis", vec![1.0, 0.0]);
    harness.embeddings.rule("Use Memcached", vec![-1.0, 0.0]);
}

// Re-import the decision store trait so harness tests can read directly.
use akashi_core::DecisionStore;

// ============================================================================
// SECTION: Atomic Trace
// ============================================================================

#[tokio::test]
async fn atomic_trace_writes_children_outbox_and_notify() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let mut draft = caching_draft("Use Redis for the request cache", 0.85);
    draft.alternatives = vec![
        AlternativeDraft {
            label: "Redis".to_string(),
            score: Some(0.9),
            selected: true,
            rejection_reason: None,
        },
        AlternativeDraft {
            label: "Memcached".to_string(),
            score: Some(0.4),
            selected: false,
            rejection_reason: Some("no persistence".to_string()),
        },
    ];
    draft.evidence = vec![EvidenceDraft {
        source_type: "benchmark".to_string(),
        uri: Some("bench://latency".to_string()),
        content: Some("p99 table".to_string()),
        relevance: Some(0.8),
    }];

    let receipt = trace(&harness, "alpha", draft).await.expect("trace");
    assert_eq!(receipt.event_count, 1);

    let decision =
        harness.store.decision(harness.org, receipt.decision_id).await.expect("decision");
    assert_eq!(decision.run_id, receipt.run_id);
    assert!(decision.is_current());

    let alternatives = harness.store.alternatives.lock().expect("lock").clone();
    assert_eq!(alternatives.len(), 2);
    assert_eq!(alternatives.iter().filter(|alternative| alternative.selected).count(), 1);

    let evidence = harness.store.evidence.lock().expect("lock").clone();
    assert_eq!(evidence.len(), 1);
    assert_eq!(evidence[0].org_id, harness.org);

    let outbox = harness.store.outbox.lock().expect("lock").clone();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].operation, OutboxOperation::Upsert);
    assert_eq!(outbox[0].decision_id, receipt.decision_id);

    assert_eq!(harness.store.notifications_on(NotifyChannel::Decisions).len(), 1);

    // The decision event reaches the store through the buffer.
    harness.buffer.drain(Duration::from_secs(5)).await.expect("drain");
    let events = harness.store.events.lock().expect("lock").clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].run_id, receipt.run_id);
}

// ============================================================================
// SECTION: Revision Chains
// ============================================================================

#[tokio::test]
async fn revision_closes_predecessor_and_links_successor() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let first = trace(&harness, "alpha", caching_draft("monolith", 0.7)).await.expect("trace");
    let second = harness
        .service
        .revise(ReviseRequest {
            org_id: harness.org,
            agent_id: AgentId::new("alpha"),
            api_key_id: None,
            predecessor: first.decision_id,
            decision: caching_draft("microservices", 0.8),
        })
        .await
        .expect("revise");

    let d1 = harness.store.decision(harness.org, first.decision_id).await.expect("d1");
    let d2 = harness.store.decision(harness.org, second.decision_id).await.expect("d2");
    assert_eq!(d1.valid_to, Some(d2.valid_from));
    assert_eq!(d2.supersedes_id, Some(d1.id));
    assert!(d2.is_current());

    let chain =
        harness.service.revisions(harness.org, first.decision_id).await.expect("revisions");
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].id, d1.id);
    assert_eq!(chain[1].id, d2.id);
    assert_eq!(chain.iter().filter(|decision| decision.is_current()).count(), 1);

    // Revising an already superseded decision fails closed.
    let again = harness
        .service
        .revise(ReviseRequest {
            org_id: harness.org,
            agent_id: AgentId::new("alpha"),
            api_key_id: None,
            predecessor: first.decision_id,
            decision: caching_draft("modular monolith", 0.6),
        })
        .await;
    assert!(matches!(again, Err(StoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Conflict Detection
// ============================================================================

#[tokio::test]
async fn cross_agent_contradiction_is_detected_once() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::ExternalChat,
        relationship: ConflictRelationship::Contradiction,
    }));
    install_caching_rules(&harness);

    let a = trace(&harness, "alpha", caching_draft("Use Redis", 0.9)).await.expect("trace");
    let b = trace(&harness, "beta", caching_draft("Use Memcached", 0.8)).await.expect("trace");
    enrich_and_index(&harness, a.decision_id).await;
    enrich_and_index(&harness, b.decision_id).await;

    let target = harness.store.decision(harness.org, b.decision_id).await.expect("decision");
    let written = harness.scorer.score_decision(&target).await.expect("score");
    assert!(written >= 1);

    let conflicts: Vec<_> = harness
        .store
        .all_conflicts()
        .into_iter()
        .filter(|conflict| {
            let pair = [conflict.pair.a, conflict.pair.b];
            pair.contains(&a.decision_id) && pair.contains(&b.decision_id)
        })
        .collect();
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::CrossAgent);
    assert_eq!(conflict.relationship, Some(ConflictRelationship::Contradiction));
    assert!(conflict.significance >= ScorerOptions::default().significance_threshold);
    assert!(conflict.pair.a < conflict.pair.b);

    // Rescoring converges onto the same row.
    let rescored = harness.scorer.score_decision(&target).await.expect("rescore");
    assert!(rescored >= 1);
    assert_eq!(
        harness
            .store
            .all_conflicts()
            .into_iter()
            .filter(|conflict| {
                let pair = [conflict.pair.a, conflict.pair.b];
                pair.contains(&a.decision_id) && pair.contains(&b.decision_id)
            })
            .count(),
        1
    );
}

#[tokio::test]
async fn revision_chains_are_excluded_but_new_traces_are_not() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::ExternalChat,
        relationship: ConflictRelationship::Contradiction,
    }));
    install_caching_rules(&harness);

    // X revised into Y: same chain, never a conflict.
    let x = trace(&harness, "alpha", caching_draft("Use Redis", 0.9)).await.expect("trace");
    let y = harness
        .service
        .revise(ReviseRequest {
            org_id: harness.org,
            agent_id: AgentId::new("alpha"),
            api_key_id: None,
            predecessor: x.decision_id,
            decision: caching_draft("Use Memcached", 0.9),
        })
        .await
        .expect("revise");
    enrich_and_index(&harness, x.decision_id).await;
    enrich_and_index(&harness, y.decision_id).await;

    let y_row = harness.store.decision(harness.org, y.decision_id).await.expect("decision");
    harness.scorer.score_decision(&y_row).await.expect("score");
    let chain_pairs = harness
        .store
        .all_conflicts()
        .into_iter()
        .filter(|conflict| {
            let pair = [conflict.pair.a, conflict.pair.b];
            pair.contains(&x.decision_id) && pair.contains(&y.decision_id)
        })
        .count();
    assert_eq!(chain_pairs, 0);

    // Z is a fresh trace, not a revision: same agent, incompatible outcome.
    let z = trace(&harness, "alpha", caching_draft("Use Redis", 0.9)).await.expect("trace");
    enrich_and_index(&harness, z.decision_id).await;
    let z_row = harness.store.decision(harness.org, z.decision_id).await.expect("decision");
    let written = harness.scorer.score_decision(&z_row).await.expect("score");
    assert!(written >= 1);

    let self_conflicts: Vec<_> = harness
        .store
        .all_conflicts()
        .into_iter()
        .filter(|conflict| {
            let pair = [conflict.pair.a, conflict.pair.b];
            pair.contains(&z.decision_id)
        })
        .collect();
    assert!(!self_conflicts.is_empty());
    assert!(
        self_conflicts
            .iter()
            .all(|conflict| conflict.kind == ConflictKind::SelfContradiction)
    );
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

#[tokio::test]
async fn idempotent_retry_replays_the_original_receipt() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let request = TraceRequest {
        org_id: harness.org,
        agent_id: AgentId::new("alpha"),
        api_key_id: None,
        decision: caching_draft("Use Redis", 0.8),
        precedent_ref: None,
        idempotency_key: Some("retry-1".to_string()),
    };
    let first = harness.service.trace(request.clone()).await.expect("trace");
    let second = harness.service.trace(request.clone()).await.expect("replay");
    assert_eq!(first, second);
    assert_eq!(harness.store.decisions.lock().expect("lock").len(), 1);

    // Same key with a different payload is a conflict.
    let mut altered = request;
    altered.decision.outcome = "Use Memcached".to_string();
    let third = harness.service.trace(altered).await;
    assert!(matches!(third, Err(StoreError::Conflict(_))));
}

// ============================================================================
// SECTION: Temporal Queries
// ============================================================================

#[tokio::test]
async fn temporal_query_sees_exactly_one_revision() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let first = trace(&harness, "alpha", caching_draft("monolith", 0.7)).await.expect("trace");
    tokio::time::sleep(Duration::from_millis(5)).await;
    let between = time::OffsetDateTime::now_utc();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = harness
        .service
        .revise(ReviseRequest {
            org_id: harness.org,
            agent_id: AgentId::new("alpha"),
            api_key_id: None,
            predecessor: first.decision_id,
            decision: caching_draft("microservices", 0.8),
        })
        .await
        .expect("revise");
    let after = time::OffsetDateTime::now_utc();

    let at_between = harness
        .service
        .temporal_query(harness.org, &ReadScope::All, between, DecisionQuery::default())
        .await
        .expect("temporal");
    assert_eq!(at_between.len(), 1);
    assert_eq!(at_between[0].id, first.decision_id);

    let at_after = harness
        .service
        .temporal_query(harness.org, &ReadScope::All, after, DecisionQuery::default())
        .await
        .expect("temporal");
    assert_eq!(at_after.len(), 1);
    assert_eq!(at_after[0].id, second.decision_id);
}

// ============================================================================
// SECTION: Search Degradation and Outbox
// ============================================================================

#[tokio::test]
async fn search_degrades_to_text_when_index_is_down() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let receipt = trace(&harness, "alpha", caching_draft("Use Redis", 0.8)).await.expect("trace");
    enrich_and_index(&harness, receipt.decision_id).await;

    harness.index.set_healthy(false);
    let outcome = harness
        .service
        .search(harness.org, &ReadScope::All, "redis", None, 10)
        .await
        .expect("search");
    assert_eq!(outcome.backend, SearchBackend::Text);
    assert_eq!(outcome.hits.len(), 1);
    assert_eq!(outcome.hits[0].decision.id, receipt.decision_id);

    // Writes still land while the index is down; the outbox retains rows.
    let other = trace(&harness, "alpha", caching_draft("Use Memcached", 0.6)).await.expect("trace");
    assert!(
        harness
            .store
            .outbox
            .lock()
            .expect("lock")
            .iter()
            .any(|entry| entry.decision_id == other.decision_id)
    );
}

#[tokio::test]
async fn outbox_worker_delivers_enriched_decisions() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let receipt = trace(&harness, "alpha", caching_draft("Use Redis", 0.8)).await.expect("trace");

    // Not enriched yet: the row fails softly and stays queued.
    let delivered = harness.worker.run_once().await.expect("pass");
    assert_eq!(delivered, 0);
    assert_eq!(harness.store.outbox.lock().expect("lock").len(), 1);

    // After enrichment the retry succeeds once the lease lapses; clear the
    // lease directly to avoid waiting.
    let decision = harness.store.decision(harness.org, receipt.decision_id).await.expect("row");
    harness.service.enrich_decision(decision).await.expect("enrich");
    {
        let mut outbox = harness.store.outbox.lock().expect("lock");
        for entry in outbox.iter_mut() {
            entry.locked_until = None;
        }
    }
    let delivered = harness.worker.run_once().await.expect("pass");
    assert_eq!(delivered, 1);
    assert!(harness.store.outbox.lock().expect("lock").is_empty());
    assert!(
        harness
            .index
            .points
            .lock()
            .expect("lock")
            .contains_key(&receipt.decision_id)
    );
}

// ============================================================================
// SECTION: Enrichment Backfill
// ============================================================================

#[tokio::test]
async fn backfill_scores_completeness_like_the_write_path() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let mut draft = caching_draft("Use Redis for the request cache", 0.85);
    draft.alternatives.push(AlternativeDraft {
        label: "Memcached".to_string(),
        score: Some(0.4),
        selected: false,
        rejection_reason: Some("no persistence".to_string()),
    });
    draft.evidence.push(EvidenceDraft {
        source_type: "benchmark".to_string(),
        uri: None,
        content: Some("p99 table".to_string()),
        relevance: Some(0.8),
    });
    let receipt = trace(&harness, "alpha", draft).await.expect("trace");

    enrich_and_index(&harness, receipt.decision_id).await;
    let inline = harness
        .store
        .decision(harness.org, receipt.decision_id)
        .await
        .expect("decision")
        .completeness_score
        .expect("inline score");
    // Child presence earned its credit on the write path.
    assert!(inline >= 0.85);

    // Simulate a missed inline enrichment: the refresh tick finds the row
    // with no embeddings and no score.
    harness.store.tamper_decision(receipt.decision_id, |decision| {
        decision.embedding = None;
        decision.outcome_embedding = None;
        decision.completeness_score = None;
    });
    harness.service.backfill_embeddings(10).await.expect("backfill");

    let backfilled = harness
        .store
        .decision(harness.org, receipt.decision_id)
        .await
        .expect("decision");
    assert!(backfilled.has_embeddings());
    assert_eq!(backfilled.completeness_score.expect("backfilled score"), inline);
}

// ============================================================================
// SECTION: Typed Precedent Check
// ============================================================================

#[tokio::test]
async fn check_finds_typed_precedent_past_the_untyped_limit() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));

    // Three decisions of another type compete for the same query vector.
    for n in 0..3 {
        let mut draft = caching_draft("Adopt the cache-aside pattern", 0.8);
        draft.decision_type = DecisionType::new("naming");
        draft.outcome = format!("Adopt the cache-aside pattern variant {n}");
        let receipt = trace(&harness, "alpha", draft).await.expect("trace");
        enrich_and_index(&harness, receipt.decision_id).await;
    }
    let precedent =
        trace(&harness, "alpha", caching_draft("Use Redis for the request cache", 0.8))
            .await
            .expect("trace");
    enrich_and_index(&harness, precedent.decision_id).await;

    // A limit smaller than the competing pool still surfaces the typed
    // precedent because the type constrains the search server-side.
    let report = harness
        .service
        .check(
            harness.org,
            &ReadScope::All,
            &DecisionType::new("caching"),
            Some("cache"),
            2,
        )
        .await
        .expect("check");
    assert!(report.has_precedent);
    assert!(report.decisions.iter().any(|decision| decision.id == precedent.decision_id));
    assert!(
        report
            .decisions
            .iter()
            .all(|decision| decision.decision_type.matches(&DecisionType::new("caching")))
    );
}

// ============================================================================
// SECTION: Verification
// ============================================================================

#[tokio::test]
async fn verify_detects_tampering() {
    let harness = harness(Arc::new(StubValidator {
        class: ValidatorClass::Noop,
        relationship: ConflictRelationship::Contradiction,
    }));
    let receipt = trace(&harness, "alpha", caching_draft("Use Redis", 0.8)).await.expect("trace");

    let clean = harness.service.verify(harness.org, receipt.decision_id).await.expect("verify");
    assert!(clean.valid);
    assert_eq!(clean.stored_hash, clean.computed_hash);

    harness.store.tamper_decision(receipt.decision_id, |decision| {
        decision.outcome = "Use Memcached".to_string();
    });
    let tampered =
        harness.service.verify(harness.org, receipt.decision_id).await.expect("verify");
    assert!(!tampered.valid);
    assert_ne!(tampered.stored_hash, tampered.computed_hash);
}
