// crates/akashi-core/src/lib.rs
// ============================================================================
// Module: Akashi Core Library
// Description: Domain model, hashing, scoring, and backend interfaces.
// Purpose: Define the decision audit trail contract shared by all crates.
// Dependencies: async-trait, serde, serde_json, sha2, subtle, thiserror, time, uuid
// ============================================================================

//! ## Overview
//! Akashi Core holds everything backend-independent in the decision audit
//! trail: the bi-temporal decision model with alternatives, evidence, and
//! claims; the append-only event model; agents, API keys, and access grants;
//! scored conflicts and their resolution state machine; canonical content
//! hashing and Merkle batch roots; significance, completeness, and claim
//! algorithms; the effective read-scope computation; and the async
//! interfaces adapters implement.
//! Invariants:
//! - Content hashes recompute identically from stored rows.
//! - Conflict pairs are ordered bytewise (`a < b`).
//! - Error kinds, not messages, drive caller behavior.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod access;
pub mod core;
pub mod hashing;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::access::ReadScope;
pub use crate::access::effective_read_scope;
pub use crate::access::tags_overlap;
pub use crate::core::agent::AccessGrant;
pub use crate::core::agent::Agent;
pub use crate::core::agent::AgentRole;
pub use crate::core::agent::ApiKey;
pub use crate::core::agent::GrantResource;
pub use crate::core::conflict::ConflictKind;
pub use crate::core::conflict::ConflictPair;
pub use crate::core::conflict::ConflictRelationship;
pub use crate::core::conflict::ConflictStatus;
pub use crate::core::conflict::ConflictTransition;
pub use crate::core::conflict::InvalidTransition;
pub use crate::core::conflict::ScoredConflict;
pub use crate::core::conflict::ScoringMethod;
pub use crate::core::conflict::apply_transition;
pub use crate::core::decision::AgentContext;
pub use crate::core::decision::AgentRun;
pub use crate::core::decision::Alternative;
pub use crate::core::decision::AlternativeDraft;
pub use crate::core::decision::Decision;
pub use crate::core::decision::DecisionClaim;
pub use crate::core::decision::DecisionDraft;
pub use crate::core::decision::Evidence;
pub use crate::core::decision::EvidenceDraft;
pub use crate::core::decision::RunStatus;
pub use crate::core::decision::TraceReceipt;
pub use crate::core::decision::is_valid_source_type;
pub use crate::core::event::AgentEvent;
pub use crate::core::event::BufferedEvent;
pub use crate::core::event::EventKind;
pub use crate::core::event::NewEvent;
pub use crate::core::identifiers::AgentId;
pub use crate::core::identifiers::AlternativeId;
pub use crate::core::identifiers::ApiKeyId;
pub use crate::core::identifiers::ClaimId;
pub use crate::core::identifiers::ConflictId;
pub use crate::core::identifiers::DecisionId;
pub use crate::core::identifiers::DecisionType;
pub use crate::core::identifiers::EvidenceId;
pub use crate::core::identifiers::EventId;
pub use crate::core::identifiers::GrantId;
pub use crate::core::identifiers::OrgId;
pub use crate::core::identifiers::OutboxEntryId;
pub use crate::core::identifiers::ProofId;
pub use crate::core::identifiers::RunId;
pub use crate::core::identifiers::SessionId;
pub use crate::core::integrity::IntegrityProof;
pub use crate::hashing::ContentHash;
pub use crate::hashing::decision_content_hash;
pub use crate::hashing::merkle_root;
pub use crate::interfaces::AgentErasure;
pub use crate::interfaces::AgentStore;
pub use crate::interfaces::ChildrenPresence;
pub use crate::interfaces::ConflictQuery;
pub use crate::interfaces::ConflictResolution;
pub use crate::interfaces::ConflictStore;
pub use crate::interfaces::ConflictValidator;
pub use crate::interfaces::DecisionQuery;
pub use crate::interfaces::DecisionStore;
pub use crate::interfaces::DecisionWrite;
pub use crate::interfaces::EmbeddingError;
pub use crate::interfaces::EmbeddingProvider;
pub use crate::interfaces::EventStore;
pub use crate::interfaces::IdempotencyOutcome;
pub use crate::interfaces::IdempotencyStore;
pub use crate::interfaces::IndexError;
pub use crate::interfaces::IndexHit;
pub use crate::interfaces::IndexPoint;
pub use crate::interfaces::IndexQuery;
pub use crate::interfaces::IntegrityStore;
pub use crate::interfaces::Notification;
pub use crate::interfaces::Notifier;
pub use crate::interfaces::NotifyChannel;
pub use crate::interfaces::OutboxEntry;
pub use crate::interfaces::OutboxOperation;
pub use crate::interfaces::OutboxStore;
pub use crate::interfaces::QueryVector;
pub use crate::interfaces::RunStore;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::TextSearchHit;
pub use crate::interfaces::ValidationInput;
pub use crate::interfaces::ValidationVerdict;
pub use crate::interfaces::ValidatorClass;
pub use crate::interfaces::ValidatorError;
pub use crate::interfaces::VectorIndex;
pub use crate::runtime::claims::split_claims;
pub use crate::runtime::completeness::CompletenessInputs;
pub use crate::runtime::completeness::completeness_score;
pub use crate::runtime::significance::SignificanceBreakdown;
pub use crate::runtime::significance::SignificanceInputs;
pub use crate::runtime::validation::DraftError;
pub use crate::runtime::validation::DraftLimits;
pub use crate::runtime::validation::validate_draft;
