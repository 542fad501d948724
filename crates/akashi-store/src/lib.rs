// crates/akashi-store/src/lib.rs
// ============================================================================
// Module: Akashi Store Library
// Description: PostgreSQL adapter implementing the core persistence interfaces.
// Purpose: Durable, tenant-filtered storage with triggers, COPY, and NOTIFY.
// Dependencies: akashi-core, pgvector, sqlx
// ============================================================================

//! ## Overview
//! Akashi Store is the PostgreSQL realization of every `akashi-core` store
//! interface: atomic trace transactions, bi-temporal queries, bulk `COPY`
//! event ingestion, lease-based outbox claims, append-only audit and proof
//! tables, and constant-time API key verification. Migrations are embedded
//! and checksum-verified; schema drift is fatal at startup.
//! Invariants:
//! - Every org-scoped statement filters by `org_id`.
//! - All statements bind parameters.
//! - Immutability is enforced by database triggers, not application care.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod agents;
pub mod conflicts;
pub mod decisions;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod integrity;
pub mod migrate;
pub mod outbox;
pub mod postgres;
pub mod runs;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::error::map_sqlx_error;
pub use crate::migrate::EXPECTED_TABLES;
pub use crate::migrate::MIGRATIONS;
pub use crate::migrate::run_migrations;
pub use crate::migrate::verify_schema;
pub use crate::postgres::PostgresStore;
