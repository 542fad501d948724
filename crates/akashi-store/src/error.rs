// crates/akashi-store/src/error.rs
// ============================================================================
// Module: Store Error Mapping
// Description: Maps driver errors onto the core error taxonomy.
// Purpose: Let callers distinguish errors by kind, never by driver detail.
// Dependencies: akashi-core, sqlx
// ============================================================================

//! ## Overview
//! Driver errors collapse into the core [`StoreError`] taxonomy:
//! unique violations become `Conflict`, check and foreign-key violations
//! become `Invalid`, missing rows become `NotFound`, and transport or pool
//! failures become `Transient`. Raised immutability-trigger exceptions
//! surface as `Forbidden` so audit-table mutation attempts are
//! distinguishable from malformed input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::StoreError;

// ============================================================================
// SECTION: SQLSTATE Classes
// ============================================================================

/// Unique constraint violation.
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
/// Foreign key violation.
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";
/// Check constraint violation.
const SQLSTATE_CHECK_VIOLATION: &str = "23514";
/// Not-null violation.
const SQLSTATE_NOT_NULL_VIOLATION: &str = "23502";
/// `RAISE EXCEPTION` from a guard trigger.
const SQLSTATE_RAISED_EXCEPTION: &str = "P0001";

// ============================================================================
// SECTION: Mapping
// ============================================================================

/// Maps a driver error onto the core taxonomy.
#[must_use]
pub fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Transient(error.to_string())
        }
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(SQLSTATE_UNIQUE_VIOLATION) => StoreError::Conflict(db.message().to_string()),
            Some(
                SQLSTATE_FOREIGN_KEY_VIOLATION
                | SQLSTATE_CHECK_VIOLATION
                | SQLSTATE_NOT_NULL_VIOLATION,
            ) => StoreError::Invalid(db.message().to_string()),
            Some(SQLSTATE_RAISED_EXCEPTION) => StoreError::Forbidden(db.message().to_string()),
            _ => StoreError::Transient(db.message().to_string()),
        },
        _ => StoreError::Transient(error.to_string()),
    }
}

/// Maps a decode or conversion failure onto the fatal kind.
#[must_use]
pub fn map_decode_error(context: &str, error: impl std::fmt::Display) -> StoreError {
    StoreError::Fatal(format!("{context}: {error}"))
}
