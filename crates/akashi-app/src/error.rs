// crates/akashi-app/src/error.rs
// ============================================================================
// Module: Application Errors
// Description: Startup and shutdown failures with distinct exit codes.
// Purpose: Map lifecycle failures onto the process exit contract.
// Dependencies: akashi-broker, akashi-config, akashi-core
// ============================================================================

//! ## Overview
//! Lifecycle failures carry distinct exit codes so operators and
//! supervisors can tell a migration failure from a drain timeout without
//! parsing logs. Every variant is non-zero; success is the absence of an
//! error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_broker::BrokerError;
use akashi_config::ConfigError;
use akashi_core::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Application lifecycle errors.
///
/// # Invariants
/// - Exit codes are stable; supervisors key restart policy on them.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Database pool could not be initialized.
    #[error("database init failed: {0}")]
    DatabaseInit(StoreError),
    /// Migrations failed to apply or verify.
    #[error("migration failed: {0}")]
    Migration(StoreError),
    /// Expected schema objects are missing after migration.
    #[error("schema verification failed: {0}")]
    SchemaVerification(StoreError),
    /// A provider or index adapter could not be constructed.
    #[error("provider init failed: {0}")]
    Provider(String),
    /// The broker's LISTEN connection could not be established.
    #[error("broker init failed: {0}")]
    Broker(#[from] BrokerError),
    /// The event WAL could not be opened or replayed.
    #[error("wal init failed: {0}")]
    Wal(String),
    /// The buffer drain missed its deadline with events unflushed.
    #[error("buffer drain timed out with {unflushed} events unflushed")]
    BufferDrainTimeout {
        /// Events still queued when the deadline lapsed.
        unflushed: usize,
    },
}

impl AppError {
    /// Returns the stable process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::DatabaseInit(_) => 10,
            Self::Migration(_) => 11,
            Self::SchemaVerification(_) => 12,
            Self::Provider(_) => 13,
            Self::Broker(_) => 14,
            Self::Wal(_) => 15,
            Self::BufferDrainTimeout { .. } => 20,
        }
    }
}
