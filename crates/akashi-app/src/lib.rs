// crates/akashi-app/src/lib.rs
// ============================================================================
// Module: Akashi Application Lifecycle
// Description: Component wiring, background loops, and three-phase shutdown.
// Purpose: Assemble the audit trail process and tear it down cleanly.
// Dependencies: every akashi crate, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! The application owns every process-wide singleton: the pooled store,
//! the broker's direct LISTEN connection, the vector index adapter, the
//! event buffer, and the background loops. Startup is strictly ordered:
//! configuration, telemetry, pool, migrations with schema verification,
//! providers, admin seed, one-shot key migration, WAL replay, then loops.
//! Shutdown runs three bounded phases: stop intake, drain the event buffer
//! (a missed deadline is a hard error carried to the exit code), and a
//! best-effort outbox drain, followed by teardown of caches, adapters, and
//! the pool.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod app;
pub mod error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::app::App;
pub use crate::app::init_telemetry;
pub use crate::error::AppError;
