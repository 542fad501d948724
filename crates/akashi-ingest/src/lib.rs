// crates/akashi-ingest/src/lib.rs
// ============================================================================
// Module: Akashi Ingest Library
// Description: Crash-safe event ingestion: WAL plus bounded buffer.
// Purpose: Absorb event bursts durably and commit them in ordered batches.
// Dependencies: akashi-core, rand, serde, serde_json, thiserror, time, tokio
// ============================================================================

//! ## Overview
//! Event ingestion is two cooperating pieces: the segmented write-ahead log
//! makes admitted events crash-safe before buffering, and the bounded
//! buffer batches them into ordered bulk flushes with server-assigned
//! sequence numbers. Restart replays surviving WAL segments and re-enqueues
//! records the store does not yet hold, giving at-least-once durability
//! across crashes.
//! Invariants:
//! - Events reach the store in submission order within a flush stream.
//! - WAL segments are removed only after a confirmed flush covers them.
//! - Producers block (never drop) when the queue is full.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod buffer;
pub mod wal;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::buffer::BufferError;
pub use crate::buffer::BufferOptions;
pub use crate::buffer::EventBuffer;
pub use crate::wal::EventWal;
pub use crate::wal::WalError;
pub use crate::wal::WalOptions;
pub use crate::wal::WalSync;
