// crates/akashi-broker/src/lib.rs
// ============================================================================
// Module: Akashi Broker Library
// Description: Real-time notification distribution to in-process subscribers.
// Purpose: Fan out LISTEN/NOTIFY payloads scoped by organization.
// Dependencies: akashi-core, serde_json, sqlx, tokio
// ============================================================================

//! ## Overview
//! The broker bridges PostgreSQL notifications to in-process subscribers:
//! one listener task owns the dedicated non-pooled connection, parses each
//! payload, and fans it out through an org-scoped registry of bounded
//! channels. A full subscriber channel disconnects that subscriber; a lost
//! LISTEN connection surfaces as a resubscription event marking a stream
//! gap.
//! Invariants:
//! - Delivery never blocks the listener.
//! - Subscribers only see events for their own organization.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod broker;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::broker::Broker;
pub use crate::broker::BrokerError;
pub use crate::broker::BrokerOptions;
pub use crate::registry::BrokerEvent;
pub use crate::registry::SubscriberRegistry;
pub use crate::registry::Subscription;
pub use crate::registry::SubscriptionFilter;
