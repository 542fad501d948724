// crates/akashi-broker/src/registry.rs
// ============================================================================
// Module: Subscriber Registry
// Description: Org-scoped fan-out with bounded per-subscriber channels.
// Purpose: Deliver parsed notifications without head-of-line blocking.
// Dependencies: akashi-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Subscribers register with an organization scope and an optional channel
//! filter, receiving events through a bounded channel. Delivery never
//! waits: a full channel disconnects its subscriber, so one slow consumer
//! cannot stall the rest. Payloads missing an `org_id` are dropped at this
//! boundary. The registry is pure fan-out state; the LISTEN loop lives in
//! the broker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use akashi_core::Notification;
use akashi_core::NotifyChannel;
use akashi_core::OrgId;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: Events and Filters
// ============================================================================

/// Event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// A parsed notification scoped to the subscriber's organization.
    Notification(Notification),
    /// The LISTEN connection was re-established; the stream has a gap and
    /// callers needing completeness must re-read from the store.
    Resubscribed,
}

/// Optional channel filter applied at registration.
///
/// # Invariants
/// - `channels = None` receives every channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionFilter {
    /// Channels the subscriber wants; `None` means all.
    pub channels: Option<BTreeSet<NotifyChannel>>,
}

impl SubscriptionFilter {
    /// Returns true when the filter admits the channel.
    #[must_use]
    pub fn admits(&self, channel: NotifyChannel) -> bool {
        self.channels.as_ref().is_none_or(|channels| channels.contains(&channel))
    }
}

/// Receiving half handed to a subscriber.
pub struct Subscription {
    /// Subscriber identifier within the registry.
    id: u64,
    /// Bounded event stream.
    rx: mpsc::Receiver<BrokerEvent>,
}

impl Subscription {
    /// Returns the subscriber identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Receives the next event; `None` means the broker disconnected this
    /// subscriber (slow consumption or shutdown).
    pub async fn recv(&mut self) -> Option<BrokerEvent> {
        self.rx.recv().await
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// One registered subscriber.
struct Slot {
    /// Organization scope.
    org_id: OrgId,
    /// Channel filter.
    filter: SubscriptionFilter,
    /// Bounded sender; a full channel disconnects the subscriber.
    tx: mpsc::Sender<BrokerEvent>,
}

/// Org-scoped subscriber registry.
///
/// # Invariants
/// - Delivery is non-blocking; slow subscribers are removed, never awaited.
pub struct SubscriberRegistry {
    /// Registered subscribers keyed by identifier.
    slots: RwLock<HashMap<u64, Slot>>,
    /// Next subscriber identifier.
    next_id: AtomicU64,
    /// Per-subscriber channel capacity.
    capacity: usize,
}

impl SubscriberRegistry {
    /// Builds a registry with the given per-subscriber capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        })
    }

    /// Registers a subscriber scoped to `org_id`.
    pub async fn subscribe(&self, org_id: OrgId, filter: SubscriptionFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.write().await.insert(id, Slot {
            org_id,
            filter,
            tx,
        });
        Subscription {
            id,
            rx,
        }
    }

    /// Removes a subscriber.
    pub async fn unsubscribe(&self, id: u64) {
        self.slots.write().await.remove(&id);
    }

    /// Returns the number of registered subscribers.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Returns true when no subscribers are registered.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Parses a raw payload and fans it out to matching subscribers.
    ///
    /// Returns the number of subscribers the event was delivered to.
    /// Payloads that are not JSON objects carrying an `org_id` are dropped.
    pub async fn dispatch(&self, channel: NotifyChannel, raw_payload: &str) -> usize {
        let Ok(payload) = serde_json::from_str::<Value>(raw_payload) else {
            tracing::warn!(channel = channel.as_str(), "notification payload is not JSON");
            return 0;
        };
        let Some(org_id) = payload
            .get("org_id")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<uuid::Uuid>().ok())
            .map(OrgId::from_uuid)
        else {
            tracing::warn!(channel = channel.as_str(), "notification payload lacks org_id");
            return 0;
        };
        let event = BrokerEvent::Notification(Notification {
            channel,
            org_id,
            payload,
        });

        let mut delivered = 0;
        let mut disconnect = Vec::new();
        {
            let slots = self.slots.read().await;
            for (id, slot) in slots.iter() {
                if slot.org_id != org_id || !slot.filter.admits(channel) {
                    continue;
                }
                match slot.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => disconnect.push(*id),
                    Err(mpsc::error::TrySendError::Closed(_)) => disconnect.push(*id),
                }
            }
        }
        if !disconnect.is_empty() {
            let mut slots = self.slots.write().await;
            for id in disconnect {
                slots.remove(&id);
                tracing::warn!(subscriber = id, "disconnected slow subscriber");
            }
        }
        delivered
    }

    /// Broadcasts a resubscription gap marker to every subscriber.
    pub async fn broadcast_resubscribed(&self) {
        let mut disconnect = Vec::new();
        {
            let slots = self.slots.read().await;
            for (id, slot) in slots.iter() {
                if slot.tx.try_send(BrokerEvent::Resubscribed).is_err() {
                    disconnect.push(*id);
                }
            }
        }
        if !disconnect.is_empty() {
            let mut slots = self.slots.write().await;
            for id in disconnect {
                slots.remove(&id);
            }
        }
    }

    /// Disconnects every subscriber; used at shutdown.
    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }
}
