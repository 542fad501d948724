// crates/akashi-broker/src/broker.rs
// ============================================================================
// Module: Notification Broker
// Description: LISTEN loop on a dedicated connection with registry fan-out.
// Purpose: Bridge database notifications to in-process subscribers.
// Dependencies: akashi-core, sqlx, tokio, crate::registry
// ============================================================================

//! ## Overview
//! The broker owns the one non-pooled database connection in the process:
//! session-scoped LISTEN does not survive transaction pooling, so the
//! listener dials the direct URL. Received payloads fan out through the
//! subscriber registry. The driver re-establishes a lost connection and
//! re-issues LISTEN on the next receive; the broker surfaces that as a
//! resubscription event so subscribers know their stream has a gap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use akashi_core::NotifyChannel;
use akashi_core::OrgId;
use sqlx::postgres::PgListener;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::registry::SubscriberRegistry;
use crate::registry::Subscription;
use crate::registry::SubscriptionFilter;

// ============================================================================
// SECTION: Options and Errors
// ============================================================================

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    /// Direct (non-pooled) database URL for the LISTEN connection.
    pub direct_url: String,
    /// Per-subscriber channel capacity.
    pub subscriber_capacity: usize,
    /// Backoff between reconnect attempts after a receive error.
    pub reconnect_backoff: Duration,
}

impl BrokerOptions {
    /// Returns options for the given direct URL with default capacities.
    #[must_use]
    pub fn new(direct_url: impl Into<String>) -> Self {
        Self {
            direct_url: direct_url.into(),
            subscriber_capacity: 64,
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

/// Broker errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The LISTEN connection could not be established.
    #[error("broker connect failed: {0}")]
    Connect(String),
}

// ============================================================================
// SECTION: Broker
// ============================================================================

/// LISTEN/NOTIFY fan-out broker.
///
/// # Invariants
/// - Exactly one listener task owns the direct connection.
pub struct Broker {
    /// Subscriber registry shared with the listener task.
    registry: Arc<SubscriberRegistry>,
    /// Listener task handle.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
    /// Connects the LISTEN connection, subscribes to every channel, and
    /// starts the listener task.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] when the initial dial or LISTEN
    /// fails; later losses are retried inside the task.
    pub async fn start(options: BrokerOptions) -> Result<Self, BrokerError> {
        let mut listener = PgListener::connect(&options.direct_url)
            .await
            .map_err(|err| BrokerError::Connect(err.to_string()))?;
        let channels: Vec<&str> =
            NotifyChannel::ALL.iter().map(|channel| channel.as_str()).collect();
        listener
            .listen_all(channels)
            .await
            .map_err(|err| BrokerError::Connect(err.to_string()))?;

        let registry = SubscriberRegistry::new(options.subscriber_capacity);
        let task_registry = Arc::clone(&registry);
        let backoff = options.reconnect_backoff;
        let task = tokio::spawn(async move {
            listen_loop(listener, task_registry, backoff).await;
        });
        tracing::info!("broker listening");
        Ok(Self {
            registry,
            task: Mutex::new(Some(task)),
        })
    }

    /// Registers a subscriber scoped to `org_id` with an optional filter.
    pub async fn subscribe(&self, org_id: OrgId, filter: SubscriptionFilter) -> Subscription {
        self.registry.subscribe(org_id, filter).await
    }

    /// Removes a subscriber.
    pub async fn unsubscribe(&self, id: u64) {
        self.registry.unsubscribe(id).await;
    }

    /// Returns the shared registry; used by tests and diagnostics.
    #[must_use]
    pub fn registry(&self) -> Arc<SubscriberRegistry> {
        Arc::clone(&self.registry)
    }

    /// Stops the listener task and disconnects every subscriber.
    pub async fn shutdown(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        self.registry.clear().await;
    }
}

/// Receive loop draining notifications into the registry.
async fn listen_loop(
    mut listener: PgListener,
    registry: Arc<SubscriberRegistry>,
    backoff: Duration,
) {
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                let Some(channel) = NotifyChannel::parse(notification.channel()) else {
                    tracing::warn!(channel = notification.channel(), "unknown notify channel");
                    continue;
                };
                let delivered = registry.dispatch(channel, notification.payload()).await;
                tracing::debug!(
                    channel = channel.as_str(),
                    delivered,
                    "notification dispatched"
                );
            }
            // The driver reconnected and re-issued LISTEN; the stream has
            // a gap.
            Ok(None) => {
                tracing::warn!("listen connection re-established; notifying subscribers");
                registry.broadcast_resubscribed().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "listen receive failed; backing off");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
