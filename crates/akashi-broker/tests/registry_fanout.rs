// crates/akashi-broker/tests/registry_fanout.rs
// ============================================================================
// Module: Registry Fan-Out Tests
// Description: Verifies org scoping, filters, and slow-subscriber handling.
// ============================================================================
//! ## Overview
//! Exercises the fan-out registry without a database: org isolation,
//! channel filters, malformed payload handling, disconnect-on-full, and
//! resubscription broadcasts.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeSet;

use akashi_broker::BrokerEvent;
use akashi_broker::SubscriberRegistry;
use akashi_broker::SubscriptionFilter;
use akashi_core::NotifyChannel;
use akashi_core::OrgId;
use uuid::Uuid;

/// Builds a decisions payload for the given org.
fn payload(org: OrgId) -> String {
    format!(r#"{{"org_id": "{}", "decision_id": "{}"}}"#, org.as_uuid(), Uuid::new_v4())
}

#[tokio::test]
async fn delivery_is_org_scoped() {
    let registry = SubscriberRegistry::new(8);
    let org_a = OrgId::generate();
    let org_b = OrgId::generate();
    let mut sub_a = registry.subscribe(org_a, SubscriptionFilter::default()).await;
    let mut sub_b = registry.subscribe(org_b, SubscriptionFilter::default()).await;

    let delivered = registry.dispatch(NotifyChannel::Decisions, &payload(org_a)).await;
    assert_eq!(delivered, 1);

    let event = sub_a.recv().await.expect("event");
    match event {
        BrokerEvent::Notification(notification) => {
            assert_eq!(notification.org_id, org_a);
            assert_eq!(notification.channel, NotifyChannel::Decisions);
        }
        BrokerEvent::Resubscribed => panic!("unexpected resubscription"),
    }

    // The other org's subscriber sees nothing.
    registry.unsubscribe(sub_b.id()).await;
    assert!(sub_b.recv().await.is_none());
}

#[tokio::test]
async fn channel_filters_apply() {
    let registry = SubscriberRegistry::new(8);
    let org = OrgId::generate();
    let filter = SubscriptionFilter {
        channels: Some(BTreeSet::from([NotifyChannel::Conflicts])),
    };
    let mut sub = registry.subscribe(org, filter).await;

    assert_eq!(registry.dispatch(NotifyChannel::Decisions, &payload(org)).await, 0);
    assert_eq!(registry.dispatch(NotifyChannel::Conflicts, &payload(org)).await, 1);

    let event = sub.recv().await.expect("event");
    match event {
        BrokerEvent::Notification(notification) => {
            assert_eq!(notification.channel, NotifyChannel::Conflicts);
        }
        BrokerEvent::Resubscribed => panic!("unexpected resubscription"),
    }
}

#[tokio::test]
async fn malformed_payloads_are_dropped() {
    let registry = SubscriberRegistry::new(8);
    let org = OrgId::generate();
    let _sub = registry.subscribe(org, SubscriptionFilter::default()).await;

    assert_eq!(registry.dispatch(NotifyChannel::Decisions, "not json").await, 0);
    assert_eq!(registry.dispatch(NotifyChannel::Decisions, r#"{"no_org": true}"#).await, 0);
}

#[tokio::test]
async fn slow_subscriber_is_disconnected() {
    let registry = SubscriberRegistry::new(2);
    let org = OrgId::generate();
    let mut sub = registry.subscribe(org, SubscriptionFilter::default()).await;

    // Fill the bounded channel without consuming, then overflow it.
    assert_eq!(registry.dispatch(NotifyChannel::Decisions, &payload(org)).await, 1);
    assert_eq!(registry.dispatch(NotifyChannel::Decisions, &payload(org)).await, 1);
    assert_eq!(registry.dispatch(NotifyChannel::Decisions, &payload(org)).await, 0);
    assert!(registry.is_empty().await);

    // The two buffered events drain, then the stream ends.
    assert!(sub.recv().await.is_some());
    assert!(sub.recv().await.is_some());
    assert!(sub.recv().await.is_none());
}

#[tokio::test]
async fn resubscription_reaches_every_subscriber() {
    let registry = SubscriberRegistry::new(8);
    let mut sub_a = registry.subscribe(OrgId::generate(), SubscriptionFilter::default()).await;
    let mut sub_b = registry.subscribe(OrgId::generate(), SubscriptionFilter::default()).await;

    registry.broadcast_resubscribed().await;
    assert_eq!(sub_a.recv().await, Some(BrokerEvent::Resubscribed));
    assert_eq!(sub_b.recv().await, Some(BrokerEvent::Resubscribed));
}
