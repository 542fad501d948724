// crates/akashi-ingest/tests/buffer_flush.rs
// ============================================================================
// Module: Event Buffer Flush Tests
// Description: Exercises flush triggers, ordering, recovery, and drain.
// ============================================================================
//! ## Overview
//! Drives the buffer against an in-memory event store: size- and
//! age-triggered flushes, strict per-run sequence ordering, retry after
//! transient failure, WAL crash replay, and drain semantics.

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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use akashi_core::AgentEvent;
use akashi_core::AgentId;
use akashi_core::EventId;
use akashi_core::EventKind;
use akashi_core::EventStore;
use akashi_core::NewEvent;
use akashi_core::OrgId;
use akashi_core::RunId;
use akashi_core::StoreError;
use akashi_ingest::BufferOptions;
use akashi_ingest::EventBuffer;
use akashi_ingest::EventWal;
use akashi_ingest::WalOptions;
use async_trait::async_trait;
use serde_json::json;
use time::OffsetDateTime;

// ============================================================================
// SECTION: In-Memory Event Store
// ============================================================================

/// In-memory [`EventStore`] with a controllable failure budget.
#[derive(Default)]
struct MemoryEventStore {
    /// Committed events in insertion order.
    events: Mutex<Vec<AgentEvent>>,
    /// Global sequence counter.
    sequence: AtomicI64,
    /// Number of upcoming `insert_events` calls that fail.
    failures: AtomicU32,
}

impl MemoryEventStore {
    /// Returns a snapshot of committed events.
    fn committed(&self) -> Vec<AgentEvent> {
        self.events.lock().expect("lock").clone()
    }

    /// Arms the next `count` inserts to fail with a transient error.
    fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn reserve_sequence_block(&self, count: u32) -> Result<Vec<i64>, StoreError> {
        let mut block = Vec::with_capacity(count as usize);
        for _ in 0..count {
            block.push(self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        }
        Ok(block)
    }

    async fn insert_events(&self, events: &[AgentEvent]) -> Result<u64, StoreError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Transient("injected failure".to_string()));
        }
        let mut guard = self.events.lock().expect("lock");
        guard.extend_from_slice(events);
        Ok(events.len() as u64)
    }

    async fn existing_event_ids(&self, ids: &[EventId]) -> Result<Vec<EventId>, StoreError> {
        let guard = self.events.lock().expect("lock");
        Ok(guard.iter().map(|event| event.id).filter(|id| ids.contains(id)).collect())
    }

    async fn events_for_run(
        &self,
        _org_id: OrgId,
        run_id: RunId,
        _limit: u32,
    ) -> Result<Vec<AgentEvent>, StoreError> {
        let guard = self.events.lock().expect("lock");
        Ok(guard.iter().filter(|event| event.run_id == run_id).cloned().collect())
    }

    async fn archive_and_purge_before(
        &self,
        _org_id: OrgId,
        _cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        Ok(0)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an event for the provided run.
fn new_event(org: OrgId, run: RunId, n: u64) -> NewEvent {
    NewEvent {
        org_id: org,
        agent_id: AgentId::new("worker"),
        run_id: run,
        kind: EventKind::ToolCallStarted,
        occurred_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp"),
        payload: json!({"n": n}),
    }
}

/// Buffer options tuned for fast tests.
fn fast_options(flush_max: usize) -> BufferOptions {
    BufferOptions {
        capacity: 1_024,
        flush_max_events: flush_max,
        flush_interval: Duration::from_millis(50),
        flush_retry_attempts: 5,
        retry_backoff: Duration::from_millis(10),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn size_trigger_flushes_in_order() {
    let store = Arc::new(MemoryEventStore::default());
    let buffer = EventBuffer::start(fast_options(10), None, Arc::clone(&store) as _);
    let org = OrgId::generate();
    let run = RunId::generate();
    for n in 0..10 {
        buffer.append(new_event(org, run, n)).await.expect("append");
    }
    buffer.drain(Duration::from_secs(5)).await.expect("drain");

    let committed = store.committed();
    assert_eq!(committed.len(), 10);
    for window in committed.windows(2) {
        assert!(window[0].sequence_num < window[1].sequence_num);
    }
    for (n, event) in committed.iter().enumerate() {
        assert_eq!(event.payload, json!({"n": n as u64}));
    }
}

#[tokio::test]
async fn age_trigger_flushes_partial_batches() {
    let store = Arc::new(MemoryEventStore::default());
    let buffer = EventBuffer::start(fast_options(1_000), None, Arc::clone(&store) as _);
    let org = OrgId::generate();
    let run = RunId::generate();
    buffer.append(new_event(org, run, 0)).await.expect("append");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.committed().len(), 1);
    buffer.close().await;
}

#[tokio::test]
async fn transient_failures_retry_without_loss_or_reorder() {
    let store = Arc::new(MemoryEventStore::default());
    store.fail_next(2);
    let buffer = EventBuffer::start(fast_options(5), None, Arc::clone(&store) as _);
    let org = OrgId::generate();
    let run = RunId::generate();
    for n in 0..5 {
        buffer.append(new_event(org, run, n)).await.expect("append");
    }
    buffer.drain(Duration::from_secs(10)).await.expect("drain");

    let committed = store.committed();
    assert_eq!(committed.len(), 5);
    for (n, event) in committed.iter().enumerate() {
        assert_eq!(event.payload, json!({"n": n as u64}));
    }
}

#[tokio::test]
async fn wal_replay_recovers_unflushed_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let org = OrgId::generate();
    let run = RunId::generate();

    // First life: events reach the WAL but the store never accepts them.
    {
        let store = Arc::new(MemoryEventStore::default());
        store.fail_next(u32::MAX);
        let (wal, replayed) = EventWal::open(WalOptions::new(dir.path())).expect("open wal");
        assert!(replayed.is_empty());
        let buffer =
            EventBuffer::start(fast_options(1_000), Some(wal), Arc::clone(&store) as _);
        for n in 0..20 {
            buffer.append(new_event(org, run, n)).await.expect("append");
        }
        assert_eq!(buffer.pending_count(), 20);
        // Process "crashes" here: the buffer is dropped without a flush.
    }

    // Second life: WAL replay re-enqueues everything, the store accepts.
    let store = Arc::new(MemoryEventStore::default());
    let (wal, replayed) = EventWal::open(WalOptions::new(dir.path())).expect("reopen wal");
    assert_eq!(replayed.len(), 20);
    let pending = store.existing_event_ids(
        &replayed.iter().map(|event| event.event_id).collect::<Vec<_>>(),
    )
    .await
    .expect("lookup");
    assert!(pending.is_empty());

    let buffer = EventBuffer::start(fast_options(1_000), Some(wal), Arc::clone(&store) as _);
    buffer.seed_replayed(replayed).await.expect("seed");
    buffer.drain(Duration::from_secs(10)).await.expect("drain");

    let committed = store.committed();
    assert_eq!(committed.len(), 20);
    for (n, event) in committed.iter().enumerate() {
        assert_eq!(event.payload, json!({"n": n as u64}));
    }
    for window in committed.windows(2) {
        assert!(window[0].sequence_num < window[1].sequence_num);
    }
}

#[tokio::test]
async fn drain_times_out_when_store_is_down() {
    let store = Arc::new(MemoryEventStore::default());
    store.fail_next(u32::MAX);
    let buffer = EventBuffer::start(fast_options(1_000), None, Arc::clone(&store) as _);
    let org = OrgId::generate();
    let run = RunId::generate();
    buffer.append(new_event(org, run, 0)).await.expect("append");

    let result = buffer.drain(Duration::from_millis(400)).await;
    assert!(result.is_err());
}
