// crates/akashi-ingest/src/buffer.rs
// ============================================================================
// Module: Event Ingestion Buffer
// Description: Bounded producer/consumer buffer with bulk flushes.
// Purpose: Absorb event bursts and commit them in ordered bulk batches.
// Dependencies: akashi-core, rand, tokio, crate::wal
// ============================================================================

//! ## Overview
//! Producers append events through a bounded channel and block under
//! backpressure; a single flusher task drains the channel and commits
//! batches when the size or age trigger fires. Each flush reserves one
//! block of sequence values and stamps events in submission order, so
//! per-run sequence numbers are strictly increasing. Failed flushes retry
//! with jittered exponential backoff and never partially commit; a batch
//! that keeps failing stays queued and backpressure reaches producers.
//! When a WAL is attached, every event is durable on disk before it enters
//! the queue, and covered segments are truncated after each confirmed
//! flush.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use akashi_core::AgentEvent;
use akashi_core::BufferedEvent;
use akashi_core::EventId;
use akashi_core::EventStore;
use akashi_core::NewEvent;
use akashi_core::StoreError;
use rand::Rng;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::wal::EventWal;
use crate::wal::WalError;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Buffer configuration.
///
/// # Invariants
/// - All values are greater than zero; `flush_max_events <= capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    /// Bounded queue capacity; producers block when it is full.
    pub capacity: usize,
    /// Flush when this many events are queued.
    pub flush_max_events: usize,
    /// Flush when the oldest queued event reaches this age.
    pub flush_interval: Duration,
    /// Retry attempts within one flush cycle before yielding to the loop.
    pub flush_retry_attempts: u32,
    /// Base backoff between retry attempts; doubles per attempt with jitter.
    pub retry_backoff: Duration,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            capacity: 8_192,
            flush_max_events: 500,
            flush_interval: Duration::from_millis(1_000),
            flush_retry_attempts: 5,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Buffer errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Buffer is closed and no longer accepts events.
    #[error("event buffer is closed")]
    Closed,
    /// WAL append failed; the event was not admitted.
    #[error("event wal append failed: {0}")]
    Wal(#[from] WalError),
    /// Drain missed its deadline with events still queued.
    #[error("event buffer drain timed out with {unflushed} events unflushed")]
    DrainTimeout {
        /// Events still queued when the deadline lapsed.
        unflushed: usize,
    },
    /// Downstream store rejected the flush.
    #[error("event flush failed: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Queue Items
// ============================================================================

/// One queued event with its WAL position, when a WAL is attached.
#[derive(Debug, Clone)]
struct QueuedEvent {
    /// The admitted event.
    event: BufferedEvent,
    /// WAL append index; `None` for replayed or WAL-less events.
    wal_index: Option<u64>,
}

/// Control commands handled by the flusher.
enum Command {
    /// Flush everything queued and acknowledge.
    Drain(oneshot::Sender<Result<(), BufferError>>),
    /// Flush everything queued, acknowledge, and stop the flusher.
    Shutdown(oneshot::Sender<()>),
}

// ============================================================================
// SECTION: Buffer
// ============================================================================

/// Bounded event buffer with a single flusher task.
///
/// # Invariants
/// - Exactly one flusher task consumes the queue.
/// - Events reach the store in submission order.
pub struct EventBuffer {
    /// Producer side of the bounded queue.
    tx: mpsc::Sender<QueuedEvent>,
    /// Control channel to the flusher.
    control: mpsc::Sender<Command>,
    /// Events admitted but not yet confirmed flushed.
    pending: Arc<AtomicUsize>,
    /// Attached WAL, shared with the flusher for truncation.
    wal: Option<Arc<Mutex<EventWal>>>,
    /// Flusher task handle.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventBuffer {
    /// Starts the buffer and its flusher task.
    ///
    /// `wal` of `None` keeps the buffer memory-only; a crash loses queued
    /// events and a warning records that trade-off.
    #[must_use]
    pub fn start(
        options: BufferOptions,
        wal: Option<EventWal>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        if wal.is_none() {
            tracing::warn!("event wal disabled; buffered events will not survive a crash");
        }
        let wal = wal.map(|inner| Arc::new(Mutex::new(inner)));
        let (tx, rx) = mpsc::channel(options.capacity);
        let (control_tx, control_rx) = mpsc::channel(4);
        let pending = Arc::new(AtomicUsize::new(0));
        let flusher = Flusher {
            options,
            store,
            wal: wal.clone(),
            pending: Arc::clone(&pending),
        };
        let task = tokio::spawn(flusher.run(rx, control_rx));
        Self {
            tx,
            control: control_tx,
            pending,
            wal,
            task: Mutex::new(Some(task)),
        }
    }

    /// Appends one event, blocking under backpressure.
    ///
    /// With a WAL attached the record is durable (per the sync mode) before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Wal`] when the WAL rejects the record and
    /// [`BufferError::Closed`] when the flusher has stopped.
    pub async fn append(&self, event: NewEvent) -> Result<EventId, BufferError> {
        let buffered = BufferedEvent::admit(event);
        let event_id = buffered.event_id;
        let wal_index = match &self.wal {
            Some(wal) => Some(wal.lock().await.append(&buffered)?),
            None => None,
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedEvent {
            event: buffered,
            wal_index,
        };
        if self.tx.send(queued).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(BufferError::Closed);
        }
        Ok(event_id)
    }

    /// Re-enqueues WAL-replayed events ahead of new traffic at startup.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Closed`] when the flusher has stopped.
    pub async fn seed_replayed(&self, events: Vec<BufferedEvent>) -> Result<usize, BufferError> {
        let count = events.len();
        for event in events {
            self.pending.fetch_add(1, Ordering::SeqCst);
            let queued = QueuedEvent {
                event,
                wal_index: None,
            };
            if self.tx.send(queued).await.is_err() {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(BufferError::Closed);
            }
        }
        Ok(count)
    }

    /// Returns the number of admitted, not-yet-flushed events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Flushes everything queued, bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::DrainTimeout`] carrying the unflushed count
    /// when the deadline lapses; the caller propagates it to the exit code.
    pub async fn drain(&self, deadline: Duration) -> Result<(), BufferError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send(Command::Drain(ack_tx)).await.is_err() {
            return Err(BufferError::Closed);
        }
        match tokio::time::timeout(deadline, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BufferError::Closed),
            Err(_) => Err(BufferError::DrainTimeout {
                unflushed: self.pending_count(),
            }),
        }
    }

    /// Stops the flusher after a final flush attempt.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send(Command::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

// ============================================================================
// SECTION: Flusher
// ============================================================================

/// Single consumer committing batches to the store.
struct Flusher {
    /// Buffer configuration.
    options: BufferOptions,
    /// Downstream event store.
    store: Arc<dyn EventStore>,
    /// Attached WAL for post-flush truncation.
    wal: Option<Arc<Mutex<EventWal>>>,
    /// Shared pending counter.
    pending: Arc<AtomicUsize>,
}

impl Flusher {
    /// Runs the flush loop until the producer side closes.
    async fn run(
        self,
        mut rx: mpsc::Receiver<QueuedEvent>,
        mut control: mpsc::Receiver<Command>,
    ) {
        let mut batch: Vec<QueuedEvent> = Vec::new();
        let mut age_deadline: Option<tokio::time::Instant> = None;
        loop {
            let sleep_until = age_deadline
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3_600));
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(item) => {
                            if batch.is_empty() {
                                age_deadline = Some(
                                    tokio::time::Instant::now() + self.options.flush_interval,
                                );
                            }
                            batch.push(item);
                            if batch.len() >= self.options.flush_max_events {
                                self.flush_cycle(&mut batch).await;
                                if batch.is_empty() {
                                    age_deadline = None;
                                }
                            }
                        }
                        None => {
                            self.flush_cycle(&mut batch).await;
                            if !batch.is_empty() {
                                tracing::error!(
                                    unflushed = batch.len(),
                                    "buffer closing with unflushed events"
                                );
                            }
                            return;
                        }
                    }
                }
                _ = tokio::time::sleep_until(sleep_until), if age_deadline.is_some() => {
                    self.flush_cycle(&mut batch).await;
                    if batch.is_empty() {
                        age_deadline = None;
                    } else {
                        // Failed cycle; re-arm the age trigger for the retry.
                        age_deadline = Some(
                            tokio::time::Instant::now() + self.options.flush_interval,
                        );
                    }
                }
                command = control.recv() => {
                    match command {
                        Some(Command::Drain(ack)) => {
                            while let Ok(item) = rx.try_recv() {
                                batch.push(item);
                            }
                            self.flush_cycle(&mut batch).await;
                            let result = if batch.is_empty() {
                                Ok(())
                            } else {
                                Err(BufferError::DrainTimeout {
                                    unflushed: batch.len(),
                                })
                            };
                            let _ = ack.send(result);
                            if batch.is_empty() {
                                age_deadline = None;
                            }
                        }
                        Some(Command::Shutdown(ack)) => {
                            while let Ok(item) = rx.try_recv() {
                                batch.push(item);
                            }
                            self.flush_cycle(&mut batch).await;
                            if !batch.is_empty() {
                                tracing::error!(
                                    unflushed = batch.len(),
                                    "buffer shutting down with unflushed events"
                                );
                            }
                            let _ = ack.send(());
                            return;
                        }
                        None => {}
                    }
                }
            }
        }
    }

    /// Attempts to flush the batch with bounded in-cycle retries.
    ///
    /// On success the batch empties; on persistent failure it stays intact
    /// for the next trigger so order is preserved.
    async fn flush_cycle(&self, batch: &mut Vec<QueuedEvent>) {
        if batch.is_empty() {
            return;
        }
        let mut backoff = self.options.retry_backoff;
        for attempt in 0..=self.options.flush_retry_attempts {
            match self.flush_once(batch).await {
                Ok(flushed) => {
                    self.pending.fetch_sub(flushed, Ordering::SeqCst);
                    let max_index =
                        batch.iter().filter_map(|item| item.wal_index).max();
                    batch.clear();
                    if let (Some(wal), Some(index)) = (&self.wal, max_index)
                        && let Err(err) = wal.lock().await.truncate_through(index)
                    {
                        tracing::warn!(error = %err, "wal truncation failed");
                    }
                    return;
                }
                Err(StoreError::Conflict(_)) => {
                    // A lost response from an earlier attempt already
                    // committed part of this batch; drop what exists.
                    if let Err(err) = self.drop_already_persisted(batch).await {
                        tracing::warn!(error = %err, "flush dedupe failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        batch = batch.len(),
                        error = %err,
                        "event flush failed"
                    );
                }
            }
            let quarter = u64::try_from(backoff.as_millis() / 4).unwrap_or(250) + 1;
            let jitter = rand::thread_rng().gen_range(0..quarter);
            tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
            backoff = (backoff * 2).min(Duration::from_secs(30));
        }
    }

    /// Commits the whole batch once: reserve sequences, stamp, bulk insert.
    async fn flush_once(&self, batch: &[QueuedEvent]) -> Result<usize, StoreError> {
        let count = u32::try_from(batch.len())
            .map_err(|_| StoreError::Invalid("batch too large".to_string()))?;
        let sequences = self.store.reserve_sequence_block(count).await?;
        if sequences.len() != batch.len() {
            return Err(StoreError::Transient("sequence block came up short".to_string()));
        }
        let recorded_at = OffsetDateTime::now_utc();
        let rows: Vec<AgentEvent> = batch
            .iter()
            .zip(sequences)
            .map(|(item, sequence_num)| AgentEvent {
                id: item.event.event_id,
                org_id: item.event.event.org_id,
                agent_id: item.event.event.agent_id.clone(),
                run_id: item.event.event.run_id,
                sequence_num,
                kind: item.event.event.kind.clone(),
                occurred_at: item.event.event.occurred_at,
                recorded_at,
                payload: item.event.event.payload.clone(),
            })
            .collect();
        self.store.insert_events(&rows).await?;
        Ok(rows.len())
    }

    /// Removes batch entries the store already holds, by event identifier.
    async fn drop_already_persisted(&self, batch: &mut Vec<QueuedEvent>) -> Result<(), StoreError> {
        let ids: Vec<EventId> = batch.iter().map(|item| item.event.event_id).collect();
        let present = self.store.existing_event_ids(&ids).await?;
        if present.is_empty() {
            return Ok(());
        }
        let before = batch.len();
        batch.retain(|item| !present.contains(&item.event.event_id));
        let removed = before - batch.len();
        self.pending.fetch_sub(removed, Ordering::SeqCst);
        tracing::info!(removed, "dropped already persisted events from batch");
        Ok(())
    }
}
