// crates/akashi-engine/src/outbox.rs
// ============================================================================
// Module: Search Outbox Worker
// Description: Poll loop propagating decision vectors to the index.
// Purpose: Deliver upserts and deletes with leases, retries, and dead letters.
// Dependencies: akashi-core, time, tokio
// ============================================================================

//! ## Overview
//! The worker polls the outbox on an interval: exhausted rows move to the
//! dead-letter archive, then a leased batch is delivered. Upserts re-read
//! the decision so the freshest embeddings reach the index; rows whose
//! embeddings are not backfilled yet fail softly and retry once the lease
//! lapses. A delivered row is deleted; a failed row records its error and
//! releases the lease, giving retry-with-delay for free.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use akashi_core::DecisionStore;
use akashi_core::IndexPoint;
use akashi_core::OutboxEntry;
use akashi_core::OutboxOperation;
use akashi_core::OutboxStore;
use akashi_core::StoreError;
use akashi_core::VectorIndex;
use tokio::sync::watch;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Outbox worker configuration.
///
/// # Invariants
/// - All values are positive; `lease` exceeds one delivery round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxWorkerOptions {
    /// Poll interval.
    pub poll_interval: Duration,
    /// Rows leased per poll.
    pub batch_size: u32,
    /// Delivery attempts before dead-lettering.
    pub max_attempts: i32,
    /// Lease duration; doubles as the retry delay after a failure.
    pub lease: Duration,
}

impl Default for OutboxWorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 50,
            max_attempts: 8,
            lease: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Poll-loop worker delivering outbox rows to the vector index.
pub struct OutboxWorker {
    /// Outbox store.
    outbox: Arc<dyn OutboxStore>,
    /// Decision store for re-reading embeddings.
    decisions: Arc<dyn DecisionStore>,
    /// Destination index.
    index: Arc<dyn VectorIndex>,
    /// Worker configuration.
    options: OutboxWorkerOptions,
}

impl OutboxWorker {
    /// Builds the worker.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        decisions: Arc<dyn DecisionStore>,
        index: Arc<dyn VectorIndex>,
        options: OutboxWorkerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            outbox,
            decisions,
            index,
            options,
        })
    }

    /// Runs the poll loop until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.options.poll_interval) => {
                    if let Err(err) = self.run_once().await {
                        tracing::warn!(error = %err, "outbox pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("outbox worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Runs one pass: dead-letter exhausted rows, lease, deliver.
    ///
    /// Returns the number of rows delivered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the outbox itself fails; per-row index
    /// failures are recorded on the row, not returned.
    pub async fn run_once(&self) -> Result<u32, StoreError> {
        let dead = self.outbox.dead_letter_exhausted(self.options.max_attempts).await?;
        if dead > 0 {
            tracing::warn!(dead, "outbox rows dead-lettered");
        }
        let lease = time::Duration::try_from(self.options.lease)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let batch = self
            .outbox
            .lease_outbox_batch(self.options.batch_size, lease, self.options.max_attempts)
            .await?;
        let mut delivered = 0;
        for entry in batch {
            match self.deliver(&entry).await {
                Ok(()) => {
                    self.outbox.complete_outbox_entry(entry.id).await?;
                    delivered += 1;
                }
                Err(message) => {
                    tracing::warn!(
                        entry = %entry.id,
                        decision = %entry.decision_id,
                        attempts = entry.attempts + 1,
                        error = %message,
                        "outbox delivery failed"
                    );
                    self.outbox.fail_outbox_entry(entry.id, &message).await?;
                }
            }
        }
        Ok(delivered)
    }

    /// Delivers one row; the error string lands in `last_error`.
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), String> {
        match entry.operation {
            OutboxOperation::Upsert => {
                let decision = match self.decisions.decision(entry.org_id, entry.decision_id).await
                {
                    Ok(decision) => decision,
                    // The decision vanished (erasure); nothing to index.
                    Err(StoreError::NotFound(_)) => return Ok(()),
                    Err(err) => return Err(err.to_string()),
                };
                let (Some(embedding), Some(outcome_embedding)) =
                    (decision.embedding.clone(), decision.outcome_embedding.clone())
                else {
                    return Err("embeddings not backfilled yet".to_string());
                };
                let point = IndexPoint {
                    decision_id: decision.id,
                    org_id: decision.org_id,
                    decision_vector: embedding,
                    outcome_vector: outcome_embedding,
                    decision_type: decision.decision_type.normalized(),
                    agent_id: decision.agent_id.as_str().to_string(),
                };
                self.index.upsert(&point).await.map_err(|err| err.to_string())
            }
            OutboxOperation::Delete => {
                self.index.delete(entry.decision_id).await.map_err(|err| err.to_string())
            }
        }
    }

    /// Final best-effort pass within the shutdown budget.
    ///
    /// Returns the rows still pending when the budget lapsed.
    pub async fn drain(&self, budget: Duration) -> u64 {
        let pass = tokio::time::timeout(budget, self.run_once()).await;
        match pass {
            Ok(Ok(delivered)) => {
                tracing::info!(delivered, "outbox drain pass complete");
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "outbox drain pass failed");
            }
            Err(_) => {
                tracing::warn!("outbox drain pass timed out");
            }
        }
        self.outbox.pending_outbox_count().await.unwrap_or(0)
    }
}
