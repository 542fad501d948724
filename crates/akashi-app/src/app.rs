// crates/akashi-app/src/app.rs
// ============================================================================
// Module: Application Assembly
// Description: Startup wiring, background loops, and three-phase shutdown.
// Purpose: Own every process-wide singleton with explicit init and teardown.
// Dependencies: every akashi crate, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! [`App::start`] brings the process up in strict order and returns a
//! handle exposing the decision service and broker to the outer surface.
//! Background loops (conflict backfill, refresh tick, integrity tick,
//! idempotency cleanup, outbox poller, broker listener, buffer flusher)
//! watch one shutdown signal. [`App::shutdown`] stops intake, drains the
//! buffer within its budget (hard error on a miss), drains the outbox best
//! effort, and then tears everything down.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use akashi_broker::Broker;
use akashi_broker::BrokerOptions;
use akashi_config::AkashiConfig;
use akashi_core::Agent;
use akashi_core::AgentId;
use akashi_core::AgentRole;
use akashi_core::AgentStore;
use akashi_core::ApiKey;
use akashi_core::ApiKeyId;
use akashi_core::ConflictValidator;
use akashi_core::DraftLimits;
use akashi_core::EventStore;
use akashi_core::IdempotencyStore;
use akashi_core::OrgId;
use akashi_core::VectorIndex;
use akashi_core::core::agent::hash_key;
use akashi_core::core::agent::key_prefix;
use akashi_engine::AccessResolver;
use akashi_engine::ConflictScorer;
use akashi_engine::DecisionService;
use akashi_engine::IntegrityEngine;
use akashi_engine::OutboxWorker;
use akashi_engine::OutboxWorkerOptions;
use akashi_engine::ScorerOptions;
use akashi_engine::ServiceOptions;
use akashi_index::NoopVectorIndex;
use akashi_index::QdrantIndex;
use akashi_index::QdrantOptions;
use akashi_ingest::BufferError;
use akashi_ingest::BufferOptions;
use akashi_ingest::EventBuffer;
use akashi_ingest::EventWal;
use akashi_ingest::WalOptions;
use akashi_ingest::WalSync;
use akashi_providers::select_embedding_provider;
use akashi_providers::select_validator;
use akashi_store::PostgresStore;
use akashi_store::run_migrations;
use akashi_store::verify_schema;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AppError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// TTL for the grant cache.
const GRANT_CACHE_TTL: Duration = Duration::from_secs(30);
/// Batch size for the embedding backfill inside the refresh tick.
const EMBEDDING_BACKFILL_BATCH: u32 = 100;
/// Bootstrap organization used by the admin seed.
const BOOTSTRAP_ORG_NAME: &str = "bootstrap";
/// Bootstrap admin agent identifier.
const BOOTSTRAP_ADMIN_AGENT: &str = "admin";

// ============================================================================
// SECTION: Telemetry
// ============================================================================

/// Installs the process-wide tracing subscriber with env-filter control.
///
/// Called once by the binary before [`App::start`]; repeated installs are
/// ignored.
pub fn init_telemetry() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// SECTION: App
// ============================================================================

/// Assembled application handle.
pub struct App {
    /// Loaded configuration.
    config: AkashiConfig,
    /// PostgreSQL store.
    store: Arc<PostgresStore>,
    /// Vector index adapter.
    index: Arc<dyn VectorIndex>,
    /// Event ingestion buffer.
    buffer: Arc<EventBuffer>,
    /// Notification broker.
    broker: Arc<Broker>,
    /// Decision service.
    service: Arc<DecisionService>,
    /// Conflict scorer.
    scorer: Arc<ConflictScorer>,
    /// Outbox worker.
    outbox_worker: Arc<OutboxWorker>,
    /// Integrity engine.
    integrity: Arc<IntegrityEngine>,
    /// Grant cache and scope resolver.
    access: Arc<AccessResolver>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Background loop handles.
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Starts the application.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] with a distinct exit code for configuration,
    /// database init, migration, schema verification, provider, broker, or
    /// WAL failures.
    pub async fn start(config: AkashiConfig) -> Result<Self, AppError> {
        config.validate()?;

        let store = Arc::new(
            PostgresStore::connect(&config.database.url, config.database.max_connections)
                .await
                .map_err(AppError::DatabaseInit)?,
        );
        run_migrations(store.pool()).await.map_err(AppError::Migration)?;
        verify_schema(store.pool()).await.map_err(AppError::SchemaVerification)?;

        let embeddings = select_embedding_provider(&config.embedding)
            .map_err(|err| AppError::Provider(err.to_string()))?;
        let validator: Arc<dyn ConflictValidator> =
            select_validator(&config.conflict, &config.embedding)
                .map_err(|err| AppError::Provider(err.to_string()))?;
        let index: Arc<dyn VectorIndex> = match &config.index.url {
            Some(url) => {
                let qdrant = QdrantIndex::new(QdrantOptions {
                    url: url.clone(),
                    api_key: config.index.api_key.clone(),
                    collection: config.index.collection.clone(),
                    dimensions: config.index.dimensions,
                    timeout: Duration::from_millis(config.index.timeout_ms),
                })
                .map_err(|err| AppError::Provider(err.to_string()))?;
                if let Err(err) = qdrant.ensure_collection().await {
                    tracing::warn!(error = %err, "vector collection setup deferred");
                }
                Arc::new(qdrant)
            }
            None => Arc::new(NoopVectorIndex),
        };

        seed_admin(&store, config.admin_api_key.as_deref()).await;
        match store.migrate_agent_keys_to_api_keys().await {
            Ok(0) => {}
            Ok(migrated) => tracing::info!(migrated, "legacy agent keys migrated"),
            Err(err) => tracing::warn!(error = %err, "legacy key migration failed"),
        }

        let buffer = start_buffer(&config, &store).await?;

        let scorer = ConflictScorer::new(
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&index),
            validator,
            ScorerOptions {
                significance_threshold: config.conflict.significance_threshold,
                lambda_days: config.conflict.decay_lambda_days,
                candidate_limit: config.conflict.candidate_limit,
                backfill_batch: 100,
                backfill_workers: config.conflict.backfill_workers,
            },
        );
        if let Err(err) = scorer.maybe_rescore(config.conflict.force_rescore).await {
            tracing::warn!(error = %err, "rescore trigger failed");
        }

        let outbox_worker = OutboxWorker::new(
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&index),
            OutboxWorkerOptions {
                poll_interval: config.outbox_poll_interval(),
                batch_size: config.outbox.batch_size,
                max_attempts: config.outbox.max_attempts,
                lease: Duration::from_millis(config.outbox.lease_ms),
            },
        );
        let integrity = Arc::new(IntegrityEngine::new(Arc::clone(&store) as _));
        let access =
            Arc::new(AccessResolver::new(Arc::clone(&store) as _, GRANT_CACHE_TTL));

        let service = DecisionService::new(
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            embeddings,
            Arc::clone(&index),
            Arc::clone(&scorer),
            Arc::clone(&buffer),
            ServiceOptions {
                limits: DraftLimits {
                    max_outcome_bytes: config.max_outcome_bytes,
                    ..DraftLimits::default()
                },
                ..ServiceOptions::default()
            },
        );

        let broker = Arc::new(
            Broker::start(BrokerOptions::new(config.database.listen_url())).await?,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // One-shot conflict backfill.
        {
            let scorer = Arc::clone(&scorer);
            tasks.push(tokio::spawn(async move {
                if let Err(err) = scorer.backfill().await {
                    tracing::warn!(error = %err, "startup conflict backfill failed");
                }
            }));
        }
        // Conflict refresh tick: agent state, embedding backfill, stragglers.
        {
            let store = Arc::clone(&store);
            let service = Arc::clone(&service);
            let scorer = Arc::clone(&scorer);
            let interval = Duration::from_millis(config.intervals.conflict_refresh_interval_ms);
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Err(err) = store.refresh_agent_state().await {
                                tracing::warn!(error = %err, "agent state refresh failed");
                            }
                            if let Err(err) =
                                service.backfill_embeddings(EMBEDDING_BACKFILL_BATCH).await
                            {
                                tracing::warn!(error = %err, "embedding backfill failed");
                            }
                            if let Err(err) = scorer.backfill().await {
                                tracing::warn!(error = %err, "conflict refresh scoring failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            }));
        }
        // Integrity proof tick.
        {
            let integrity = Arc::clone(&integrity);
            let interval = Duration::from_millis(config.intervals.integrity_interval_ms);
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Err(err) = integrity.run_once().await {
                                tracing::warn!(error = %err, "integrity pass failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            }));
        }
        // Idempotency cleanup tick.
        {
            let store = Arc::clone(&store);
            let interval =
                Duration::from_millis(config.intervals.idempotency_cleanup_interval_ms);
            let completed =
                time::Duration::milliseconds(to_i64(config.intervals.idempotency_completed_ttl_ms));
            let abandoned =
                time::Duration::milliseconds(to_i64(config.intervals.idempotency_abandoned_ttl_ms));
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            match store.purge_idempotency_keys(completed, abandoned).await {
                                Ok(0) => {}
                                Ok(purged) => {
                                    tracing::info!(purged, "idempotency keys purged");
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "idempotency cleanup failed");
                                }
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            }));
        }
        // Outbox poller.
        tasks.push(tokio::spawn(Arc::clone(&outbox_worker).run(shutdown_rx)));

        tracing::info!("akashi started");
        Ok(Self {
            config,
            store,
            index,
            buffer,
            broker,
            service,
            scorer,
            outbox_worker,
            integrity,
            access,
            shutdown_tx,
            tasks,
        })
    }

    /// Returns the decision service consumed by the outer surface.
    #[must_use]
    pub fn service(&self) -> Arc<DecisionService> {
        Arc::clone(&self.service)
    }

    /// Returns the notification broker for subscriptions.
    #[must_use]
    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    /// Returns the access resolver scoping reads.
    #[must_use]
    pub fn access(&self) -> Arc<AccessResolver> {
        Arc::clone(&self.access)
    }

    /// Returns the conflict scorer for on-demand backfills.
    #[must_use]
    pub fn scorer(&self) -> Arc<ConflictScorer> {
        Arc::clone(&self.scorer)
    }

    /// Returns the integrity engine for verification endpoints.
    #[must_use]
    pub fn integrity(&self) -> Arc<IntegrityEngine> {
        Arc::clone(&self.integrity)
    }

    /// Shuts down in three bounded phases and tears components down.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BufferDrainTimeout`] when the buffer drain
    /// misses its budget; teardown still completes before the error is
    /// returned.
    pub async fn shutdown(self) -> Result<(), AppError> {
        // Phase 1: stop intake; background loops exit on the signal.
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }

        // Phase 2: drain the event buffer within its budget.
        let drain_result = self
            .buffer
            .drain(Duration::from_millis(self.config.shutdown.buffer_drain_ms))
            .await;
        let drain_error = match drain_result {
            Ok(()) => None,
            Err(BufferError::DrainTimeout { unflushed }) => {
                tracing::error!(unflushed, "buffer drain missed its deadline");
                Some(AppError::BufferDrainTimeout {
                    unflushed,
                })
            }
            Err(err) => {
                tracing::error!(error = %err, "buffer drain failed");
                Some(AppError::BufferDrainTimeout {
                    unflushed: self.buffer.pending_count(),
                })
            }
        };

        // Phase 3: best-effort outbox drain.
        let remaining = self
            .outbox_worker
            .drain(Duration::from_millis(self.config.shutdown.outbox_drain_ms))
            .await;
        if remaining > 0 {
            tracing::warn!(remaining, "outbox rows left for the next start");
        }

        // Teardown.
        self.access.clear().await;
        self.broker.shutdown().await;
        self.index.close().await;
        self.buffer.close().await;
        self.store.close().await;
        tracing::info!("akashi stopped");

        drain_error.map_or(Ok(()), Err)
    }

    /// Runs until SIGINT/SIGTERM, then shuts down.
    ///
    /// # Errors
    ///
    /// Propagates startup and shutdown errors; the caller maps them to the
    /// process exit code via [`AppError::exit_code`].
    pub async fn run(config: AkashiConfig) -> Result<(), AppError> {
        let app = Self::start(config).await?;
        wait_for_signal().await;
        app.shutdown().await
    }
}

// ============================================================================
// SECTION: Startup Helpers
// ============================================================================

/// Converts a millisecond count to `i64`, saturating.
fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Opens the WAL (when enabled), replays it, and starts the buffer.
async fn start_buffer(
    config: &AkashiConfig,
    store: &Arc<PostgresStore>,
) -> Result<Arc<EventBuffer>, AppError> {
    let buffer_options = BufferOptions {
        capacity: config.buffer.capacity,
        flush_max_events: config.buffer.flush_max_events,
        flush_interval: config.flush_interval(),
        ..BufferOptions::default()
    };

    if !config.wal.enabled {
        let buffer = Arc::new(EventBuffer::start(
            buffer_options,
            None,
            Arc::clone(store) as _,
        ));
        return Ok(buffer);
    }

    let sync = match config.wal.sync {
        akashi_config::WalSyncMode::Always => WalSync::Always,
        akashi_config::WalSyncMode::Interval => {
            WalSync::Interval(Duration::from_millis(config.wal.sync_interval_ms))
        }
        akashi_config::WalSyncMode::Never => WalSync::Never,
    };
    let (wal, replayed) = EventWal::open(WalOptions {
        dir: config.wal.dir.clone(),
        sync,
        segment_max_bytes: config.wal.segment_max_bytes,
        segment_max_records: config.wal.segment_max_records,
    })
    .map_err(|err| AppError::Wal(err.to_string()))?;

    // Re-enqueue only records the store does not already hold.
    let ids: Vec<_> = replayed.iter().map(|event| event.event_id).collect();
    let present = store
        .existing_event_ids(&ids)
        .await
        .map_err(|err| AppError::Wal(err.to_string()))?;
    let missing: Vec<_> = replayed
        .into_iter()
        .filter(|event| !present.contains(&event.event_id))
        .collect();

    let buffer = Arc::new(EventBuffer::start(
        buffer_options,
        Some(wal),
        Arc::clone(store) as _,
    ));
    if !missing.is_empty() {
        let seeded = buffer
            .seed_replayed(missing)
            .await
            .map_err(|err| AppError::Wal(err.to_string()))?;
        tracing::info!(seeded, "wal events re-enqueued after restart");
    }
    Ok(buffer)
}

/// Seeds the bootstrap admin agent when the directory is empty.
async fn seed_admin(store: &Arc<PostgresStore>, admin_api_key: Option<&str>) {
    let Some(raw_key) = admin_api_key else {
        return;
    };
    match store.count_agents().await {
        Ok(0) => {}
        Ok(_) => return,
        Err(err) => {
            tracing::warn!(error = %err, "admin seed skipped; count failed");
            return;
        }
    }
    let org_id = OrgId::from_uuid(Uuid::nil());
    let now = OffsetDateTime::now_utc();
    if let Err(err) = store.ensure_org(org_id, BOOTSTRAP_ORG_NAME).await {
        tracing::warn!(error = %err, "admin seed skipped; org create failed");
        return;
    }
    let agent = Agent {
        org_id,
        agent_id: AgentId::new(BOOTSTRAP_ADMIN_AGENT),
        display_name: "Bootstrap Admin".to_string(),
        role: AgentRole::OrgOwner,
        tags: Vec::new(),
        legacy_key_hash: None,
        created_at: now,
    };
    if let Err(err) = store.create_agent(&agent).await {
        tracing::warn!(error = %err, "admin seed skipped; agent create failed");
        return;
    }
    let key = ApiKey {
        id: ApiKeyId::generate(),
        org_id,
        agent_id: agent.agent_id.clone(),
        prefix: key_prefix(raw_key),
        key_hash: hash_key(raw_key),
        label: Some("bootstrap admin key".to_string()),
        created_at: now,
        last_used_at: None,
        revoked_at: None,
        expires_at: None,
    };
    if let Err(err) = store.create_api_key(&key).await {
        tracing::warn!(error = %err, "admin seed key create failed");
        return;
    }
    tracing::info!("bootstrap admin agent seeded");
}

/// Waits for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(error = %err, "sigterm hook failed; waiting on ctrl-c only");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
