// crates/akashi-config/src/env.rs
// ============================================================================
// Module: Akashi Environment Keys
// Description: Environment-backed configuration keys with strict UTF-8 reads.
// Purpose: Centralize env parsing so misconfiguration fails closed.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Every recognized `AKASHI_*` environment variable is enumerated here with
//! its canonical name. Values are read with strict UTF-8 enforcement;
//! invalid UTF-8 fails closed rather than silently falling back to a
//! default.

// ============================================================================
// SECTION: Environment Keys
// ============================================================================

/// Environment keys recognized by the configuration loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEnv {
    /// Pooled database URL.
    DatabaseUrl,
    /// Direct (non-pooled) database URL for LISTEN/NOTIFY.
    DatabaseDirectUrl,
    /// Pool size.
    DatabaseMaxConnections,
    /// WAL directory.
    WalDir,
    /// WAL enable flag.
    WalEnabled,
    /// WAL sync mode: `always`, `interval`, or `never`.
    WalSyncMode,
    /// WAL sync interval in milliseconds for `interval` mode.
    WalSyncIntervalMs,
    /// WAL segment rotation size in bytes.
    WalSegmentMaxBytes,
    /// WAL segment rotation record count.
    WalSegmentMaxRecords,
    /// Event buffer capacity.
    BufferCapacity,
    /// Event buffer flush batch size.
    BufferFlushMaxEvents,
    /// Event buffer flush interval in milliseconds.
    BufferFlushIntervalMs,
    /// Vector index base URL.
    IndexUrl,
    /// Vector index API key.
    IndexApiKey,
    /// Vector index collection name.
    IndexCollection,
    /// Embedding dimensionality.
    IndexDimensions,
    /// Vector index request timeout in milliseconds.
    IndexTimeoutMs,
    /// Embedding provider selector: `auto`, `external`, `local`, or `noop`.
    EmbeddingProvider,
    /// External embedding API key.
    EmbeddingApiKey,
    /// External embedding API base URL.
    EmbeddingApiUrl,
    /// External embedding model.
    EmbeddingModel,
    /// Local embedding endpoint URL.
    EmbeddingLocalUrl,
    /// Local embedding model.
    EmbeddingLocalModel,
    /// Conflict validator selector: `auto`, `external`, `local`, or `noop`.
    ConflictValidator,
    /// Validator chat model.
    ConflictModel,
    /// Validator thread cap for the external class.
    ConflictLlmThreads,
    /// Significance threshold.
    ConflictThreshold,
    /// Temporal decay lambda in days.
    ConflictDecayLambdaDays,
    /// Conflict backfill worker count.
    ConflictBackfillWorkers,
    /// Candidate limit per scoring pass.
    ConflictCandidateLimit,
    /// Forced rescore flag.
    ForceConflictRescore,
    /// Local validator per-call timeout in milliseconds.
    ConflictLocalTimeoutMs,
    /// External validator per-call timeout in milliseconds.
    ConflictExternalTimeoutMs,
    /// Outbox poll interval in milliseconds.
    OutboxPollIntervalMs,
    /// Outbox batch size per poll.
    OutboxBatchSize,
    /// Outbox delivery attempt cap.
    OutboxMaxAttempts,
    /// Outbox lease duration in milliseconds.
    OutboxLeaseMs,
    /// HTTP drain timeout in milliseconds.
    ShutdownHttpDrainMs,
    /// Buffer drain timeout in milliseconds.
    ShutdownBufferDrainMs,
    /// Outbox drain timeout in milliseconds.
    ShutdownOutboxDrainMs,
    /// Integrity proof interval in milliseconds.
    IntegrityIntervalMs,
    /// Conflict refresh tick interval in milliseconds.
    ConflictRefreshIntervalMs,
    /// Idempotency cleanup interval in milliseconds.
    IdempotencyCleanupIntervalMs,
    /// Idempotency TTL for completed keys in milliseconds.
    IdempotencyCompletedTtlMs,
    /// Idempotency TTL for abandoned keys in milliseconds.
    IdempotencyAbandonedTtlMs,
    /// Maximum outcome size in bytes.
    MaxOutcomeBytes,
    /// Bootstrap admin API key.
    AdminApiKey,
    /// Production mode flag; secrets become required.
    Production,
}

impl ConfigEnv {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseUrl => "AKASHI_DATABASE_URL",
            Self::DatabaseDirectUrl => "AKASHI_DATABASE_DIRECT_URL",
            Self::DatabaseMaxConnections => "AKASHI_DATABASE_MAX_CONNECTIONS",
            Self::WalDir => "AKASHI_WAL_DIR",
            Self::WalEnabled => "AKASHI_WAL_ENABLED",
            Self::WalSyncMode => "AKASHI_WAL_SYNC_MODE",
            Self::WalSyncIntervalMs => "AKASHI_WAL_SYNC_INTERVAL_MS",
            Self::WalSegmentMaxBytes => "AKASHI_WAL_SEGMENT_MAX_BYTES",
            Self::WalSegmentMaxRecords => "AKASHI_WAL_SEGMENT_MAX_RECORDS",
            Self::BufferCapacity => "AKASHI_BUFFER_CAPACITY",
            Self::BufferFlushMaxEvents => "AKASHI_BUFFER_FLUSH_MAX_EVENTS",
            Self::BufferFlushIntervalMs => "AKASHI_BUFFER_FLUSH_INTERVAL_MS",
            Self::IndexUrl => "AKASHI_VECTOR_INDEX_URL",
            Self::IndexApiKey => "AKASHI_VECTOR_INDEX_API_KEY",
            Self::IndexCollection => "AKASHI_VECTOR_INDEX_COLLECTION",
            Self::IndexDimensions => "AKASHI_VECTOR_INDEX_DIMENSIONS",
            Self::IndexTimeoutMs => "AKASHI_VECTOR_INDEX_TIMEOUT_MS",
            Self::EmbeddingProvider => "AKASHI_EMBEDDING_PROVIDER",
            Self::EmbeddingApiKey => "AKASHI_EMBEDDING_API_KEY",
            Self::EmbeddingApiUrl => "AKASHI_EMBEDDING_API_URL",
            Self::EmbeddingModel => "AKASHI_EMBEDDING_MODEL",
            Self::EmbeddingLocalUrl => "AKASHI_EMBEDDING_LOCAL_URL",
            Self::EmbeddingLocalModel => "AKASHI_EMBEDDING_LOCAL_MODEL",
            Self::ConflictValidator => "AKASHI_CONFLICT_VALIDATOR",
            Self::ConflictModel => "AKASHI_CONFLICT_MODEL",
            Self::ConflictLlmThreads => "AKASHI_CONFLICT_LLM_THREADS",
            Self::ConflictThreshold => "AKASHI_CONFLICT_THRESHOLD",
            Self::ConflictDecayLambdaDays => "AKASHI_CONFLICT_DECAY_LAMBDA_DAYS",
            Self::ConflictBackfillWorkers => "AKASHI_CONFLICT_BACKFILL_WORKERS",
            Self::ConflictCandidateLimit => "AKASHI_CONFLICT_CANDIDATE_LIMIT",
            Self::ForceConflictRescore => "AKASHI_FORCE_CONFLICT_RESCORE",
            Self::ConflictLocalTimeoutMs => "AKASHI_CONFLICT_LOCAL_TIMEOUT_MS",
            Self::ConflictExternalTimeoutMs => "AKASHI_CONFLICT_EXTERNAL_TIMEOUT_MS",
            Self::OutboxPollIntervalMs => "AKASHI_OUTBOX_POLL_INTERVAL_MS",
            Self::OutboxBatchSize => "AKASHI_OUTBOX_BATCH_SIZE",
            Self::OutboxMaxAttempts => "AKASHI_OUTBOX_MAX_ATTEMPTS",
            Self::OutboxLeaseMs => "AKASHI_OUTBOX_LEASE_MS",
            Self::ShutdownHttpDrainMs => "AKASHI_SHUTDOWN_HTTP_DRAIN_MS",
            Self::ShutdownBufferDrainMs => "AKASHI_SHUTDOWN_BUFFER_DRAIN_MS",
            Self::ShutdownOutboxDrainMs => "AKASHI_SHUTDOWN_OUTBOX_DRAIN_MS",
            Self::IntegrityIntervalMs => "AKASHI_INTEGRITY_INTERVAL_MS",
            Self::ConflictRefreshIntervalMs => "AKASHI_CONFLICT_REFRESH_INTERVAL_MS",
            Self::IdempotencyCleanupIntervalMs => "AKASHI_IDEMPOTENCY_CLEANUP_INTERVAL_MS",
            Self::IdempotencyCompletedTtlMs => "AKASHI_IDEMPOTENCY_COMPLETED_TTL_MS",
            Self::IdempotencyAbandonedTtlMs => "AKASHI_IDEMPOTENCY_ABANDONED_TTL_MS",
            Self::MaxOutcomeBytes => "AKASHI_MAX_OUTCOME_BYTES",
            Self::AdminApiKey => "AKASHI_ADMIN_API_KEY",
            Self::Production => "AKASHI_PRODUCTION",
        }
    }
}

// ============================================================================
// SECTION: Strict Reads
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error message when the variable contains invalid UTF-8.
pub fn read_env_strict(key: ConfigEnv) -> Result<Option<String>, String> {
    std::env::var_os(key.as_str()).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{} must be valid UTF-8", key.as_str()))
    })
}

/// Reads a boolean flag; `1` and `true` (any case) are truthy.
///
/// # Errors
///
/// Returns an error message when the variable contains invalid UTF-8.
pub fn read_env_flag(key: ConfigEnv) -> Result<Option<bool>, String> {
    Ok(read_env_strict(key)?
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true")))
}

/// Reads and parses a numeric environment variable.
///
/// # Errors
///
/// Returns an error message on invalid UTF-8 or an unparseable value.
pub fn read_env_parsed<T: std::str::FromStr>(key: ConfigEnv) -> Result<Option<T>, String> {
    match read_env_strict(key)? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{} has an unparseable value", key.as_str())),
    }
}
