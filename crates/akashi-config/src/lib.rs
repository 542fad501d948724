// crates/akashi-config/src/lib.rs
// ============================================================================
// Module: Akashi Configuration
// Description: Typed, validated configuration for every Akashi subsystem.
// Purpose: Load environment-backed settings with defaults and fail-closed checks.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Configuration is one typed struct per subsystem plus the aggregate
//! [`AkashiConfig`]. Every option has a default expressed as a `default_*`
//! function; environment loading reads `AKASHI_*` variables with strict
//! UTF-8 enforcement; `validate` rejects out-of-range values before any
//! component starts. Secrets (database URLs, API keys) are required in
//! production mode and are never logged.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod env;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::env::ConfigEnv;
use crate::env::read_env_flag;
use crate::env::read_env_parsed;
use crate::env::read_env_strict;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
///
/// # Invariants
/// - Messages name the offending option, never its secret value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable failed strict reading or parsing.
    #[error("environment error: {0}")]
    Env(String),
    /// A value is outside its permitted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A secret required in production mode is missing.
    #[error("missing required secret: {0}")]
    MissingSecret(&'static str),
}

// ============================================================================
// SECTION: Database
// ============================================================================

/// PostgreSQL connection configuration.
///
/// # Invariants
/// - `url` is required; `direct_url` falls back to `url` when unset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Pooled connection URL.
    pub url: String,
    /// Direct (non-pooled) URL used by the LISTEN connection.
    #[serde(default)]
    pub direct_url: Option<String>,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Returns the default pool size.
const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/akashi".to_string(),
            direct_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Returns the URL the LISTEN connection should dial.
    #[must_use]
    pub fn listen_url(&self) -> &str {
        self.direct_url.as_deref().unwrap_or(&self.url)
    }
}

// ============================================================================
// SECTION: Event WAL
// ============================================================================

/// WAL sync mode.
///
/// # Invariants
/// - Labels are stable: `always`, `interval`, `never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalSyncMode {
    /// Fsync after every append.
    #[default]
    Always,
    /// Fsync on a timer.
    Interval,
    /// Never fsync; rely on the OS.
    Never,
}

impl WalSyncMode {
    /// Parses a stable label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "always" => Some(Self::Always),
            "interval" => Some(Self::Interval),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

/// Event write-ahead log configuration.
///
/// # Invariants
/// - `sync_interval_ms` must be positive when `sync` is
///   [`WalSyncMode::Interval`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WalConfig {
    /// Enables the on-disk WAL; disabled loses buffered events on crash.
    #[serde(default = "default_wal_enabled")]
    pub enabled: bool,
    /// Directory holding WAL segments.
    #[serde(default = "default_wal_dir")]
    pub dir: PathBuf,
    /// Sync mode.
    #[serde(default)]
    pub sync: WalSyncMode,
    /// Sync interval in milliseconds for interval mode.
    #[serde(default = "default_wal_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// Segment rotation size in bytes.
    #[serde(default = "default_wal_segment_max_bytes")]
    pub segment_max_bytes: u64,
    /// Segment rotation record count.
    #[serde(default = "default_wal_segment_max_records")]
    pub segment_max_records: u64,
}

/// Returns the default WAL enable flag.
const fn default_wal_enabled() -> bool {
    true
}

/// Returns the default WAL directory.
fn default_wal_dir() -> PathBuf {
    PathBuf::from("./data/wal")
}

/// Returns the default WAL sync interval.
const fn default_wal_sync_interval_ms() -> u64 {
    200
}

/// Returns the default WAL segment rotation size.
const fn default_wal_segment_max_bytes() -> u64 {
    16 * 1024 * 1024
}

/// Returns the default WAL segment record cap.
const fn default_wal_segment_max_records() -> u64 {
    100_000
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            enabled: default_wal_enabled(),
            dir: default_wal_dir(),
            sync: WalSyncMode::default(),
            sync_interval_ms: default_wal_sync_interval_ms(),
            segment_max_bytes: default_wal_segment_max_bytes(),
            segment_max_records: default_wal_segment_max_records(),
        }
    }
}

// ============================================================================
// SECTION: Event Buffer
// ============================================================================

/// In-memory event buffer configuration.
///
/// # Invariants
/// - All values must be positive; producers block when `capacity` is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BufferConfig {
    /// Bounded queue capacity.
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
    /// Flush when this many events are queued.
    #[serde(default = "default_flush_max_events")]
    pub flush_max_events: usize,
    /// Flush when the oldest queued event reaches this age.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

/// Returns the default buffer capacity.
const fn default_buffer_capacity() -> usize {
    8_192
}

/// Returns the default flush batch size.
const fn default_flush_max_events() -> usize {
    500
}

/// Returns the default flush interval.
const fn default_flush_interval_ms() -> u64 {
    1_000
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
            flush_max_events: default_flush_max_events(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

// ============================================================================
// SECTION: Vector Index
// ============================================================================

/// External vector index configuration.
///
/// # Invariants
/// - `url = None` disables the index; callers use the text fallback.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexConfig {
    /// Index base URL; `None` disables the index.
    #[serde(default)]
    pub url: Option<String>,
    /// API key sent with each request.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Collection name.
    #[serde(default = "default_index_collection")]
    pub collection: String,
    /// Embedding dimensionality.
    #[serde(default = "default_index_dimensions")]
    pub dimensions: usize,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_index_timeout_ms")]
    pub timeout_ms: u64,
}

/// Returns the default collection name.
fn default_index_collection() -> String {
    "akashi_decisions".to_string()
}

/// Returns the default embedding dimensionality.
const fn default_index_dimensions() -> usize {
    1_536
}

/// Returns the default index request timeout.
const fn default_index_timeout_ms() -> u64 {
    5_000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            collection: default_index_collection(),
            dimensions: default_index_dimensions(),
            timeout_ms: default_index_timeout_ms(),
        }
    }
}

// ============================================================================
// SECTION: Embedding Provider
// ============================================================================

/// Embedding provider selector.
///
/// # Invariants
/// - `auto` prefers external when an API key is present, then local, then noop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Choose automatically from configured credentials.
    #[default]
    Auto,
    /// External OpenAI-compatible embeddings API.
    External,
    /// Local Ollama-compatible endpoint.
    Local,
    /// Deterministic no-op embeddings.
    Noop,
}

impl EmbeddingProviderKind {
    /// Parses a stable label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "auto" => Some(Self::Auto),
            "external" => Some(Self::External),
            "local" => Some(Self::Local),
            "noop" => Some(Self::Noop),
            _ => None,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider selector.
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// External API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// External API base URL.
    #[serde(default = "default_embedding_api_url")]
    pub api_url: String,
    /// External embedding model.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Local endpoint URL.
    #[serde(default = "default_embedding_local_url")]
    pub local_url: String,
    /// Local embedding model.
    #[serde(default = "default_embedding_local_model")]
    pub local_model: String,
    /// Target dimensionality; must match the index configuration.
    #[serde(default = "default_index_dimensions")]
    pub dimensions: usize,
}

/// Returns the default external embedding API base URL.
fn default_embedding_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Returns the default external embedding model.
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Returns the default local embedding endpoint.
fn default_embedding_local_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

/// Returns the default local embedding model.
fn default_embedding_local_model() -> String {
    "nomic-embed-text".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            api_key: None,
            api_url: default_embedding_api_url(),
            model: default_embedding_model(),
            local_url: default_embedding_local_url(),
            local_model: default_embedding_local_model(),
            dimensions: default_index_dimensions(),
        }
    }
}

// ============================================================================
// SECTION: Conflict Scoring
// ============================================================================

/// Conflict validator selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    /// Choose automatically from configured credentials.
    #[default]
    Auto,
    /// External chat-completion API.
    External,
    /// Local chat model.
    Local,
    /// No validator; embedding scores stand alone.
    Noop,
}

impl ValidatorKind {
    /// Parses a stable label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "auto" => Some(Self::Auto),
            "external" => Some(Self::External),
            "local" => Some(Self::Local),
            "noop" => Some(Self::Noop),
            _ => None,
        }
    }
}

/// Conflict scorer configuration.
///
/// # Invariants
/// - `significance_threshold` lies in `[0, 1]`; `decay_lambda_days` is positive.
/// - The local validator class caps backfill workers at one regardless of
///   `backfill_workers`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConflictConfig {
    /// Validator selector.
    #[serde(default)]
    pub validator: ValidatorKind,
    /// Chat model used for classification.
    #[serde(default = "default_conflict_model")]
    pub model: String,
    /// Concurrent validator calls for the external class.
    #[serde(default = "default_llm_threads")]
    pub llm_threads: usize,
    /// Significance threshold below which pairs are skipped.
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,
    /// Temporal decay lambda in days.
    #[serde(default = "default_decay_lambda_days")]
    pub decay_lambda_days: f64,
    /// Backfill worker count.
    #[serde(default = "default_backfill_workers")]
    pub backfill_workers: usize,
    /// Candidate limit per scoring pass.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: u32,
    /// Clears scored conflicts and rescores everything at startup.
    #[serde(default)]
    pub force_rescore: bool,
    /// Per-call timeout for the local validator, sized to absorb cold start.
    #[serde(default = "default_local_timeout_ms")]
    pub local_timeout_ms: u64,
    /// Per-call timeout for the external validator.
    #[serde(default = "default_external_timeout_ms")]
    pub external_timeout_ms: u64,
}

/// Returns the default validator chat model.
fn default_conflict_model() -> String {
    "qwen2.5:7b".to_string()
}

/// Returns the default external validator thread cap.
const fn default_llm_threads() -> usize {
    4
}

/// Returns the default significance threshold.
const fn default_significance_threshold() -> f64 {
    0.30
}

/// Returns the default decay lambda in days.
const fn default_decay_lambda_days() -> f64 {
    30.0
}

/// Returns the default backfill worker count.
const fn default_backfill_workers() -> usize {
    2
}

/// Returns the default candidate limit.
const fn default_candidate_limit() -> u32 {
    50
}

/// Returns the default local validator timeout.
const fn default_local_timeout_ms() -> u64 {
    120_000
}

/// Returns the default external validator timeout.
const fn default_external_timeout_ms() -> u64 {
    30_000
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorKind::default(),
            model: default_conflict_model(),
            llm_threads: default_llm_threads(),
            significance_threshold: default_significance_threshold(),
            decay_lambda_days: default_decay_lambda_days(),
            backfill_workers: default_backfill_workers(),
            candidate_limit: default_candidate_limit(),
            force_rescore: false,
            local_timeout_ms: default_local_timeout_ms(),
            external_timeout_ms: default_external_timeout_ms(),
        }
    }
}

// ============================================================================
// SECTION: Outbox
// ============================================================================

/// Search outbox worker configuration.
///
/// # Invariants
/// - All values must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OutboxConfig {
    /// Poll interval in milliseconds.
    #[serde(default = "default_outbox_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Rows leased per poll.
    #[serde(default = "default_outbox_batch_size")]
    pub batch_size: u32,
    /// Delivery attempts before dead-lettering.
    #[serde(default = "default_outbox_max_attempts")]
    pub max_attempts: i32,
    /// Lease duration in milliseconds.
    #[serde(default = "default_outbox_lease_ms")]
    pub lease_ms: u64,
}

/// Returns the default outbox poll interval.
const fn default_outbox_poll_interval_ms() -> u64 {
    2_000
}

/// Returns the default outbox batch size.
const fn default_outbox_batch_size() -> u32 {
    50
}

/// Returns the default outbox attempt cap.
const fn default_outbox_max_attempts() -> i32 {
    8
}

/// Returns the default outbox lease duration.
const fn default_outbox_lease_ms() -> u64 {
    30_000
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_outbox_poll_interval_ms(),
            batch_size: default_outbox_batch_size(),
            max_attempts: default_outbox_max_attempts(),
            lease_ms: default_outbox_lease_ms(),
        }
    }
}

// ============================================================================
// SECTION: Shutdown and Background Intervals
// ============================================================================

/// Three-phase shutdown budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ShutdownConfig {
    /// Budget for in-flight request completion.
    #[serde(default = "default_http_drain_ms")]
    pub http_drain_ms: u64,
    /// Budget for the event buffer drain; exceeding it is a hard error.
    #[serde(default = "default_buffer_drain_ms")]
    pub buffer_drain_ms: u64,
    /// Budget for the best-effort outbox drain.
    #[serde(default = "default_outbox_drain_ms")]
    pub outbox_drain_ms: u64,
}

/// Returns the default HTTP drain budget.
const fn default_http_drain_ms() -> u64 {
    10_000
}

/// Returns the default buffer drain budget.
const fn default_buffer_drain_ms() -> u64 {
    15_000
}

/// Returns the default outbox drain budget.
const fn default_outbox_drain_ms() -> u64 {
    5_000
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            http_drain_ms: default_http_drain_ms(),
            buffer_drain_ms: default_buffer_drain_ms(),
            outbox_drain_ms: default_outbox_drain_ms(),
        }
    }
}

/// Background loop intervals and idempotency TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IntervalConfig {
    /// Integrity proof interval.
    #[serde(default = "default_integrity_interval_ms")]
    pub integrity_interval_ms: u64,
    /// Conflict refresh tick interval.
    #[serde(default = "default_conflict_refresh_interval_ms")]
    pub conflict_refresh_interval_ms: u64,
    /// Idempotency cleanup interval.
    #[serde(default = "default_idempotency_cleanup_interval_ms")]
    pub idempotency_cleanup_interval_ms: u64,
    /// TTL for completed idempotency keys.
    #[serde(default = "default_idempotency_completed_ttl_ms")]
    pub idempotency_completed_ttl_ms: u64,
    /// TTL for abandoned idempotency keys.
    #[serde(default = "default_idempotency_abandoned_ttl_ms")]
    pub idempotency_abandoned_ttl_ms: u64,
}

/// Returns the default integrity proof interval.
const fn default_integrity_interval_ms() -> u64 {
    3_600_000
}

/// Returns the default conflict refresh interval.
const fn default_conflict_refresh_interval_ms() -> u64 {
    60_000
}

/// Returns the default idempotency cleanup interval.
const fn default_idempotency_cleanup_interval_ms() -> u64 {
    600_000
}

/// Returns the default completed-key TTL.
const fn default_idempotency_completed_ttl_ms() -> u64 {
    86_400_000
}

/// Returns the default abandoned-key TTL.
const fn default_idempotency_abandoned_ttl_ms() -> u64 {
    3_600_000
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            integrity_interval_ms: default_integrity_interval_ms(),
            conflict_refresh_interval_ms: default_conflict_refresh_interval_ms(),
            idempotency_cleanup_interval_ms: default_idempotency_cleanup_interval_ms(),
            idempotency_completed_ttl_ms: default_idempotency_completed_ttl_ms(),
            idempotency_abandoned_ttl_ms: default_idempotency_abandoned_ttl_ms(),
        }
    }
}

// ============================================================================
// SECTION: Aggregate Config
// ============================================================================

/// Aggregate configuration for the Akashi process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AkashiConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Event WAL configuration.
    #[serde(default)]
    pub wal: WalConfig,
    /// Event buffer configuration.
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Vector index configuration.
    #[serde(default)]
    pub index: IndexConfig,
    /// Embedding provider configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Conflict scorer configuration.
    #[serde(default)]
    pub conflict: ConflictConfig,
    /// Outbox worker configuration.
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Shutdown budgets.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Background loop intervals.
    #[serde(default)]
    pub intervals: IntervalConfig,
    /// Maximum accepted outcome size in bytes.
    #[serde(default = "default_max_outcome_bytes")]
    pub max_outcome_bytes: usize,
    /// Bootstrap admin API key for the agent seed.
    #[serde(default)]
    pub admin_api_key: Option<String>,
    /// Production mode; secrets become required.
    #[serde(default)]
    pub production: bool,
}

/// Returns the default maximum outcome size.
const fn default_max_outcome_bytes() -> usize {
    64 * 1024
}

impl Default for AkashiConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            wal: WalConfig::default(),
            buffer: BufferConfig::default(),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            conflict: ConflictConfig::default(),
            outbox: OutboxConfig::default(),
            shutdown: ShutdownConfig::default(),
            intervals: IntervalConfig::default(),
            max_outcome_bytes: default_max_outcome_bytes(),
            admin_api_key: None,
            production: false,
        }
    }
}

impl AkashiConfig {
    /// Loads configuration from `AKASHI_*` environment variables over the
    /// defaults, then validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on invalid UTF-8, unparseable values, or
    /// failed validation.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = read_env(ConfigEnv::DatabaseUrl)? {
            config.database.url = url;
        }
        config.database.direct_url = read_env(ConfigEnv::DatabaseDirectUrl)?;
        if let Some(value) = parse_env::<u32>(ConfigEnv::DatabaseMaxConnections)? {
            config.database.max_connections = value;
        }

        if let Some(value) = flag_env(ConfigEnv::WalEnabled)? {
            config.wal.enabled = value;
        }
        if let Some(dir) = read_env(ConfigEnv::WalDir)? {
            config.wal.dir = PathBuf::from(dir);
        }
        if let Some(label) = read_env(ConfigEnv::WalSyncMode)? {
            config.wal.sync = WalSyncMode::parse(&label).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown WAL sync mode: {label}"))
            })?;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::WalSyncIntervalMs)? {
            config.wal.sync_interval_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::WalSegmentMaxBytes)? {
            config.wal.segment_max_bytes = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::WalSegmentMaxRecords)? {
            config.wal.segment_max_records = value;
        }

        if let Some(value) = parse_env::<usize>(ConfigEnv::BufferCapacity)? {
            config.buffer.capacity = value;
        }
        if let Some(value) = parse_env::<usize>(ConfigEnv::BufferFlushMaxEvents)? {
            config.buffer.flush_max_events = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::BufferFlushIntervalMs)? {
            config.buffer.flush_interval_ms = value;
        }

        config.index.url = read_env(ConfigEnv::IndexUrl)?;
        config.index.api_key = read_env(ConfigEnv::IndexApiKey)?;
        if let Some(value) = read_env(ConfigEnv::IndexCollection)? {
            config.index.collection = value;
        }
        if let Some(value) = parse_env::<usize>(ConfigEnv::IndexDimensions)? {
            config.index.dimensions = value;
            config.embedding.dimensions = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::IndexTimeoutMs)? {
            config.index.timeout_ms = value;
        }

        if let Some(label) = read_env(ConfigEnv::EmbeddingProvider)? {
            config.embedding.provider = EmbeddingProviderKind::parse(&label).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown embedding provider: {label}"))
            })?;
        }
        config.embedding.api_key = read_env(ConfigEnv::EmbeddingApiKey)?;
        if let Some(value) = read_env(ConfigEnv::EmbeddingApiUrl)? {
            config.embedding.api_url = value;
        }
        if let Some(value) = read_env(ConfigEnv::EmbeddingModel)? {
            config.embedding.model = value;
        }
        if let Some(value) = read_env(ConfigEnv::EmbeddingLocalUrl)? {
            config.embedding.local_url = value;
        }
        if let Some(value) = read_env(ConfigEnv::EmbeddingLocalModel)? {
            config.embedding.local_model = value;
        }

        if let Some(label) = read_env(ConfigEnv::ConflictValidator)? {
            config.conflict.validator = ValidatorKind::parse(&label).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown conflict validator: {label}"))
            })?;
        }
        if let Some(value) = read_env(ConfigEnv::ConflictModel)? {
            config.conflict.model = value;
        }
        if let Some(value) = parse_env::<usize>(ConfigEnv::ConflictLlmThreads)? {
            config.conflict.llm_threads = value;
        }
        if let Some(value) = parse_env::<f64>(ConfigEnv::ConflictThreshold)? {
            config.conflict.significance_threshold = value;
        }
        if let Some(value) = parse_env::<f64>(ConfigEnv::ConflictDecayLambdaDays)? {
            config.conflict.decay_lambda_days = value;
        }
        if let Some(value) = parse_env::<usize>(ConfigEnv::ConflictBackfillWorkers)? {
            config.conflict.backfill_workers = value;
        }
        if let Some(value) = parse_env::<u32>(ConfigEnv::ConflictCandidateLimit)? {
            config.conflict.candidate_limit = value;
        }
        if let Some(value) = flag_env(ConfigEnv::ForceConflictRescore)? {
            config.conflict.force_rescore = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::ConflictLocalTimeoutMs)? {
            config.conflict.local_timeout_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::ConflictExternalTimeoutMs)? {
            config.conflict.external_timeout_ms = value;
        }

        if let Some(value) = parse_env::<u64>(ConfigEnv::OutboxPollIntervalMs)? {
            config.outbox.poll_interval_ms = value;
        }
        if let Some(value) = parse_env::<u32>(ConfigEnv::OutboxBatchSize)? {
            config.outbox.batch_size = value;
        }
        if let Some(value) = parse_env::<i32>(ConfigEnv::OutboxMaxAttempts)? {
            config.outbox.max_attempts = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::OutboxLeaseMs)? {
            config.outbox.lease_ms = value;
        }

        if let Some(value) = parse_env::<u64>(ConfigEnv::ShutdownHttpDrainMs)? {
            config.shutdown.http_drain_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::ShutdownBufferDrainMs)? {
            config.shutdown.buffer_drain_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::ShutdownOutboxDrainMs)? {
            config.shutdown.outbox_drain_ms = value;
        }

        if let Some(value) = parse_env::<u64>(ConfigEnv::IntegrityIntervalMs)? {
            config.intervals.integrity_interval_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::ConflictRefreshIntervalMs)? {
            config.intervals.conflict_refresh_interval_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::IdempotencyCleanupIntervalMs)? {
            config.intervals.idempotency_cleanup_interval_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::IdempotencyCompletedTtlMs)? {
            config.intervals.idempotency_completed_ttl_ms = value;
        }
        if let Some(value) = parse_env::<u64>(ConfigEnv::IdempotencyAbandonedTtlMs)? {
            config.intervals.idempotency_abandoned_ttl_ms = value;
        }

        if let Some(value) = parse_env::<usize>(ConfigEnv::MaxOutcomeBytes)? {
            config.max_outcome_bytes = value;
        }
        config.admin_api_key = read_env(ConfigEnv::AdminApiKey)?;
        if let Some(value) = flag_env(ConfigEnv::Production)? {
            config.production = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, fail-closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for out-of-range values or missing
    /// production secrets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database max_connections must be greater than zero".to_string(),
            ));
        }
        if self.wal.sync == WalSyncMode::Interval && self.wal.sync_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "wal sync_interval_ms must be greater than zero in interval mode".to_string(),
            ));
        }
        if self.wal.segment_max_bytes == 0 || self.wal.segment_max_records == 0 {
            return Err(ConfigError::Invalid(
                "wal segment limits must be greater than zero".to_string(),
            ));
        }
        if self.buffer.capacity == 0
            || self.buffer.flush_max_events == 0
            || self.buffer.flush_interval_ms == 0
        {
            return Err(ConfigError::Invalid(
                "buffer capacity, flush_max_events, and flush_interval_ms must be greater than zero"
                    .to_string(),
            ));
        }
        if self.buffer.flush_max_events > self.buffer.capacity {
            return Err(ConfigError::Invalid(
                "buffer flush_max_events must not exceed capacity".to_string(),
            ));
        }
        if self.index.dimensions == 0 || self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        if self.index.dimensions != self.embedding.dimensions {
            return Err(ConfigError::Invalid(
                "index and embedding dimensions must match".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.conflict.significance_threshold) {
            return Err(ConfigError::Invalid(
                "conflict significance_threshold must lie in [0, 1]".to_string(),
            ));
        }
        if self.conflict.decay_lambda_days <= 0.0 {
            return Err(ConfigError::Invalid(
                "conflict decay_lambda_days must be positive".to_string(),
            ));
        }
        if self.conflict.llm_threads == 0 || self.conflict.backfill_workers == 0 {
            return Err(ConfigError::Invalid(
                "conflict llm_threads and backfill_workers must be greater than zero".to_string(),
            ));
        }
        if self.conflict.candidate_limit == 0 {
            return Err(ConfigError::Invalid(
                "conflict candidate_limit must be greater than zero".to_string(),
            ));
        }
        if self.outbox.poll_interval_ms == 0
            || self.outbox.batch_size == 0
            || self.outbox.max_attempts <= 0
            || self.outbox.lease_ms == 0
        {
            return Err(ConfigError::Invalid(
                "outbox intervals, batch size, attempts, and lease must be positive".to_string(),
            ));
        }
        if self.max_outcome_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_outcome_bytes must be greater than zero".to_string(),
            ));
        }
        if self.production {
            if self.database.url.trim().is_empty() {
                return Err(ConfigError::MissingSecret("AKASHI_DATABASE_URL"));
            }
            if self.index.url.is_some() && self.index.api_key.is_none() {
                return Err(ConfigError::MissingSecret("AKASHI_VECTOR_INDEX_API_KEY"));
            }
            if self.embedding.provider == EmbeddingProviderKind::External
                && self.embedding.api_key.is_none()
            {
                return Err(ConfigError::MissingSecret("AKASHI_EMBEDDING_API_KEY"));
            }
        }
        Ok(())
    }

    /// Returns the buffer flush interval as a [`Duration`].
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.buffer.flush_interval_ms)
    }

    /// Returns the outbox poll interval as a [`Duration`].
    #[must_use]
    pub const fn outbox_poll_interval(&self) -> Duration {
        Duration::from_millis(self.outbox.poll_interval_ms)
    }
}

// ============================================================================
// SECTION: Env Read Helpers
// ============================================================================

/// Reads a string option from the environment.
fn read_env(key: ConfigEnv) -> Result<Option<String>, ConfigError> {
    read_env_strict(key).map_err(ConfigError::Env)
}

/// Reads a boolean flag from the environment.
fn flag_env(key: ConfigEnv) -> Result<Option<bool>, ConfigError> {
    read_env_flag(key).map_err(ConfigError::Env)
}

/// Reads a parsed value from the environment.
fn parse_env<T: std::str::FromStr>(key: ConfigEnv) -> Result<Option<T>, ConfigError> {
    read_env_parsed(key).map_err(ConfigError::Env)
}
