// crates/akashi-config/tests/validation.rs
// ============================================================================
// Module: Configuration Validation Tests
// Description: Verifies defaults pass and out-of-range values fail closed.
// ============================================================================
//! ## Overview
//! Ensures default configuration validates, boundary violations produce the
//! invalid-configuration error, and production mode demands its secrets.

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

use akashi_config::AkashiConfig;
use akashi_config::ConfigError;
use akashi_config::EmbeddingProviderKind;
use akashi_config::WalSyncMode;

#[test]
fn defaults_validate() {
    assert!(AkashiConfig::default().validate().is_ok());
}

#[test]
fn zero_buffer_capacity_fails() {
    let mut config = AkashiConfig::default();
    config.buffer.capacity = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn flush_batch_larger_than_capacity_fails() {
    let mut config = AkashiConfig::default();
    config.buffer.capacity = 10;
    config.buffer.flush_max_events = 20;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn interval_sync_requires_interval() {
    let mut config = AkashiConfig::default();
    config.wal.sync = WalSyncMode::Interval;
    config.wal.sync_interval_ms = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn threshold_outside_unit_interval_fails() {
    let mut config = AkashiConfig::default();
    config.conflict.significance_threshold = 1.5;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn mismatched_dimensions_fail() {
    let mut config = AkashiConfig::default();
    config.index.dimensions = 768;
    config.embedding.dimensions = 1536;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn production_requires_external_embedding_key() {
    let mut config = AkashiConfig::default();
    config.production = true;
    config.embedding.provider = EmbeddingProviderKind::External;
    config.embedding.api_key = None;
    assert!(matches!(config.validate(), Err(ConfigError::MissingSecret(_))));
    config.embedding.api_key = Some("sk-test".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn production_requires_index_key_when_index_configured() {
    let mut config = AkashiConfig::default();
    config.production = true;
    config.index.url = Some("http://127.0.0.1:6333".to_string());
    assert!(matches!(config.validate(), Err(ConfigError::MissingSecret(_))));
}

#[test]
fn sync_mode_labels_parse() {
    assert_eq!(WalSyncMode::parse("always"), Some(WalSyncMode::Always));
    assert_eq!(WalSyncMode::parse("interval"), Some(WalSyncMode::Interval));
    assert_eq!(WalSyncMode::parse("never"), Some(WalSyncMode::Never));
    assert_eq!(WalSyncMode::parse("sometimes"), None);
}
