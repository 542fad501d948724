// crates/akashi-providers/src/lib.rs
// ============================================================================
// Module: Akashi Providers Library
// Description: Embedding providers and conflict validators with selection.
// Purpose: Supply the engine's pluggable enrichment backends.
// Dependencies: akashi-config, akashi-core, reqwest, serde_json, sha2, tokio
// ============================================================================

//! ## Overview
//! Providers are tagged variants selected at startup from configuration:
//! embeddings come from an external OpenAI-compatible API, a local
//! Ollama-compatible endpoint, or the deterministic no-op provider;
//! relationship classification comes from an external chat API, a local
//! chat model, or the accepting no-op validator. `auto` selection prefers
//! the external backend when an API key is configured and falls back to
//! the local endpoint otherwise.
//! Invariants:
//! - Responses parse fail-closed; malformed output never becomes data.
//! - The local chat validator serializes calls.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod embedding;
pub mod validator;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use akashi_config::ConflictConfig;
use akashi_config::EmbeddingConfig;
use akashi_config::EmbeddingProviderKind;
use akashi_config::ValidatorKind;
use akashi_core::ConflictValidator;
use akashi_core::EmbeddingError;
use akashi_core::EmbeddingProvider;
use akashi_core::ValidatorError;

use crate::embedding::ExternalEmbeddings;
use crate::embedding::ExternalEmbeddingsOptions;
use crate::embedding::LocalEmbeddings;
use crate::embedding::LocalEmbeddingsOptions;
use crate::embedding::NoopEmbeddings;
use crate::validator::ExternalChatOptions;
use crate::validator::ExternalChatValidator;
use crate::validator::LocalChatOptions;
use crate::validator::LocalChatValidator;
use crate::validator::NoopValidator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::embedding::ExternalEmbeddings as ExternalEmbeddingProvider;
pub use crate::embedding::NoopEmbeddings as NoopEmbeddingProvider;
pub use crate::validator::build_prompt;
pub use crate::validator::normalize_relationship;
pub use crate::validator::parse_verdict;

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Default timeout for external embedding calls.
const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the embedding provider selected by configuration.
///
/// # Errors
///
/// Returns [`EmbeddingError`] when the selected backend cannot be built or
/// `external` is selected without an API key.
pub fn select_embedding_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let resolved = match config.provider {
        EmbeddingProviderKind::Auto => {
            if config.api_key.is_some() {
                EmbeddingProviderKind::External
            } else {
                EmbeddingProviderKind::Local
            }
        }
        explicit => explicit,
    };
    match resolved {
        EmbeddingProviderKind::External => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                EmbeddingError::Request("external embeddings need an API key".to_string())
            })?;
            let provider = ExternalEmbeddings::new(ExternalEmbeddingsOptions {
                api_url: config.api_url.clone(),
                api_key,
                model: config.model.clone(),
                dimensions: config.dimensions,
                timeout: EMBEDDING_TIMEOUT,
            })?;
            tracing::info!(provider = "external", model = %config.model, "embedding provider selected");
            Ok(Arc::new(provider))
        }
        EmbeddingProviderKind::Local => {
            let provider = LocalEmbeddings::new(LocalEmbeddingsOptions {
                url: config.local_url.clone(),
                model: config.local_model.clone(),
                dimensions: config.dimensions,
                timeout: EMBEDDING_TIMEOUT,
            })?;
            tracing::info!(provider = "local", model = %config.local_model, "embedding provider selected");
            Ok(Arc::new(provider))
        }
        EmbeddingProviderKind::Noop | EmbeddingProviderKind::Auto => {
            tracing::info!(provider = "noop", "embedding provider selected");
            Ok(Arc::new(NoopEmbeddings::new(config.dimensions)))
        }
    }
}

/// Builds the conflict validator selected by configuration.
///
/// The external class reuses the embedding API key; `auto` picks external
/// when that key exists, otherwise the local chat model.
///
/// # Errors
///
/// Returns [`ValidatorError`] when the selected backend cannot be built or
/// `external` is selected without an API key.
pub fn select_validator(
    conflict: &ConflictConfig,
    embedding: &EmbeddingConfig,
) -> Result<Arc<dyn ConflictValidator>, ValidatorError> {
    let resolved = match conflict.validator {
        ValidatorKind::Auto => {
            if embedding.api_key.is_some() {
                ValidatorKind::External
            } else {
                ValidatorKind::Local
            }
        }
        explicit => explicit,
    };
    match resolved {
        ValidatorKind::External => {
            let api_key = embedding.api_key.clone().ok_or_else(|| {
                ValidatorError::Request("external validator needs an API key".to_string())
            })?;
            let validator = ExternalChatValidator::new(ExternalChatOptions {
                api_url: embedding.api_url.clone(),
                api_key,
                model: conflict.model.clone(),
                parallelism: conflict.llm_threads,
                timeout: Duration::from_millis(conflict.external_timeout_ms),
            })?;
            tracing::info!(validator = "external", model = %conflict.model, "conflict validator selected");
            Ok(Arc::new(validator))
        }
        ValidatorKind::Local => {
            let validator = Arc::new(LocalChatValidator::new(LocalChatOptions {
                url: embedding.local_url.clone(),
                model: conflict.model.clone(),
                timeout: Duration::from_millis(conflict.local_timeout_ms),
            })?);
            // Absorb the model cold start before the first real pair.
            let warm = Arc::clone(&validator);
            tokio::spawn(async move {
                warm.prewarm().await;
            });
            tracing::info!(validator = "local", model = %conflict.model, "conflict validator selected");
            Ok(validator)
        }
        ValidatorKind::Noop | ValidatorKind::Auto => {
            tracing::info!(validator = "noop", "conflict validator selected");
            Ok(Arc::new(NoopValidator))
        }
    }
}
