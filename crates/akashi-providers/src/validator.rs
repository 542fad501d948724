// crates/akashi-providers/src/validator.rs
// ============================================================================
// Module: Conflict Validators
// Description: LLM-backed relationship classifiers for candidate pairs.
// Purpose: Turn raw chat-model output into stable relationship verdicts.
// Dependencies: akashi-core, reqwest, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! Validators classify a candidate pair into contradiction, supersession,
//! complementary, refinement, or unrelated. Two backends exist: a local
//! chat model (single-threaded, generous per-call timeout sized to absorb
//! cold starts, `keep_alive` hint) and an external chat API (bounded
//! parallelism, tighter timeout). Both share the prompt builder and the
//! fail-closed verdict parser, which strips markdown fences and normalizes
//! truncated labels; anything unparseable is reported as an invalid
//! response and treated by the scorer as a rejection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use akashi_core::ConflictRelationship;
use akashi_core::ConflictValidator;
use akashi_core::ValidationInput;
use akashi_core::ValidationVerdict;
use akashi_core::ValidatorClass;
use akashi_core::ValidatorError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;

// ============================================================================
// SECTION: Prompting
// ============================================================================

/// System instruction shared by both chat backends.
const SYSTEM_PROMPT: &str = "You compare two recorded agent decisions and classify their \
relationship. Respond with a single JSON object: {\"relationship\": one of \
[\"contradiction\", \"supersession\", \"complementary\", \"refinement\", \"unrelated\"], \
\"category\": short label, \"severity\": one of [\"low\", \"medium\", \"high\"], \
\"explanation\": one sentence}. No other text.";

/// Builds the user prompt for one candidate pair.
#[must_use]
pub fn build_prompt(input: &ValidationInput) -> String {
    let mut prompt = format!(
        "Decision A (agent {agent_a}):\noutcome: {outcome_a}\nreasoning: {reasoning_a}\n\n\
         Decision B (agent {agent_b}):\noutcome: {outcome_b}\nreasoning: {reasoning_b}\n\n\
         Days between decisions: {delta:.1}\nSame session: {same_session}\n",
        agent_a = input.agent_a,
        outcome_a = input.outcome_a,
        reasoning_a = input.reasoning_a,
        agent_b = input.agent_b,
        outcome_b = input.outcome_b,
        reasoning_b = input.reasoning_b,
        delta = input.delta_days,
        same_session = input.same_session,
    );
    if let Some(project) = &input.project_hint {
        prompt.push_str(&format!("Project: {project}\n"));
    }
    if let Some(repo) = &input.repo_hint {
        prompt.push_str(&format!("Repository: {repo}\n"));
    }
    prompt
}

// ============================================================================
// SECTION: Verdict Parsing
// ============================================================================

/// Raw verdict shape produced by the chat models.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    /// Relationship label, possibly truncated.
    relationship: String,
    /// Optional category label.
    #[serde(default)]
    category: Option<String>,
    /// Optional severity label.
    #[serde(default)]
    severity: Option<String>,
    /// Optional explanation.
    #[serde(default)]
    explanation: Option<String>,
}

/// Normalizes a possibly truncated relationship label.
#[must_use]
pub fn normalize_relationship(label: &str) -> Option<ConflictRelationship> {
    let label = label.trim().to_lowercase();
    if label.is_empty() {
        return None;
    }
    if "contradiction".starts_with(&label) || label.starts_with("contradict") {
        return Some(ConflictRelationship::Contradiction);
    }
    if "supersession".starts_with(&label) || label.starts_with("supersed") {
        return Some(ConflictRelationship::Supersession);
    }
    if "complementary".starts_with(&label) || label.starts_with("complement") {
        return Some(ConflictRelationship::Complementary);
    }
    if "refinement".starts_with(&label) || label.starts_with("refine") {
        return Some(ConflictRelationship::Refinement);
    }
    if "unrelated".starts_with(&label) || label == "none" {
        return Some(ConflictRelationship::Unrelated);
    }
    None
}

/// Extracts the first JSON object from a chat response, dropping markdown.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end >= start).then(|| &content[start..=end])
}

/// Parses a chat response into a verdict, fail-closed.
///
/// # Errors
///
/// Returns [`ValidatorError::Response`] when no parseable verdict exists;
/// the scorer treats that as a rejection of the pair.
pub fn parse_verdict(content: &str) -> Result<ValidationVerdict, ValidatorError> {
    let body = extract_json(content)
        .ok_or_else(|| ValidatorError::Response("no JSON object in response".to_string()))?;
    let raw: RawVerdict = serde_json::from_str(body)
        .map_err(|err| ValidatorError::Response(err.to_string()))?;
    let relationship = normalize_relationship(&raw.relationship).ok_or_else(|| {
        ValidatorError::Response(format!("unknown relationship label: {}", raw.relationship))
    })?;
    Ok(ValidationVerdict {
        relationship,
        category: raw.category.map(|label| label.trim().to_lowercase()),
        severity: raw.severity.map(|label| label.trim().to_lowercase()),
        explanation: raw.explanation,
    })
}

// ============================================================================
// SECTION: Noop Validator
// ============================================================================

/// Accepting validator used when no chat backend is configured.
///
/// # Invariants
/// - Every pair is accepted as a contradiction with an empty explanation;
///   embedding significance remains the only signal.
pub struct NoopValidator;

#[async_trait]
impl ConflictValidator for NoopValidator {
    fn class(&self) -> ValidatorClass {
        ValidatorClass::Noop
    }

    async fn validate(
        &self,
        _input: &ValidationInput,
    ) -> Result<ValidationVerdict, ValidatorError> {
        Ok(ValidationVerdict {
            relationship: ConflictRelationship::Contradiction,
            category: None,
            severity: None,
            explanation: None,
        })
    }
}

// ============================================================================
// SECTION: Local Chat Validator
// ============================================================================

/// Options for the local Ollama-compatible chat backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChatOptions {
    /// Endpoint base URL.
    pub url: String,
    /// Chat model.
    pub model: String,
    /// Per-call timeout, sized above the external default to absorb cold
    /// starts.
    pub timeout: Duration,
}

/// Local chat response body.
#[derive(Debug, Deserialize)]
struct LocalChatResponse {
    /// Assistant message.
    message: LocalChatMessage,
}

/// Local chat message body.
#[derive(Debug, Deserialize)]
struct LocalChatMessage {
    /// Message content.
    content: String,
}

/// Local single-threaded chat validator.
///
/// # Invariants
/// - At most one call is in flight; a local model serves one request well.
pub struct LocalChatValidator {
    /// Backend options.
    options: LocalChatOptions,
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Single-permit gate serializing calls.
    gate: Semaphore,
}

impl LocalChatValidator {
    /// Builds the validator and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Request`] when the client cannot be built.
    pub fn new(options: LocalChatOptions) -> Result<Self, ValidatorError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| ValidatorError::Request(err.to_string()))?;
        Ok(Self {
            options,
            client,
            gate: Semaphore::new(1),
        })
    }

    /// Pre-warms the model with a trivial request; failures are ignored.
    pub async fn prewarm(&self) {
        let body = json!({
            "model": self.options.model,
            "messages": [{"role": "user", "content": "ok"}],
            "stream": false,
            "keep_alive": "30m",
        });
        let url = format!("{}/api/chat", self.options.url.trim_end_matches('/'));
        if self.client.post(url).json(&body).send().await.is_err() {
            tracing::warn!(model = %self.options.model, "local validator prewarm failed");
        }
    }
}

#[async_trait]
impl ConflictValidator for LocalChatValidator {
    fn class(&self) -> ValidatorClass {
        ValidatorClass::LocalChat
    }

    async fn validate(&self, input: &ValidationInput) -> Result<ValidationVerdict, ValidatorError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ValidatorError::Request("validator gate closed".to_string()))?;
        let url = format!("{}/api/chat", self.options.url.trim_end_matches('/'));
        let body = json!({
            "model": self.options.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(input)},
            ],
            "stream": false,
            "format": "json",
            "keep_alive": "30m",
        });
        let response = self.client.post(url).json(&body).send().await.map_err(|err| {
            if err.is_timeout() {
                ValidatorError::Timeout(u64::try_from(self.options.timeout.as_millis()).unwrap_or(u64::MAX))
            } else {
                ValidatorError::Request(err.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ValidatorError::Response(format!("local chat returned {status}")));
        }
        let parsed: LocalChatResponse = response
            .json()
            .await
            .map_err(|err| ValidatorError::Response(err.to_string()))?;
        parse_verdict(&parsed.message.content)
    }
}

// ============================================================================
// SECTION: External Chat Validator
// ============================================================================

/// Options for the external chat-completion API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChatOptions {
    /// API base URL.
    pub api_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Chat model.
    pub model: String,
    /// Concurrent calls permitted.
    pub parallelism: usize,
    /// Per-call timeout.
    pub timeout: Duration,
}

/// External chat response body.
#[derive(Debug, Deserialize)]
struct ExternalChatResponse {
    /// Completion choices.
    choices: Vec<ExternalChatChoice>,
}

/// One completion choice.
#[derive(Debug, Deserialize)]
struct ExternalChatChoice {
    /// Assistant message.
    message: ExternalChatMessage,
}

/// External chat message body.
#[derive(Debug, Deserialize)]
struct ExternalChatMessage {
    /// Message content.
    content: String,
}

/// External parallel chat validator.
pub struct ExternalChatValidator {
    /// Backend options.
    options: ExternalChatOptions,
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Parallelism gate.
    gate: Semaphore,
}

impl ExternalChatValidator {
    /// Builds the validator and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::Request`] when the client cannot be built.
    pub fn new(options: ExternalChatOptions) -> Result<Self, ValidatorError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| ValidatorError::Request(err.to_string()))?;
        let permits = options.parallelism.max(1);
        Ok(Self {
            options,
            client,
            gate: Semaphore::new(permits),
        })
    }
}

#[async_trait]
impl ConflictValidator for ExternalChatValidator {
    fn class(&self) -> ValidatorClass {
        ValidatorClass::ExternalChat
    }

    async fn validate(&self, input: &ValidationInput) -> Result<ValidationVerdict, ValidatorError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ValidatorError::Request("validator gate closed".to_string()))?;
        let url = format!("{}/chat/completions", self.options.api_url.trim_end_matches('/'));
        let body = json!({
            "model": self.options.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(input)},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0,
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.options.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ValidatorError::Timeout(u64::try_from(self.options.timeout.as_millis()).unwrap_or(u64::MAX))
                } else {
                    ValidatorError::Request(err.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ValidatorError::Response(format!("chat completion returned {status}")));
        }
        let parsed: ExternalChatResponse = response
            .json()
            .await
            .map_err(|err| ValidatorError::Response(err.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| ValidatorError::Response("no completion choices".to_string()))?;
        parse_verdict(content)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use akashi_core::AgentId;
    use akashi_core::ConflictRelationship;
    use akashi_core::ValidationInput;

    use super::build_prompt;
    use super::normalize_relationship;
    use super::parse_verdict;

    /// Builds a validation input for prompt tests.
    fn input() -> ValidationInput {
        ValidationInput {
            outcome_a: "Use Redis".to_string(),
            outcome_b: "Use Memcached".to_string(),
            reasoning_a: "latency".to_string(),
            reasoning_b: "simplicity".to_string(),
            agent_a: AgentId::new("alpha"),
            agent_b: AgentId::new("beta"),
            delta_days: 2.5,
            project_hint: Some("checkout".to_string()),
            repo_hint: None,
            same_session: false,
        }
    }

    #[test]
    fn prompt_carries_both_sides_and_hints() {
        let prompt = build_prompt(&input());
        assert!(prompt.contains("Use Redis"));
        assert!(prompt.contains("Use Memcached"));
        assert!(prompt.contains("alpha"));
        assert!(prompt.contains("beta"));
        assert!(prompt.contains("Project: checkout"));
        assert!(prompt.contains("Same session: false"));
    }

    #[test]
    fn verdict_parses_clean_json() {
        let verdict = parse_verdict(
            r#"{"relationship": "contradiction", "category": "caching", "severity": "High", "explanation": "Opposite stores."}"#,
        )
        .expect("verdict");
        assert_eq!(verdict.relationship, ConflictRelationship::Contradiction);
        assert_eq!(verdict.category.as_deref(), Some("caching"));
        assert_eq!(verdict.severity.as_deref(), Some("high"));
    }

    #[test]
    fn verdict_strips_markdown_fences() {
        let verdict = parse_verdict(
            "```json\n{\"relationship\": \"supersession\"}\n```",
        )
        .expect("verdict");
        assert_eq!(verdict.relationship, ConflictRelationship::Supersession);
    }

    #[test]
    fn truncated_labels_normalize() {
        assert_eq!(normalize_relationship("refine"), Some(ConflictRelationship::Refinement));
        assert_eq!(
            normalize_relationship("contradict"),
            Some(ConflictRelationship::Contradiction)
        );
        assert_eq!(
            normalize_relationship(" Supersede "),
            Some(ConflictRelationship::Supersession)
        );
        assert_eq!(normalize_relationship("none"), Some(ConflictRelationship::Unrelated));
        assert_eq!(normalize_relationship("banana"), None);
        assert_eq!(normalize_relationship(""), None);
    }

    #[test]
    fn unparseable_response_is_rejected() {
        assert!(parse_verdict("I think they conflict.").is_err());
        assert!(parse_verdict("{\"relationship\": \"banana\"}").is_err());
    }
}
