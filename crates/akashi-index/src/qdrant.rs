// crates/akashi-index/src/qdrant.rs
// ============================================================================
// Module: Qdrant Vector Index Adapter
// Description: VectorIndex implementation over the Qdrant-compatible REST API.
// Purpose: Named-vector upserts and org-filtered ANN search with bounded I/O.
// Dependencies: akashi-core, reqwest, serde, serde_json
// ============================================================================

//! ## Overview
//! The adapter speaks the Qdrant-compatible REST surface: one collection
//! with two named vectors (`decision`, `outcome`), payload fields for
//! server-side filtering (`org_id`, `decision_type`, `agent_id`), and
//! point identifiers equal to decision UUIDs. Every request carries the
//! configured timeout and API key; responses parse fail-closed, and any
//! transport failure maps to the unavailable kind so callers can degrade
//! to text search.

// ============================================================================
// SECTION: Imports
// ============================================================================

use akashi_core::DecisionId;
use akashi_core::IndexError;
use akashi_core::IndexHit;
use akashi_core::IndexPoint;
use akashi_core::IndexQuery;
use akashi_core::OrgId;
use akashi_core::VectorIndex;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use std::time::Duration;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Qdrant adapter configuration.
///
/// # Invariants
/// - `dimensions` is greater than zero and matches the embedding provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdrantOptions {
    /// Base URL, e.g. `http://127.0.0.1:6333`.
    pub url: String,
    /// Optional API key sent as the `api-key` header.
    pub api_key: Option<String>,
    /// Collection name.
    pub collection: String,
    /// Vector dimensionality for both named vectors.
    pub dimensions: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

// ============================================================================
// SECTION: Response Shapes
// ============================================================================

/// Generic Qdrant response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    /// Operation result payload.
    result: Option<T>,
    /// Status string or structured error.
    #[serde(default)]
    status: Value,
}

/// One scored point from a search response.
#[derive(Debug, Deserialize)]
struct ScoredPoint {
    /// Point identifier (decision UUID).
    id: Value,
    /// Similarity score.
    score: f64,
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Qdrant-compatible REST vector index.
pub struct QdrantIndex {
    /// Adapter configuration.
    options: QdrantOptions,
    /// Shared HTTP client with the configured timeout.
    client: reqwest::Client,
}

impl QdrantIndex {
    /// Builds the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Request`] when the client cannot be built.
    pub fn new(options: QdrantOptions) -> Result<Self, IndexError> {
        if options.dimensions == 0 {
            return Err(IndexError::Request("dimensions must be greater than zero".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| IndexError::Request(err.to_string()))?;
        Ok(Self {
            options,
            client,
        })
    }

    /// Builds a request with the API key header applied.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.options.url.trim_end_matches('/'));
        let mut builder = self.client.request(method, url);
        if let Some(api_key) = &self.options.api_key {
            builder = builder.header("api-key", api_key);
        }
        builder
    }

    /// Sends a JSON request and decodes the response envelope.
    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Envelope<T>, IndexError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Response(format!("{path} returned {status}")));
        }
        response
            .json::<Envelope<T>>()
            .await
            .map_err(|err| IndexError::Response(err.to_string()))
    }

    /// Returns true when the collection already exists.
    async fn collection_exists(&self) -> Result<bool, IndexError> {
        let path = format!("/collections/{}", self.options.collection);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<(), IndexError> {
        if self.collection_exists().await? {
            return Ok(());
        }
        let path = format!("/collections/{}", self.options.collection);
        let body = json!({
            "vectors": {
                "decision": {"size": self.options.dimensions, "distance": "Cosine"},
                "outcome": {"size": self.options.dimensions, "distance": "Cosine"},
            }
        });
        let envelope: Envelope<Value> =
            self.send(reqwest::Method::PUT, &path, Some(&body)).await?;
        if envelope.result.is_none() {
            return Err(IndexError::Response(format!(
                "collection create rejected: {}",
                envelope.status
            )));
        }
        tracing::info!(collection = %self.options.collection, "vector collection ensured");
        Ok(())
    }

    async fn upsert(&self, point: &IndexPoint) -> Result<(), IndexError> {
        let path = format!("/collections/{}/points?wait=true", self.options.collection);
        let body = json!({
            "points": [{
                "id": point.decision_id.as_uuid(),
                "vector": {
                    "decision": point.decision_vector,
                    "outcome": point.outcome_vector,
                },
                "payload": {
                    "org_id": point.org_id.as_uuid(),
                    "decision_type": point.decision_type,
                    "agent_id": point.agent_id,
                },
            }]
        });
        let envelope: Envelope<Value> =
            self.send(reqwest::Method::PUT, &path, Some(&body)).await?;
        if envelope.result.is_none() {
            return Err(IndexError::Response(format!("upsert rejected: {}", envelope.status)));
        }
        Ok(())
    }

    async fn delete(&self, decision_id: DecisionId) -> Result<(), IndexError> {
        let path =
            format!("/collections/{}/points/delete?wait=true", self.options.collection);
        let body = json!({"points": [decision_id.as_uuid()]});
        let envelope: Envelope<Value> =
            self.send(reqwest::Method::POST, &path, Some(&body)).await?;
        if envelope.result.is_none() {
            return Err(IndexError::Response(format!("delete rejected: {}", envelope.status)));
        }
        Ok(())
    }

    async fn search(
        &self,
        org_id: OrgId,
        query: &IndexQuery,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let path = format!("/collections/{}/points/search", self.options.collection);
        let mut must = vec![json!({"key": "org_id", "match": {"value": org_id.as_uuid()}})];
        if let Some(decision_type) = &query.decision_type {
            must.push(json!({"key": "decision_type", "match": {"value": decision_type}}));
        }
        let mut filter = json!({"must": must});
        if !query.exclude.is_empty() {
            let excluded: Vec<uuid::Uuid> =
                query.exclude.iter().map(|id| id.as_uuid()).collect();
            filter["must_not"] = json!([{"has_id": excluded}]);
        }
        let body = json!({
            "vector": {"name": query.using.as_str(), "vector": query.vector},
            "filter": filter,
            "limit": query.limit,
            "with_payload": false,
        });
        let envelope: Envelope<Vec<ScoredPoint>> =
            self.send(reqwest::Method::POST, &path, Some(&body)).await?;
        let points = envelope
            .result
            .ok_or_else(|| IndexError::Response(format!("search rejected: {}", envelope.status)))?;
        let mut hits = Vec::with_capacity(points.len());
        for point in points {
            let raw = point
                .id
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| point.id.to_string());
            let id = raw
                .parse::<uuid::Uuid>()
                .map_err(|err| IndexError::Response(format!("point id {raw}: {err}")))?;
            hits.push(IndexHit {
                decision_id: DecisionId::from_uuid(id),
                score: point.score,
            });
        }
        Ok(hits)
    }

    async fn healthy(&self) -> bool {
        let response = self.request(reqwest::Method::GET, "/readyz").send().await;
        matches!(response, Ok(response) if response.status().is_success())
    }

    async fn close(&self) {}
}

// ============================================================================
// SECTION: Noop Adapter
// ============================================================================

/// Disabled vector index; reports unhealthy so callers use text fallback.
///
/// # Invariants
/// - Upserts and deletes succeed (the outbox stays clean) while searches
///   report the index as unavailable.
pub struct NoopVectorIndex;

#[async_trait]
impl VectorIndex for NoopVectorIndex {
    async fn ensure_collection(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, _point: &IndexPoint) -> Result<(), IndexError> {
        Ok(())
    }

    async fn delete(&self, _decision_id: DecisionId) -> Result<(), IndexError> {
        Ok(())
    }

    async fn search(
        &self,
        _org_id: OrgId,
        _query: &IndexQuery,
    ) -> Result<Vec<IndexHit>, IndexError> {
        Err(IndexError::Unavailable("no vector index configured".to_string()))
    }

    async fn healthy(&self) -> bool {
        false
    }

    async fn close(&self) {}
}
