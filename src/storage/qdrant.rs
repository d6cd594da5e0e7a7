//! Qdrant engine over the REST API.
//!
//! # Endpoints Used
//!
//! | Operation | Request | Description |
//! |-----------|---------|-------------|
//! | Describe | `GET /collections/{c}` | Vector size and point count, 404 if missing |
//! | Create | `PUT /collections/{c}` | Cosine-distance collection |
//! | Index | `PUT /collections/{c}/index` | Keyword index on a payload field |
//! | Upsert | `PUT /collections/{c}/points?wait=true` | Insert or replace one point |
//! | Get | `POST /collections/{c}/points` | Retrieve by id with payload |
//! | Delete | `POST /collections/{c}/points/delete?wait=true` | Remove by id |
//! | Scroll | `POST /collections/{c}/points/scroll` | Filtered listing |
//! | Search | `POST /collections/{c}/points/search` | Filtered nearest neighbors |
//! | Count | `POST /collections/{c}/points/count` | Exact filtered count |
//! | Health | `GET /healthz` | Liveness |
//!
//! # Configuration
//!
//! ```toml
//! [store]
//! backend = "qdrant"
//! qdrant_url = "http://localhost:6333"
//! collection = "nsrecall_store"
//! ```
//!
//! The client is `reqwest::blocking`; calls must run off the async executor
//! (the retriever uses `spawn_blocking`).

use super::traits::{CollectionInfo, Point, PointFilter, ScoredPoint, StoredPoint, VectorEngine};
use crate::models::RecordId;
use crate::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Qdrant REST engine.
pub struct QdrantEngine {
    /// Base URL without trailing slash.
    url: String,
    /// Optional API key sent as the `api-key` header.
    api_key: Option<SecretString>,
    /// HTTP client.
    client: Client,
}

impl QdrantEngine {
    /// Default Qdrant URL.
    pub const DEFAULT_URL: &'static str = "http://localhost:6333";

    /// Default request timeout.
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

    /// Creates a client for the given base URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client: build_http_client(Self::DEFAULT_TIMEOUT_MS),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then(|| SecretString::from(key));
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.client = build_http_client(timeout_ms);
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn collection_url(&self, collection: &str, path: &str) -> String {
        format!("{}/collections/{collection}{path}", self.url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key.expose_secret()),
            None => request,
        }
    }

    /// Sends a request and decodes the `result` field of the response.
    ///
    /// Returns `Ok(None)` for 404 when `allow_missing` is set.
    fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        allow_missing: bool,
    ) -> Result<Option<T>> {
        let response = self
            .authorized(request)
            .send()
            .map_err(|e| Error::OperationFailed {
                operation: format!("qdrant_{operation}"),
                cause: e.to_string(),
            })?;

        let status = response.status();
        if allow_missing && status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::OperationFailed {
                operation: format!("qdrant_{operation}"),
                cause: format!("Qdrant returned status: {status} - {body}"),
            });
        }

        let envelope: Envelope<T> = response.json().map_err(|e| Error::OperationFailed {
            operation: format!("qdrant_{operation}_response"),
            cause: e.to_string(),
        })?;
        Ok(Some(envelope.result))
    }

    fn send_required<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        self.send(operation, request, false)?
            .ok_or_else(|| Error::OperationFailed {
                operation: format!("qdrant_{operation}"),
                cause: "empty response".to_string(),
            })
    }
}

impl VectorEngine for QdrantEngine {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    fn describe_collection(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        let request = self.client.get(self.collection_url(collection, ""));
        self.send::<Value>("describe_collection", request, true)?
            .map(|result| parse_collection_info(&result))
            .transpose()
    }

    fn create_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        tracing::info!(collection, dimensions, "Creating Qdrant collection");
        let request = self
            .client
            .put(self.collection_url(collection, ""))
            .json(&create_collection_body(dimensions));
        self.send_required::<Value>("create_collection", request)
            .map(|_| ())
    }

    fn create_keyword_index(&self, collection: &str, field: &str) -> Result<()> {
        let request = self
            .client
            .put(self.collection_url(collection, "/index?wait=true"))
            .json(&json!({"field_name": field, "field_schema": "keyword"}));
        self.send_required::<Value>("create_index", request)
            .map(|_| ())
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        let request = self
            .client
            .put(self.collection_url(collection, "/points?wait=true"))
            .json(&upsert_body(&point));
        self.send_required::<Value>("upsert", request).map(|_| ())
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<StoredPoint>> {
        let request = self
            .client
            .post(self.collection_url(collection, "/points"))
            .json(&json!({"ids": [id.to_string()], "with_payload": true, "with_vector": false}));
        let points: Vec<RawPoint> = self.send_required("get", request)?;
        points
            .into_iter()
            .next()
            .map(RawPoint::into_stored)
            .transpose()
    }

    fn delete(&self, collection: &str, id: &RecordId) -> Result<()> {
        let request = self
            .client
            .post(self.collection_url(collection, "/points/delete?wait=true"))
            .json(&json!({"points": [id.to_string()]}));
        self.send_required::<Value>("delete", request).map(|_| ())
    }

    fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<StoredPoint>> {
        let request = self
            .client
            .post(self.collection_url(collection, "/points/scroll"))
            .json(&scroll_body(filter, limit));
        let page: ScrollPage = self.send_required("scroll", request)?;
        page.points
            .into_iter()
            .map(RawPoint::into_stored)
            .collect()
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let request = self
            .client
            .post(self.collection_url(collection, "/points/search"))
            .json(&search_body(vector, filter, limit));
        let hits: Vec<RawPoint> = self.send_required("search", request)?;
        hits.into_iter().map(RawPoint::into_scored).collect()
    }

    fn count(&self, collection: &str, filter: &PointFilter) -> Result<usize> {
        let mut body = json!({"exact": true});
        if let Some(f) = filter_json(filter) {
            body["filter"] = f;
        }
        let request = self
            .client
            .post(self.collection_url(collection, "/points/count"))
            .json(&body);
        let result: CountResult = self.send_required("count", request)?;
        Ok(result.count)
    }

    fn health_check(&self) -> bool {
        self.authorized(self.client.get(format!("{}/healthz", self.url)))
            .send()
            .is_ok_and(|r| r.status().is_success())
    }
}

fn build_http_client(timeout_ms: u64) -> Client {
    let mut builder = Client::builder();
    if timeout_ms > 0 {
        builder = builder
            .timeout(Duration::from_millis(timeout_ms))
            .connect_timeout(Duration::from_millis(timeout_ms.min(3_000)));
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build Qdrant HTTP client: {err}");
        Client::new()
    })
}

/// Converts a filter to Qdrant's `{"must": [...]}` form. Empty filters are omitted.
fn filter_json(filter: &PointFilter) -> Option<Value> {
    if filter.is_empty() {
        return None;
    }
    let must: Vec<Value> = filter
        .must
        .iter()
        .map(|m| json!({"key": m.key, "match": {"value": m.value}}))
        .collect();
    Some(json!({ "must": must }))
}

fn create_collection_body(dimensions: usize) -> Value {
    json!({"vectors": {"size": dimensions, "distance": "Cosine"}})
}

fn upsert_body(point: &Point) -> Value {
    json!({
        "points": [{
            "id": point.id.to_string(),
            "vector": point.vector,
            "payload": point.payload,
        }]
    })
}

fn scroll_body(filter: &PointFilter, limit: usize) -> Value {
    let mut body = json!({"limit": limit, "with_payload": true, "with_vector": false});
    if let Some(f) = filter_json(filter) {
        body["filter"] = f;
    }
    body
}

fn search_body(vector: &[f32], filter: &PointFilter, limit: usize) -> Value {
    let mut body = json!({"vector": vector, "limit": limit, "with_payload": true});
    if let Some(f) = filter_json(filter) {
        body["filter"] = f;
    }
    body
}

fn parse_collection_info(result: &Value) -> Result<CollectionInfo> {
    let size = result
        .pointer("/config/params/vectors/size")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::OperationFailed {
            operation: "qdrant_describe_collection_response".to_string(),
            cause: "collection has no single unnamed vector config".to_string(),
        })?;
    let points = result
        .get("points_count")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok());

    Ok(CollectionInfo {
        dimensions: usize::try_from(size).map_err(|e| Error::OperationFailed {
            operation: "qdrant_describe_collection_response".to_string(),
            cause: e.to_string(),
        })?,
        points,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScrollPage {
    points: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    id: Value,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
    #[serde(default)]
    score: Option<f32>,
}

impl RawPoint {
    fn record_id(&self) -> Result<RecordId> {
        match &self.id {
            Value::String(s) => RecordId::parse(s),
            other => Err(Error::OperationFailed {
                operation: "qdrant_response".to_string(),
                cause: format!("unexpected point id {other}"),
            }),
        }
    }

    fn into_stored(self) -> Result<StoredPoint> {
        Ok(StoredPoint {
            id: self.record_id()?,
            payload: self.payload.unwrap_or_default(),
        })
    }

    fn into_scored(self) -> Result<ScoredPoint> {
        Ok(ScoredPoint {
            id: self.record_id()?,
            score: self.score.unwrap_or_default(),
            payload: self.payload.unwrap_or_default(),
        })
    }
}
