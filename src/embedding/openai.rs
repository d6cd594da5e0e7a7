//! `OpenAI`-compatible embeddings client.

use super::Embedder;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedder backed by an `OpenAI`-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    /// API key.
    api_key: Option<SecretString>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// Requested output dimensions.
    dimensions: usize,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OpenAiEmbedder {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "text-embedding-3-small";

    /// Default request timeout.
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    /// Creates a new client, reading the API key from `OPENAI_API_KEY`.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            dimensions,
            client: build_http_client(Self::DEFAULT_TIMEOUT_MS),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.client = build_http_client(timeout_ms);
        self
    }

    fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let api_key = self.api_key.as_ref().ok_or_else(|| Error::OperationFailed {
            operation: "openai_embeddings".to_string(),
            cause: "OPENAI_API_KEY not set".to_string(),
        })?;

        let expected = input.len();
        let request = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .map_err(|e| Error::OperationFailed {
                operation: "openai_embeddings".to_string(),
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::OperationFailed {
                operation: "openai_embeddings".to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        let response: EmbeddingResponse =
            response.json().map_err(|e| Error::OperationFailed {
                operation: "openai_embeddings_response".to_string(),
                cause: e.to_string(),
            })?;

        parse_embeddings(response, expected, self.dimensions)
    }
}

impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        self.request(vec![text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::OperationFailed {
                operation: "openai_embeddings_response".to_string(),
                cause: "response contained no embeddings".to_string(),
            })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts.iter().map(ToString::to_string).collect())
    }
}

fn build_http_client(timeout_ms: u64) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build embedding HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Orders embeddings by their `index` and checks count and length.
fn parse_embeddings(
    response: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(Error::OperationFailed {
            operation: "openai_embeddings_response".to_string(),
            cause: format!("expected {expected} embeddings, got {}", data.len()),
        });
    }
    data.sort_by_key(|d| d.index);

    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimensions {
                Ok(d.embedding)
            } else {
                Err(Error::DimensionMismatch {
                    expected: dimensions,
                    actual: d.embedding.len(),
                })
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
