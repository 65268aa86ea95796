//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`GeminiProvider`]**: Google Generative Language `batchEmbedContents`.
//! - **[`OpenAIProvider`]**: any OpenAI-compatible `/embeddings` endpoint.
//! - **[`DisabledProvider`]**: fails every call; used when embeddings are off.
//!
//! Also provides the vector helpers used by the SQLite index:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for a BLOB column
//! - [`blob_to_vec`]: decode a BLOB back into a `Vec<f32>`
//!
//! # Intent
//!
//! Every call names an [`EmbedIntent`]. Gemini maps it onto `taskType`
//! (`RETRIEVAL_DOCUMENT` / `RETRIEVAL_QUERY`); OpenAI ignores it.
//!
//! # Errors and retries
//!
//! Providers make exactly one HTTP attempt per call and classify the outcome
//! as an [`EmbedError`]. Only [`EmbedError::RateLimited`] is worth retrying;
//! the retry loop itself lives in [`crate::batch`].

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EmbeddingConfig;

const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "models/gemini-embedding-001";
const GEMINI_DEFAULT_DIMS: usize = 3072;
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_DIMS: usize = 1536;

/// Whether the texts being embedded are corpus passages or a search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedIntent {
    Document,
    Query,
}

impl EmbedIntent {
    fn gemini_task_type(self) -> &'static str {
        match self {
            EmbedIntent::Document => "RETRIEVAL_DOCUMENT",
            EmbedIntent::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedError {
    /// Quota or rate limit hit (HTTP 429 / `RESOURCE_EXHAUSTED`).
    #[error("embedding rate limited: {0}")]
    RateLimited(String),
    #[error("embedding request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("embedding transport error: {0}")]
    Transport(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding provider is disabled")]
    Disabled,
}

impl EmbedError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, EmbedError::RateLimited(_))
    }
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in the index (e.g. `"models/gemini-embedding-001"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String], intent: EmbedIntent)
        -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, EmbedError> {
    provider
        .embed(&[text.to_string()], EmbedIntent::Query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::InvalidResponse("empty embedding response".to_string()))
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(
        &self,
        _texts: &[String],
        _intent: EmbedIntent,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini `batchEmbedContents` API.
///
/// The API key is read from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
pub struct GeminiProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    output_dims: Option<usize>,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY (or GOOGLE_API_KEY) not set"))?;

        let mut model = config
            .model
            .clone()
            .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());
        if !model.starts_with("models/") {
            model = format!("models/{}", model);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_URL.to_string()),
            model,
            dims: config.dims.unwrap_or(GEMINI_DEFAULT_DIMS),
            output_dims: config.dims,
            api_key,
        })
    }

    fn request_body(&self, texts: &[String], intent: EmbedIntent) -> serde_json::Value {
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                let mut req = serde_json::json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": intent.gemini_task_type(),
                });
                if let Some(d) = self.output_dims {
                    req["outputDimensionality"] = serde_json::json!(d);
                }
                req
            })
            .collect();
        serde_json::json!({ "requests": requests })
    }
}

#[derive(Deserialize)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(
        &self,
        texts: &[String],
        intent: EmbedIntent,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/{}:batchEmbedContents", self.url, self.model);
        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(texts, intent))
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }

        let parsed: GeminiBatchResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        let vectors = parsed.embeddings.into_iter().map(|e| e.values).collect();
        check_count(vectors, texts.len())
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI embeddings API (or a compatible proxy
/// set via `embedding.url`). Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    api_key: String,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            model,
            dims: config.dims.unwrap_or(OPENAI_DEFAULT_DIMS),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(
        &self,
        texts: &[String],
        _intent: EmbedIntent,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }

        let mut parsed: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        // The API may return items out of order.
        parsed.data.sort_by_key(|d| d.index);
        let vectors = parsed.data.into_iter().map(|d| d.embedding).collect();
        check_count(vectors, texts.len())
    }
}

/// Map a non-success HTTP response onto an [`EmbedError`].
pub fn classify_failure(status: u16, body: &str) -> EmbedError {
    let message: String = body.chars().take(500).collect();
    if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
        EmbedError::RateLimited(format!("HTTP {}: {}", status, message))
    } else {
        EmbedError::Rejected { status, message }
    }
}

fn check_count(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {} vectors, got {}",
            expected,
            vectors.len()
        )));
    }
    if vectors.iter().any(|v| v.is_empty()) {
        return Err(EmbedError::InvalidResponse("empty vector".to_string()));
    }
    Ok(vectors)
}

/// Create the [`EmbeddingProvider`] named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "gemini" => Ok(Box::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use syllabus::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_classify_rate_limit() {
        assert!(classify_failure(429, "slow down").is_rate_limit());
        let quota = r#"{"error":{"code":400,"status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(classify_failure(400, quota).is_rate_limit());
    }

    #[test]
    fn test_classify_permanent() {
        let err = classify_failure(401, "bad key");
        assert!(!err.is_rate_limit());
        assert!(matches!(err, EmbedError::Rejected { status: 401, .. }));
        assert!(!EmbedError::Transport("reset".into()).is_rate_limit());
    }

    #[test]
    fn test_check_count_mismatch() {
        let err = check_count(vec![vec![1.0]], 2).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidResponse(_)));
        assert!(check_count(vec![vec![1.0], vec![2.0]], 2).is_ok());
    }

    #[test]
    fn test_intent_task_types() {
        assert_eq!(EmbedIntent::Document.gemini_task_type(), "RETRIEVAL_DOCUMENT");
        assert_eq!(EmbedIntent::Query.gemini_task_type(), "RETRIEVAL_QUERY");
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let provider = DisabledProvider;
        let err = embed_query(&provider, "hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::Disabled));
    }

    #[test]
    fn test_create_disabled_provider() {
        let config = EmbeddingConfig {
            provider: "disabled".to_string(),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "disabled");
    }
}
