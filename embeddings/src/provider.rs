//! Embedding providers.
//!
//! The correction engine only needs `text -> vector`; everything behind that
//! boundary lives here. Two backends ship with the crate: an HTTP client for
//! any OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama, LM Studio,
//! vLLM, ...) and a deterministic feature-hashing embedder that needs no model.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::{DEFAULT_HASHING_DIMENSION, Embedding};

/// Base URL of the hosted OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// One text to embed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub text: String,

    /// Overrides the provider's default model.
    pub model: Option<String>,

    /// Requested output size, for models that can truncate.
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// A vector produced for one [`EmbeddingRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Embedding,

    /// Model the provider actually used.
    pub model: String,
    pub dimension: usize,

    /// Reported by hosted APIs only.
    pub tokens_used: Option<u64>,
}

/// Turns phrases into vectors.
///
/// Implementations must be deterministic for identical input and free of
/// side effects visible to the caller.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name reported in stats, e.g. `"openai"`.
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    fn default_dimension(&self) -> usize;

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Embed several texts. The default embeds them one at a time.
    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.embed(request).await?);
        }
        Ok(results)
    }

    /// Whether the provider can serve requests with its current settings.
    fn is_available(&self) -> bool;
}

/// Client for OpenAI-compatible embedding endpoints.
pub struct OpenAIProvider {
    /// Local servers usually need none.
    api_key: Option<String>,

    /// Without the trailing `/embeddings`.
    base_url: String,
    client: reqwest::Client,
    default_model: String,
}

impl OpenAIProvider {
    /// Create a provider for the hosted OpenAI API, reading `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            default_model: "text-embedding-3-small".to_string(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Point at another OpenAI-compatible server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// POST `input` to the embeddings endpoint and decode the payload.
    async fn request(&self, input: serde_json::Value) -> Result<OpenAIEmbeddingResponse> {
        if !self.is_available() {
            return Err(EmbeddingError::ProviderNotConfigured);
        }

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&input);

        let key = self.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "{status}: {error_text}"
            )));
        }

        let mut payload: OpenAIEmbeddingResponse = response.json().await?;
        payload.data.sort_by_key(|item| item.index);
        Ok(payload)
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_dimension(&self) -> usize {
        match self.default_model.as_str() {
            "text-embedding-3-large" => 3072,
            "nomic-embed-text" => 768,
            "all-minilm" | "all-MiniLM-L6-v2" => 384,
            _ => 1536,
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        if request.text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let model = request.model.unwrap_or_else(|| self.default_model.clone());
        debug!("embedding phrase with {model}");

        let mut body = serde_json::json!({
            "input": request.text,
            "model": model
        });
        if let Some(dims) = request.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let result = self.request(body).await?;
        let embedding = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))?
            .embedding;

        let dimension = embedding.len();
        debug!("received {dimension}-dimensional embedding");

        Ok(EmbeddingResponse {
            embedding,
            model: result.model,
            dimension,
            tokens_used: result.usage.map(|u| u.total_tokens),
        })
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        if requests.iter().any(|r| r.text.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }

        let model = requests[0]
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let texts: Vec<&str> = requests.iter().map(|r| r.text.as_str()).collect();

        debug!("embedding {} phrases with {model}", texts.len());

        let result = self
            .request(serde_json::json!({ "input": texts, "model": model }))
            .await?;

        if result.data.len() != requests.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                requests.len(),
                result.data.len()
            )));
        }

        let model = result.model;
        let responses: Vec<EmbeddingResponse> = result
            .data
            .into_iter()
            .map(|item| EmbeddingResponse {
                dimension: item.embedding.len(),
                embedding: item.embedding,
                model: model.clone(),
                tokens_used: None,
            })
            .collect();

        debug!("received {} embeddings", responses.len());
        Ok(responses)
    }

    fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty()) || self.base_url != OPENAI_BASE_URL
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}

/// Model-free embedder based on hashed character trigrams.
///
/// Each word is padded with `#` and split into trigrams; every trigram and
/// the whole word are hashed into one of `dimension` buckets. Texts that share
/// spelling fragments end up close in cosine space (`"meting"` /
/// `"meeting"`).
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    /// Create a provider with [`DEFAULT_HASHING_DIMENSION`] buckets.
    pub fn new() -> Self {
        Self::with_dimension(DEFAULT_HASHING_DIMENSION)
    }

    /// Create a provider with a custom number of buckets (at least 1).
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() % self.dimension as u64) as usize
    }

    /// Compute the embedding synchronously.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            vector[self.bucket(&word)] += 1.0;

            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for trigram in padded.windows(3) {
                let feature: String = trigram.iter().collect();
                vector[self.bucket(&feature)] += 1.0;
            }
        }

        vector
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    fn default_model(&self) -> &str {
        "char-trigram-hash"
    }

    fn default_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        if request.text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let embedding = self.embed_text(&request.text);
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: self.default_model().to_string(),
            tokens_used: Some(request.text.split_whitespace().count() as u64),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
