//! Pluggable embedding providers for sentence similarity.
//!
//! Provides a trait-based abstraction over embedding models, with implementations
//! for a local hashed term-frequency model (always available), the Ollama API,
//! and the OpenAI API. Provider failures are returned to the caller, never
//! replaced by zero vectors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{CitationError, CollaboratorError, ConfigError};

/// Trait for embedding providers.
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;

    /// Generate embeddings for a batch of texts, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "local" (default), "ollama", "openai"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider-specific model name, or a size alias: "sm", "md", "lg".
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensions (provider default if 0).
    #[serde(default)]
    pub dimensions: usize,
    /// Maximum number of texts sent per batch request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Override for the provider's base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the OpenAI API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "local".into()
}

fn default_batch_size() -> usize {
    32
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dimensions: 0,
            batch_size: default_batch_size(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Map the `sm`/`md`/`lg` size aliases to a concrete model for a provider.
pub fn resolve_model_alias(provider: &str, model: Option<&str>) -> Option<String> {
    let resolved = match (provider, model?) {
        ("ollama", "sm") => "all-minilm",
        ("ollama", "md") => "nomic-embed-text",
        ("ollama", "lg") => "mxbai-embed-large",
        ("openai", "sm") | ("openai", "md") => "text-embedding-3-small",
        ("openai", "lg") => "text-embedding-3-large",
        (_, other) => other,
    };
    Some(resolved.to_string())
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for empty, zero-norm, or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine similarity that rejects vectors of different length.
pub fn checked_cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, CollaboratorError> {
    if a.len() != b.len() {
        return Err(CollaboratorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(cosine_similarity(a, b))
}

// ---------------------------------------------------------------------------
// Local embedder
// ---------------------------------------------------------------------------

/// Local hashed term-frequency embedder (always available, no external dependencies).
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            return Ok(vector);
        }

        // Count term frequency
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }

        // Hash each unique term into a dimension
        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

// ---------------------------------------------------------------------------
// HTTP embedders
// ---------------------------------------------------------------------------

fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, ConfigError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| ConfigError::Invalid {
            message: format!("failed to build HTTP client: {e}"),
        })
}

fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value.as_array().map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    })
}

/// Ollama embedder (uses the local Ollama `/api/embed` endpoint).
pub struct OllamaEmbedder {
    client: reqwest::blocking::Client,
    model: String,
    dims: usize,
    base_url: String,
}

impl OllamaEmbedder {
    pub fn new(
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let model = model.unwrap_or_else(|| "nomic-embed-text".into());
        let dims = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768,
        };
        Ok(Self {
            client: http_client(timeout_secs)?,
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".into()),
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json: serde_json::Value = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())
            .map_err(|e| CollaboratorError::embedding("ollama", e.to_string()))?;

        let embeddings = json["embeddings"]
            .as_array()
            .ok_or_else(|| CollaboratorError::embedding("ollama", "response has no embeddings"))?;
        let vectors: Vec<Vec<f32>> = embeddings.iter().filter_map(parse_vector).collect();
        if vectors.len() != texts.len() {
            return Err(CollaboratorError::embedding(
                "ollama",
                format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| CollaboratorError::embedding("ollama", "empty response"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

/// OpenAI API embedder (uses text-embedding-3-small by default).
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".into());
        let dims = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        };
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".into()),
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json: serde_json::Value = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json())
            .map_err(|e| CollaboratorError::embedding("openai", e.to_string()))?;

        let data = json["data"]
            .as_array()
            .ok_or_else(|| CollaboratorError::embedding("openai", "response has no data"))?;
        let vectors: Vec<Vec<f32>> = data
            .iter()
            .filter_map(|item| parse_vector(&item["embedding"]))
            .collect();
        if vectors.len() != texts.len() {
            return Err(CollaboratorError::embedding(
                "openai",
                format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            ));
        }
        Ok(vectors)
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| CollaboratorError::embedding("openai", "empty response"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

// ---------------------------------------------------------------------------
// Mock embedder
// ---------------------------------------------------------------------------

/// Embedder returning fixed vectors, for tests.
///
/// Texts without a registered vector receive the default vector.
#[derive(Debug, Default)]
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    default_vector: Vec<f32>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(default_vector: Vec<f32>) -> Self {
        Self {
            default_vector,
            ..Self::default()
        }
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Make every call fail with the given message.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        if let Some(message) = &self.failure {
            return Err(CollaboratorError::embedding("mock", message.clone()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default_vector.clone()))
    }

    fn dimensions(&self) -> usize {
        self.default_vector.len()
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Factory function to create an embedder based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, CitationError> {
    let model = resolve_model_alias(&config.provider, config.model.as_deref());
    match config.provider.as_str() {
        "local" => {
            let dims = if config.dimensions > 0 {
                config.dimensions
            } else {
                128
            };
            Ok(Box::new(LocalEmbedder::new(dims)))
        }
        "ollama" => Ok(Box::new(OllamaEmbedder::new(
            model,
            config.base_url.clone(),
            config.timeout_secs,
        )?)),
        "openai" => {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnv {
                    var: config.api_key_env.clone(),
                })?;
            Ok(Box::new(OpenAiEmbedder::new(
                api_key,
                model,
                config.base_url.clone(),
                config.timeout_secs,
            )?))
        }
        other => Err(ConfigError::Invalid {
            message: format!("unknown embedding provider '{other}'"),
        }
        .into()),
    }
}
