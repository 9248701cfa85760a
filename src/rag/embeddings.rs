//! Embedding providers for semantic rule retrieval.
//!
//! - [`HashingEmbedder`]: local, deterministic feature hashing over words.
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingSettings;
use crate::utilities::errors::EmbeddingError;
use crate::utilities::string_utils::tokenize;

/// A single embedding vector.
pub type Embedding = Vec<f32>;

/// External `embed(text) -> vector` capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Embed several texts. The default embeds them one at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Cosine similarity of two vectors; `None` on length mismatch or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

// ---------------------------------------------------------------------------
// HashingEmbedder
// ---------------------------------------------------------------------------

/// Signed feature hashing of lower-case words and adjacent word pairs,
/// L2-normalized. Needs no network and never fails.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }

    /// Synchronous embedding; the async trait method delegates here.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let words = tokenize(text);
        let mut vector = vec![0.0f32; self.dimensions];
        for word in &words {
            self.add_feature(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        Ok(self.embed_text(text))
    }
}

// ---------------------------------------------------------------------------
// OpenAiEmbedder
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings API.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// Build from settings; fails if no API key is configured.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, EmbeddingError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| EmbeddingError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
        Self::new(api_key, &settings.base_url, &settings.model)
    }

    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            max_retries: 2,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let endpoint = format!("{}/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": input });

        let mut retry_delay = Duration::from_millis(250);
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let retryable =
                status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.max_retries {
                attempt += 1;
                log::warn!(
                    "Embedding API returned {status}; retry {attempt} after {retry_delay:?}"
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
                continue;
            }

            let text = response.text().await?;
            if !status.is_success() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "{status}: {}",
                    &text[..text.len().min(300)]
                )));
            }

            let mut parsed: EmbeddingResponse = serde_json::from_str(&text)
                .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
            if parsed.data.len() != input.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    input.len(),
                    parsed.data.len()
                )));
            }
            parsed.data.sort_by_key(|d| d.index);
            return Ok(parsed.data.into_iter().map(|d| d.embedding).collect());
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding list".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::Value;

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_hashing_embedder_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_text("dry skin fixative boost");
        let b = embedder.embed_text("dry skin fixative boost");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.embed_text("").iter().all(|v| *v == 0.0));

        let via_trait = tokio_test::block_on(embedder.embed("dry skin fixative boost")).unwrap();
        assert_eq!(via_trait, a);
        let batch = tokio_test::block_on(embedder.embed_batch(&["x".to_string(), "y".to_string()]))
            .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_hashing_similarity_tracks_shared_words() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_text("dry skin, balanced skin ph 5.5");
        let close = embedder.embed_text("Dry skin retains fragrance poorly");
        let far = embedder.embed_text("Warm weather accelerates evaporation");
        let close_sim = cosine_similarity(&query, &close).unwrap();
        let far_sim = cosine_similarity(&query, &far).unwrap_or(0.0);
        assert!(close_sim > far_sim);
    }

    #[test]
    fn test_openai_requires_key() {
        let err = OpenAiEmbedder::from_settings(&EmbeddingSettings::default()).unwrap_err();
        assert!(matches!(err, EmbeddingError::NotConfigured(_)));
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn test_openai_embedder_against_local_server() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                let inputs = body["input"].as_array().cloned().unwrap_or_default();
                // Answer out of order to exercise index sorting.
                let data: Vec<Value> = inputs
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(i, _)| json!({ "index": i, "embedding": [i as f32, 1.0] }))
                    .collect();
                Json(json!({ "data": data }))
            }),
        );
        let base_url = serve(router).await;
        let embedder = OpenAiEmbedder::new("sk-test", &base_url, "text-embedding-3-small").unwrap();

        let vectors = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0]]);
        assert_eq!(embedder.embed("c").await.unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_openai_embedder_reports_client_errors() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base_url = serve(router).await;
        let embedder = OpenAiEmbedder::new("sk-bad", &base_url, "m").unwrap();
        let err = embedder.embed("x").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
