//! Embedding client abstraction and the Voyage AI HTTP implementation.
//!
//! Defines the [`Embedder`] trait used by the retrieval engine and a
//! [`VoyageClient`] that calls a Voyage-style `POST /embeddings` endpoint.
//!
//! # Rate-limit discipline
//!
//! The provider enforces a strict per-request rate limit, so the client
//! sends ONE text per request and sleeps a fixed 1.2s between consecutive
//! requests within a batch. On HTTP 429 it waits 2s and retries that request
//! exactly once; a second 429 fails the whole batch with no partial results.
//! Other non-success statuses fail immediately.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;

/// Pause between consecutive embedding requests within one batch.
pub const PACING_DELAY: Duration = Duration::from_millis(1200);
/// Pause before the single retry after an HTTP 429.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";

/// Whether a text is being embedded for storage or for search.
///
/// Passed through to the provider as `input_type`; asymmetric models produce
/// different vectors for the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Document,
    Query,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Document => "document",
            InputType::Query => "query",
        }
    }
}

/// Trait for embedding backends.
///
/// The engine and tests depend on this seam; production code uses
/// [`VoyageClient`], tests substitute a deterministic stub.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in input
    /// order. An empty batch returns an empty result without network I/O.
    async fn embed_batch(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>>;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embeds a single text in document mode.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_batch(&[text.to_string()], InputType::Document)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("empty embedding response"))
    }

    /// Embeds a single search query in query mode.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_batch(&[text.to_string()], InputType::Query)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("empty embedding response"))
    }
}

/// Voyage AI embeddings client.
pub struct VoyageClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dims: usize,
}

impl VoyageClient {
    /// Creates a client with an explicit API key (tests pass a dummy key and
    /// point `config.url` at a mock server).
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            bail!("embedding API key is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            dims: config.dims,
        })
    }

    /// Creates a client reading the key from `VOYAGE_API_KEY`.
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("VOYAGE_API_KEY")
            .map_err(|_| anyhow!("VOYAGE_API_KEY environment variable not set"))?;
        Self::new(config, api_key)
    }

    async fn request_one(&self, text: &str, input_type: InputType) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "input_type": input_type.as_str(),
        });

        let mut rate_limited_once = false;
        loop {
            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
                .context("embedding request failed")?;

            let status = response.status();
            if status.is_success() {
                let json: serde_json::Value = response
                    .json()
                    .await
                    .context("invalid embedding response body")?;
                let mut vectors = parse_embeddings(&json)?;
                return vectors
                    .pop()
                    .ok_or_else(|| anyhow!("embedding response contained no data"));
            }

            if status.as_u16() == 429 && !rate_limited_once {
                rate_limited_once = true;
                tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                continue;
            }

            let body_text = response.text().await.unwrap_or_default();
            bail!("embedding API error {}: {}", status, body_text);
        }
    }
}

#[async_trait]
impl Embedder for VoyageClient {
    async fn embed_batch(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(PACING_DELAY).await;
            }
            let vector = self
                .request_one(text, input_type)
                .await
                .with_context(|| format!("embedding text {} of {}", i + 1, texts.len()))?;
            vectors.push(vector);
        }
        Ok(vectors)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parses the `data[].embedding` arrays, reordered by `data[].index` so the
/// output always matches input order.
fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("invalid embedding response: missing data array"))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("invalid embedding response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("invalid embedding response: non-numeric value"))
            })
            .collect::<Result<_>>()?;
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn test_config(url: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            model: "voyage-multilingual-2".to_string(),
            dims: 3,
            url: Some(url.to_string()),
            timeout_secs: 5,
        }
    }

    /// Responds with a vector encoding the first input's char count, so a
    /// test can verify one text per request and order preservation.
    struct EchoEmbedding;

    impl Respond for EchoEmbedding {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let inputs = body["input"].as_array().unwrap();
            assert_eq!(inputs.len(), 1, "client must send one text per request");
            let len = inputs[0].as_str().unwrap().chars().count() as f64;
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [len, 0.0, 1.0]}],
                "model": body["model"],
            }))
        }
    }

    #[tokio::test]
    async fn empty_batch_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = VoyageClient::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        let out = client.embed_batch(&[], InputType::Document).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn batch_preserves_input_order_one_request_per_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(EchoEmbedding)
            .expect(2)
            .mount(&server)
            .await;

        let client = VoyageClient::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        let texts = vec!["ab".to_string(), "abcde".to_string()];
        let out = client
            .embed_batch(&texts, InputType::Document)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0][0], 2.0);
        assert_eq!(out[1][0], 5.0);
    }

    #[tokio::test]
    async fn rate_limit_retries_once_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.5, 0.5, 0.5]}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = VoyageClient::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        let out = client.embed_query("question").await.unwrap();
        assert_eq!(out, vec![0.5, 0.5, 0.5]);
    }

    #[tokio::test]
    async fn second_rate_limit_fails_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let client = VoyageClient::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        let err = client
            .embed_batch(&["text".to_string()], InputType::Document)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("embedding text 1 of 1"));
    }

    #[tokio::test]
    async fn client_error_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = VoyageClient::new(&test_config(&server.uri()), "test-key".into()).unwrap();
        assert!(client.embed("text").await.is_err());
    }

    #[test]
    fn rejects_empty_api_key() {
        let config = test_config("http://localhost:1");
        assert!(VoyageClient::new(&config, String::new()).is_err());
    }

    #[test]
    fn parse_rejects_non_numeric_values() {
        let json = serde_json::json!({
            "data": [{"index": 0, "embedding": [1.0, "oops", 3.0]}],
        });
        let err = parse_embeddings(&json).unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
    }

    #[test]
    fn parse_reorders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [2.0]},
                {"index": 0, "embedding": [1.0]},
            ],
        });
        let out = parse_embeddings(&json).unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0]]);
    }
}
