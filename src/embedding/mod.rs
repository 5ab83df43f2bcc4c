//! Embedding client abstraction and the OpenAI-compatible adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Largest number of inputs sent in a single embeddings request.
pub const MAX_BATCH_SIZE: usize = 256;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Caller supplied no usable text.
    #[error("{0}")]
    EmptyInput(&'static str),
    /// HTTP layer failed before a response was received or decoded.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Embedding provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Provider returned a different number of vectors than inputs.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch {
        /// Number of inputs sent.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Provider returned vectors of an unexpected length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError>;

    /// Embed a batch of texts.
    ///
    /// Blank entries are dropped before the request, so the result holds one vector per
    /// non-blank input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Length of the vectors this client produces.
    fn dimension(&self) -> usize;
}

/// Embedding client for the OpenAI `/v1/embeddings` endpoint and compatible servers.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Construct a client for `model` producing vectors of `dimension` floats.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("pdf-rag/embeddings")
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }

    async fn request(&self, input: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Embedding provider returned an error");
            return Err(EmbeddingClientError::UnexpectedStatus { status, body });
        }

        let mut payload: EmbedResponse = response.json().await?;
        if payload.data.len() != input.len() {
            return Err(EmbeddingClientError::CountMismatch {
                expected: input.len(),
                actual: payload.data.len(),
            });
        }
        payload.data.sort_by_key(|item| item.index);

        let vectors: Vec<Vec<f32>> = payload.data.into_iter().map(|item| item.embedding).collect();
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingClientError::EmptyInput("Text cannot be empty"));
        }
        let mut vectors = self.request(&[text]).await?;
        vectors
            .pop()
            .ok_or(EmbeddingClientError::EmptyInput("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::EmptyInput("Texts list cannot be empty"));
        }
        let valid: Vec<&str> = texts
            .iter()
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .collect();
        if valid.is_empty() {
            return Err(EmbeddingClientError::EmptyInput("No valid texts to embed"));
        }

        let mut embeddings = Vec::with_capacity(valid.len());
        for batch in valid.chunks(MAX_BATCH_SIZE) {
            embeddings.extend(self.request(batch).await?);
        }
        tracing::info!(
            model = %self.model,
            embeddings = embeddings.len(),
            "Generated embeddings"
        );
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(server: &MockServer, dimension: usize) -> OpenAiEmbeddingClient {
        OpenAiEmbeddingClient::new(
            server.base_url(),
            "sk-test",
            "text-embedding-3-small",
            dimension,
        )
        .expect("client")
    }

    #[tokio::test]
    async fn batch_results_follow_input_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .body_contains("text-embedding-3-small");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let vectors = client(&server, 2)
            .embed_batch(&["first".to_string(), "  ".to_string(), " second ".to_string()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    fn indexed_vectors(range: std::ops::Range<usize>) -> serde_json::Value {
        let data: Vec<serde_json::Value> = range
            .enumerate()
            .map(|(index, value)| json!({ "index": index, "embedding": [value as f32, 0.0] }))
            .collect();
        json!({ "data": data })
    }

    #[tokio::test]
    async fn large_inputs_are_split_into_ordered_batches() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .body_contains("\"text-000\"")
                    .body_contains("\"text-255\"");
                then.status(200).json_body(indexed_vectors(0..MAX_BATCH_SIZE));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .body_contains("\"text-256\"")
                    .body_contains("\"text-299\"");
                then.status(200).json_body(indexed_vectors(MAX_BATCH_SIZE..300));
            })
            .await;

        let texts: Vec<String> = (0..300).map(|i| format!("text-{i:03}")).collect();
        let vectors = client(&server, 2)
            .embed_batch(&texts)
            .await
            .expect("embeddings");

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(vectors.len(), 300);
        for (position, vector) in vectors.iter().enumerate() {
            assert_eq!(vector, &vec![position as f32, 0.0]);
        }
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_a_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200);
            })
            .await;

        let client = client(&server, 2);
        assert!(matches!(
            client.embed("   ").await,
            Err(EmbeddingClientError::EmptyInput(_))
        ));
        assert!(matches!(
            client.embed_batch(&[]).await,
            Err(EmbeddingClientError::EmptyInput(_))
        ));
        assert!(matches!(
            client.embed_batch(&[" ".to_string()]).await,
            Err(EmbeddingClientError::EmptyInput(_))
        ));
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("invalid api key");
            })
            .await;

        let error = client(&server, 2).embed("hello").await.unwrap_err();
        match error {
            EmbeddingClientError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({
                    "data": [{ "index": 0, "embedding": [0.5, 0.5, 0.5] }]
                }));
            })
            .await;

        let error = client(&server, 2).embed("hello").await.unwrap_err();
        assert!(matches!(
            error,
            EmbeddingClientError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn missing_vectors_are_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let error = client(&server, 2).embed("hello").await.unwrap_err();
        assert!(matches!(
            error,
            EmbeddingClientError::CountMismatch {
                expected: 1,
                actual: 0
            }
        ));
    }
}
