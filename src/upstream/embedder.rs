//! HTTP client for the vector-embedding endpoint.
//!
//! One call shape: a single text in, one vector out. Failures share the
//! [`UpstreamError`] taxonomy of the generative client so the orchestrator
//! handles both the same way.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::UpstreamError;

/// Abstraction over the embedding endpoint; the embedding cache takes the
/// real client or a test mock as its compute function.
pub trait Embedder: Send + Sync + 'static {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, UpstreamError>> + Send;

    /// Model version string, part of every cache key.
    fn model_version(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedRow>,
}

#[derive(Debug, Deserialize)]
struct EmbedRow {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");
        Self {
            api_key,
            client,
            base_url,
            model,
        }
    }

    async fn send(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let req = EmbedRequest {
            model: &self.model,
            input: vec![text],
        };
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(UpstreamError::Auth {
                status: status.as_u16(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited {
                retry_after_ms: 1000,
            });
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            if status.is_server_error() {
                return Err(UpstreamError::Server {
                    status: status.as_u16(),
                    message,
                });
            }
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<EmbedResponse>().await?;
        body.data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| UpstreamError::Parse("embedding response had no rows".into()))
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, UpstreamError>> + Send {
        self.send(text)
    }

    fn model_version(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_first_embedding_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new("sk-test".into(), server.uri(), "embed-v2".into());
        let vec = embedder.embed("some answer").await.unwrap();
        assert_eq!(vec, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.model_version(), "embed-v2");
    }

    #[tokio::test]
    async fn empty_rows_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new("sk-test".into(), server.uri(), "embed-v2".into());
        let err = embedder.embed("some answer").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Parse(_)));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new("sk-test".into(), server.uri(), "embed-v2".into());
        let err = embedder.embed("some answer").await.unwrap_err();
        assert!(err.is_transient());
    }
}
