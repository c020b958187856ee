//! OpenAI-compatible embedding client

use crate::embedding::traits::EmbeddingProvider;
use crate::{EmbeddingError, EmbeddingResult};
use async_trait::async_trait;
use rephole_config::EmbeddingConfig;
use serde::{Deserialize, Serialize};

/// Character budget heuristic: roughly four characters per token
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for the `POST /embeddings` endpoint
#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Trim, collapse internal newlines to spaces, drop empties
    fn sanitize(text: &str) -> Option<String> {
        let cleaned: String = text
            .trim()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        if cleaned.is_empty() { None } else { Some(cleaned) }
    }

    /// Truncate to the model context using the char heuristic
    fn truncate(&self, text: String) -> String {
        let max_chars = self.config.max_tokens.saturating_mul(CHARS_PER_TOKEN);
        if text.chars().count() <= max_chars {
            return text;
        }
        tracing::warn!(
            max_chars,
            original_chars = text.chars().count(),
            "Truncating embedding input to model context"
        );
        text.chars().take(max_chars).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    #[tracing::instrument(skip(self, texts), fields(count = texts.len(), model = %self.config.model))]
    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let inputs: Vec<String> = texts
            .iter()
            .filter_map(|t| Self::sanitize(t))
            .map(|t| self.truncate(t))
            .collect();

        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut request = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&EmbeddingsRequest {
                model: &self.config.model,
                input: &inputs,
            });

        if let Some(org) = &self.config.organization_id {
            request = request.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.config.project_id {
            request = request.header("OpenAI-Project", project);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .map_or_else(|| "unknown error".to_string(), |e| e.message);
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingsResponse = response.json().await?;
        if body.data.len() != inputs.len() {
            return Err(EmbeddingError::MismatchedResponse {
                expected: inputs.len(),
                got: body.data.len(),
            });
        }

        // The backend tags each vector with its input index; order by it so
        // the output lines up with the inputs
        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str, max_tokens: usize) -> OpenAiEmbeddingClient {
        OpenAiEmbeddingClient::new(EmbeddingConfig {
            base_url: server_uri.to_string(),
            api_key: "sk-test".into(),
            organization_id: None,
            project_id: None,
            model: "text-embedding-3-small".into(),
            dimension: 3,
            max_tokens,
        })
    }

    #[test]
    fn sanitize_trims_and_collapses_newlines() {
        assert_eq!(
            OpenAiEmbeddingClient::sanitize("  fn a() {\n  body\r\n}  "),
            Some("fn a() {   body  }".to_string())
        );
        assert_eq!(OpenAiEmbeddingClient::sanitize("   \n  "), None);
        assert_eq!(OpenAiEmbeddingClient::sanitize(""), None);
    }

    #[tokio::test]
    async fn empty_input_never_calls_the_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 8000);
        let result = client.embed(&[]).await.unwrap();
        assert!(result.is_empty());

        let blank_only = vec!["   ".to_string(), "\n\n".to_string()];
        let result = client.embed(&blank_only).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn output_follows_input_order_even_when_response_is_shuffled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                    { "index": 0, "embedding": [1.0, 0.0, 0.0] },
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 8000);
        let texts = vec!["first".to_string(), "second".to_string()];
        let vectors = client.embed(&texts).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn long_input_is_truncated_to_the_char_budget() {
        let server = MockServer::start().await;
        // 2 tokens * 4 chars = 8 char budget
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "input": ["aaaaaaaa"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "index": 0, "embedding": [0.5, 0.5, 0.0] } ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 2);
        let texts = vec!["a".repeat(100)];
        let vectors = client.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 1);
    }

    #[tokio::test]
    async fn backend_errors_propagate_with_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "rate limited" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 8000);
        let err = client.embed(&["hello".to_string()]).await.unwrap_err();
        match err {
            EmbeddingError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn vector_count_mismatch_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "index": 0, "embedding": [1.0, 0.0, 0.0] } ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), 8000);
        let texts = vec!["one".to_string(), "two".to_string()];
        let err = client.embed(&texts).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::MismatchedResponse { expected: 2, got: 1 }
        ));
    }
}
