use crate::ports::Embedder;
use async_trait::async_trait;
use geosite_core::error::{GeositeError, Result};
use serde::{Deserialize, Serialize};

/// Embedding client for a local Ollama server.
///
/// Uses the batched `/api/embed` endpoint, one request per call.
pub struct OllamaEmbedder {
    /// e.g. "http://localhost:11434", without trailing slash
    base_url: String,
    model: String,

    /// Advertised dimensions; the server's actual output wins
    dimensions: usize,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
            client: reqwest::Client::new(),
        }
    }

    fn unavailable(&self, reason: String) -> GeositeError {
        GeositeError::EmbedderUnavailable {
            reason,
            remediation: format!(
                "Start Ollama at {} and run 'ollama pull {}'",
                self.base_url, self.model
            ),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| self.unavailable(format!("cannot reach the embedding server: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("embedding server returned {}: {}", status, body)));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| GeositeError::MalformedResponse {
            reason: format!("embedding response is not valid JSON: {}", e),
        })?;

        if body.embeddings.len() != texts.len() || body.embeddings.iter().any(Vec::is_empty) {
            return Err(GeositeError::MalformedResponse {
                reason: format!(
                    "model '{}' returned {} vectors for {} texts",
                    self.model,
                    body.embeddings.len(),
                    texts.len()
                ),
            });
        }

        tracing::debug!(model = %self.model, count = texts.len(), "Embedded batch");
        Ok(body.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let embedder = OllamaEmbedder::new("http://custom:11434/", "nomic-embed-text", 768);
        assert_eq!(embedder.base_url, "http://custom:11434");
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.dimensions(), 768);
    }

    #[test]
    fn test_request_shape() {
        let texts = ["地块A", "地块B"];
        let body = serde_json::to_value(EmbedRequest { model: "m", input: &texts }).unwrap();
        assert_eq!(body, serde_json::json!({ "model": "m", "input": ["地块A", "地块B"] }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "test-model", 8);
        let result = embedder.embed(&["hello"]).await;
        assert!(matches!(result, Err(GeositeError::EmbedderUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_requests() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "test-model", 8);
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
