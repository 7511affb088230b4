//! Live adapter for the `OpenAI` Images API and OpenAI-compatible servers.

use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use super::{status_failure, truncate_body};
use crate::error::EngineFailure;
use crate::ports::engine::{EngineRequest, GenerateFuture, GeneratedImage, GenerationEngine};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/images/generations";

/// Engine that calls an `/v1/images/generations` endpoint.
pub struct OpenAiEngine {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    size: String,
}

impl OpenAiEngine {
    /// Create an engine for the `OpenAI` API producing `size` images (e.g. `1024x1024`).
    #[must_use]
    pub fn new(api_key: Option<String>, size: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: OPENAI_API_URL.to_string(),
            size: size.into(),
        }
    }

    /// Send requests to an OpenAI-compatible server instead.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(&self, request: &EngineRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "n": 1,
            "size": self.size,
        });
        // gpt-image models always answer with base64 and reject the field.
        if !request.model.starts_with("gpt-image") {
            body["response_format"] = serde_json::json!("b64_json");
        }
        body
    }
}

impl GenerationEngine for OpenAiEngine {
    fn generate(&self, request: &EngineRequest) -> GenerateFuture<'_> {
        let body = self.request_body(request);
        Box::pin(async move {
            let mut builder = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }
            let response = builder.send().await?;

            let status = response.status();
            let response_text = response.text().await?;

            if !status.is_success() {
                return Err(status_failure(
                    status,
                    format!("API error ({status}): {}", truncate_body(&response_text)),
                ));
            }

            let parsed: OpenAiResponse = serde_json::from_str(&response_text).map_err(|e| {
                EngineFailure::permanent(format!("Failed to parse response: {e}"))
            })?;

            let encoded = parsed.data.into_iter().find_map(|item| item.b64_json).ok_or_else(|| {
                EngineFailure::permanent(format!(
                    "No images in response. Body: {}",
                    truncate_body(&response_text)
                ))
            })?;

            let data = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| EngineFailure::permanent(format!("Failed to decode base64: {e}")))?;

            Ok(GeneratedImage { data, mime_type: "image/png".to_string() })
        })
    }

    fn abortable(&self) -> bool {
        true
    }
}

// --- OpenAI API response types ---

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiImageData>,
}

#[derive(Deserialize)]
struct OpenAiImageData {
    b64_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/images/generations")
    }

    fn request(model: &str) -> EngineRequest {
        EngineRequest { model: model.into(), prompt: "a red bicycle".into() }
    }

    #[test]
    fn body_for_gpt_image_omits_response_format() {
        let engine = OpenAiEngine::new(None, "1024x1024");
        let body = engine.request_body(&request("gpt-image-1"));
        assert_eq!(body["model"], "gpt-image-1");
        assert_eq!(body["prompt"], "a red bicycle");
        assert_eq!(body["size"], "1024x1024");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn body_for_other_models_requests_base64() {
        let engine = OpenAiEngine::new(None, "512x512");
        let body = engine.request_body(&request("dall-e-3"));
        assert_eq!(body["response_format"], "b64_json");
        assert_eq!(body["n"], 1);
    }

    #[tokio::test]
    async fn decodes_base64_payload() {
        let router = Router::new().route(
            "/v1/images/generations",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["prompt"], "a red bicycle");
                Json(serde_json::json!({"data": [{"b64_json": "AQID"}]}))
            }),
        );
        let url = serve(router).await;

        let engine = OpenAiEngine::new(Some("sk-test".into()), "1024x1024").with_endpoint(url);
        let image = engine.generate(&request("flux-local")).await.unwrap();

        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn client_error_is_not_retryable() {
        let router = Router::new().route(
            "/v1/images/generations",
            post(|| async { (StatusCode::BAD_REQUEST, r#"{"error":{"message":"content policy"}}"#) }),
        );
        let url = serve(router).await;

        let engine = OpenAiEngine::new(None, "1024x1024").with_endpoint(url);
        let failure = engine.generate(&request("dall-e-3")).await.unwrap_err();

        assert!(!failure.retryable);
        assert!(failure.message.contains("content policy"));
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let router = Router::new().route(
            "/v1/images/generations",
            post(|| async { Json(serde_json::json!({"data": []})) }),
        );
        let url = serve(router).await;

        let engine = OpenAiEngine::new(None, "1024x1024").with_endpoint(url);
        let failure = engine.generate(&request("dall-e-3")).await.unwrap_err();
        assert!(failure.message.contains("No images in response"));
    }
}
