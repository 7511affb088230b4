//! Live adapter for the Hugging Face Inference API.
//!
//! Text-to-image models on the Inference API take `{"inputs": "<prompt>"}`
//! and answer with the raw encoded image. Self-hosted inference endpoints
//! speak the same protocol, so the URL can be overridden.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;

use super::{status_failure, truncate_body};
use crate::error::EngineFailure;
use crate::ports::engine::{EngineRequest, GenerateFuture, GeneratedImage, GenerationEngine};

const HF_API_BASE: &str = "https://api-inference.huggingface.co/models";

/// Engine that calls a Hugging Face text-to-image model over HTTP.
pub struct HuggingFaceEngine {
    client: Client,
    api_key: Option<String>,
    endpoint: Option<String>,
}

impl HuggingFaceEngine {
    /// Create an engine for the hosted Inference API.
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self { client: Client::new(), api_key, endpoint: None }
    }

    /// Send requests to `endpoint` instead of the hosted model URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn url(&self, model: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("{HF_API_BASE}/{model}"),
        }
    }
}

impl GenerationEngine for HuggingFaceEngine {
    fn generate(&self, request: &EngineRequest) -> GenerateFuture<'_> {
        let url = self.url(&request.model);
        let body = serde_json::json!({ "inputs": request.prompt });
        Box::pin(async move {
            let mut builder = self.client.post(&url).header(ACCEPT, "image/png").json(&body);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }
            let response = builder.send().await?;

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(status_failure(status, describe_error(status.as_u16(), &text)));
            }

            if !content_type.starts_with("image/") {
                let text = response.text().await.unwrap_or_default();
                return Err(EngineFailure::permanent(format!(
                    "Expected an image, got '{content_type}': {}",
                    truncate_body(&text)
                )));
            }

            let data = response.bytes().await?.to_vec();
            if data.is_empty() {
                return Err(EngineFailure::permanent("Engine returned an empty image"));
            }
            let mime_type = content_type.split(';').next().unwrap_or_default().trim().to_string();
            Ok(GeneratedImage { data, mime_type })
        })
    }

    fn abortable(&self) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct HfErrorBody {
    error: String,
    estimated_time: Option<f64>,
}

/// Turn an error response into a readable message.
fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<HfErrorBody>(body) {
        Ok(HfErrorBody { error, estimated_time: Some(eta) }) => {
            format!("Hugging Face API error ({status}): {error} (estimated time {eta:.0}s)")
        }
        Ok(HfErrorBody { error, estimated_time: None }) => {
            format!("Hugging Face API error ({status}): {error}")
        }
        Err(_) => format!("Hugging Face API error ({status}): {}", truncate_body(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::routing::post;
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/models/test")
    }

    fn request(prompt: &str) -> EngineRequest {
        EngineRequest { model: "owner/model".into(), prompt: prompt.into() }
    }

    #[test]
    fn hosted_url_includes_model() {
        let engine = HuggingFaceEngine::new(None);
        assert_eq!(
            engine.url("stabilityai/stable-diffusion-2"),
            "https://api-inference.huggingface.co/models/stabilityai/stable-diffusion-2"
        );
    }

    #[test]
    fn endpoint_override_replaces_url() {
        let engine = HuggingFaceEngine::new(None).with_endpoint("http://gpu-box:8080/");
        assert_eq!(engine.url("ignored/model"), "http://gpu-box:8080/");
    }

    #[test]
    fn describe_loading_error() {
        let msg = describe_error(503, r#"{"error":"Model is currently loading","estimated_time":20.0}"#);
        assert_eq!(msg, "Hugging Face API error (503): Model is currently loading (estimated time 20s)");
    }

    #[test]
    fn describe_plain_text_error() {
        assert_eq!(describe_error(502, "Bad Gateway"), "Hugging Face API error (502): Bad Gateway");
    }

    #[tokio::test]
    async fn returns_image_bytes_and_mime() {
        let router = Router::new().route(
            "/models/test",
            post(|body: String| async move {
                assert!(body.contains("\"inputs\":\"a lighthouse\""));
                ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xFF, 0xD8, 0xFF, 0xE0])
            }),
        );
        let url = serve(router).await;

        let engine = HuggingFaceEngine::new(Some("hf_test".into())).with_endpoint(url);
        let image = engine.generate(&request("a lighthouse")).await.unwrap();

        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[tokio::test]
    async fn model_loading_is_retryable() {
        let router = Router::new().route(
            "/models/test",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    r#"{"error":"Model is currently loading","estimated_time":12.5}"#,
                )
            }),
        );
        let url = serve(router).await;

        let engine = HuggingFaceEngine::new(None).with_endpoint(url);
        let failure = engine.generate(&request("x")).await.unwrap_err();

        assert!(failure.retryable);
        assert!(failure.message.contains("Model is currently loading"));
    }

    #[tokio::test]
    async fn json_success_body_is_rejected() {
        let router = Router::new().route(
            "/models/test",
            post(|| async { ([(header::CONTENT_TYPE, "application/json")], r#"{"warning":"nsfw"}"#) }),
        );
        let url = serve(router).await;

        let engine = HuggingFaceEngine::new(None).with_endpoint(url);
        let failure = engine.generate(&request("x")).await.unwrap_err();

        assert!(!failure.retryable);
        assert!(failure.message.contains("Expected an image"));
    }
}
