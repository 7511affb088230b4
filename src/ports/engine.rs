//! Generation engine port: the boundary to the text-to-image model.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::EngineFailure;

/// Input handed to an engine. The prompt is already validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRequest {
    /// Resolved model identifier (e.g., `"runwayml/stable-diffusion-v1-5"`).
    pub model: String,
    /// The text prompt describing the desired image.
    pub prompt: String,
}

/// An encoded image produced by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Encoded image bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// MIME type of `data` (e.g., `"image/png"`).
    pub mime_type: String,
}

/// Boxed future type returned by [`GenerationEngine::generate`].
pub type GenerateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<GeneratedImage, EngineFailure>> + Send + 'a>>;

/// Turns a prompt into an image.
///
/// Implementations may take seconds to minutes and are not required to be
/// safe for concurrent calls: the service only ever has one call in flight,
/// including calls whose caller has already given up.
pub trait GenerationEngine: Send + Sync {
    /// Generate one image for the given request.
    fn generate(&self, request: &EngineRequest) -> GenerateFuture<'_>;

    /// Whether dropping the future returned by [`GenerationEngine::generate`]
    /// stops all of the engine's work.
    ///
    /// Engines that hand work to blocking threads or external processes must
    /// keep the default; the service then waits for an abandoned call to
    /// finish before starting the next one.
    fn abortable(&self) -> bool {
        false
    }
}

/// Serde helper for serializing `Vec<u8>` as base64 strings in cassettes.
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
