//! Recording adapter for the `GenerationEngine` port.

use std::sync::{Arc, Mutex};

use super::record_result;
use crate::cassette::format::{ENGINE_PORT, GENERATE_METHOD};
use crate::cassette::recorder::CassetteRecorder;
use crate::ports::engine::{EngineRequest, GenerateFuture, GenerationEngine};

/// Records generation interactions while delegating to an inner engine.
pub struct RecordingEngine {
    inner: Box<dyn GenerationEngine>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingEngine {
    /// Creates a new recording engine wrapping the given implementation.
    pub fn new(inner: Box<dyn GenerationEngine>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl GenerationEngine for RecordingEngine {
    fn generate(&self, request: &EngineRequest) -> GenerateFuture<'_> {
        let request = request.clone();
        let recorder = Arc::clone(&self.recorder);

        Box::pin(async move {
            let result = self.inner.generate(&request).await;
            record_result(&recorder, ENGINE_PORT, GENERATE_METHOD, &request, &result);
            result
        })
    }

    fn abortable(&self) -> bool {
        self.inner.abortable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineFailure;
    use crate::ports::engine::GeneratedImage;

    struct FixedEngine(Result<GeneratedImage, EngineFailure>);

    impl GenerationEngine for FixedEngine {
        fn generate(&self, _request: &EngineRequest) -> GenerateFuture<'_> {
            let result = self.0.clone();
            Box::pin(async move { result })
        }
    }

    fn request() -> EngineRequest {
        EngineRequest { model: "owner/model".into(), prompt: "a fox".into() }
    }

    #[tokio::test]
    async fn records_success_and_passes_result_through() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(
            dir.path().join("c.yaml"),
            "t",
            "c",
        )));
        let image = GeneratedImage { data: vec![7, 7], mime_type: "image/png".into() };
        let engine =
            RecordingEngine::new(Box::new(FixedEngine(Ok(image.clone()))), Arc::clone(&recorder));

        assert_eq!(engine.generate(&request()).await.unwrap(), image);
        drop(engine);

        let recorder = Arc::try_unwrap(recorder).unwrap().into_inner().unwrap();
        let path = recorder.finish().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("a fox"));
        assert!(content.contains("Ok"));
        assert!(content.contains("Bwc=")); // base64 of [7, 7]
    }

    #[test]
    fn abortability_follows_inner_engine() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(dir.path().join("c.yaml"), "t", "c")));
        let fixed = RecordingEngine::new(
            Box::new(FixedEngine(Err(EngineFailure::permanent("x")))),
            Arc::clone(&recorder),
        );
        assert!(!fixed.abortable());

        let live = RecordingEngine::new(
            Box::new(crate::adapters::live::huggingface::HuggingFaceEngine::new(None)),
            recorder,
        );
        assert!(live.abortable());
    }

    #[tokio::test]
    async fn records_failure_with_retryable_flag() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(
            dir.path().join("c.yaml"),
            "t",
            "c",
        )));
        let failure = EngineFailure::transient("model loading");
        let engine = RecordingEngine::new(
            Box::new(FixedEngine(Err(failure.clone()))),
            Arc::clone(&recorder),
        );

        assert_eq!(engine.generate(&request()).await.unwrap_err(), failure);
        assert_eq!(recorder.lock().unwrap().len(), 1);
    }
}
