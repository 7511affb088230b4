//! Generation service: prompt validation, admission control and the single
//! worker that owns the engine.
//!
//! Requests are queued FIFO on a channel consumed by one worker task, so at
//! most one engine call is in flight per service. Each caller waits on its
//! own completion channel under the configured timeout. A caller that gives
//! up closes that channel; the worker notices and skips the job, or cancels
//! an abortable engine call, and nothing is written for it. An abandoned call
//! keeps the slot and its admission permit until the engine has stopped.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{EngineFailure, ServiceError};
use crate::output::{encode_as, OutputStore};
use crate::params::OutputFormat;
use crate::ports::{EngineRequest, GeneratedImage, GenerationEngine};

/// Validation, queueing and output settings for a [`GenerationService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePolicy {
    /// Cap on outstanding requests, the in-flight one included.
    /// `None` queues without limit.
    pub max_queue_depth: Option<usize>,
    /// How long a caller waits (queue time plus generation time).
    pub timeout: Duration,
    /// Substituted for empty prompts. `None` rejects them.
    pub default_prompt: Option<String>,
    /// Longest accepted prompt, in characters.
    pub max_prompt_chars: usize,
    /// Encoding of stored images.
    pub output_format: OutputFormat,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            max_queue_depth: None,
            timeout: Duration::from_secs(120),
            default_prompt: None,
            max_prompt_chars: 2000,
            output_format: OutputFormat::Png,
        }
    }
}

impl ServicePolicy {
    /// Trim the prompt, fall back to the default when it is empty, and
    /// enforce the length bound.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for an empty prompt with no
    /// default configured, or for a prompt over the length limit.
    pub fn resolve_prompt(&self, prompt: Option<&str>) -> Result<String, ServiceError> {
        let trimmed = prompt.map(str::trim).unwrap_or_default();
        let prompt = if trimmed.is_empty() {
            let Some(default) = &self.default_prompt else {
                return Err(ServiceError::Validation("prompt must not be empty".to_string()));
            };
            debug!("Empty prompt; using configured default");
            default.trim()
        } else {
            trimmed
        };

        let chars = prompt.chars().count();
        if chars > self.max_prompt_chars {
            return Err(ServiceError::Validation(format!(
                "prompt is {chars} characters; the limit is {}",
                self.max_prompt_chars
            )));
        }
        Ok(prompt.to_string())
    }
}

/// One inbound generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Text prompt. Absent or blank means "use the configured default".
    #[serde(default, alias = "description")]
    pub prompt: Option<String>,
}

impl GenerationRequest {
    /// A request for the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: Some(prompt.into()) }
    }
}

/// A successfully generated and persisted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    /// Where the image was written.
    pub output_path: PathBuf,
    /// Size of the written file.
    pub size_bytes: u64,
    /// When the image was persisted.
    pub generated_at: DateTime<Utc>,
    /// MIME type of the written file.
    pub mime_type: String,
}

type Reply = oneshot::Sender<Result<GenerationResult, ServiceError>>;

struct Job {
    prompt: String,
    reply: Reply,
    permit: Option<OwnedSemaphorePermit>,
}

/// Serializes generation requests into a single engine.
pub struct GenerationService {
    policy: ServicePolicy,
    model: String,
    admission: Option<Arc<Semaphore>>,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GenerationService {
    /// Spawn the worker that owns `engine` and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime. The engine is dropped
    /// when the worker exits after [`GenerationService::shutdown`].
    pub fn start(
        engine: Arc<dyn GenerationEngine>,
        store: Arc<OutputStore>,
        model: impl Into<String>,
        policy: ServicePolicy,
    ) -> Self {
        let model = model.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            engine,
            store,
            model: model.clone(),
            output_format: policy.output_format,
        };
        let handle = tokio::spawn(worker.run(rx));

        Self {
            admission: policy.max_queue_depth.map(|depth| Arc::new(Semaphore::new(depth))),
            policy,
            model,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// The policy this service enforces.
    #[must_use]
    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    /// The model identifier handed to the engine.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate and persist one image.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] if the prompt is rejected (engine not called)
    /// - [`ServiceError::Busy`] if the outstanding-request cap is reached
    /// - [`ServiceError::Timeout`] if no result arrives within the policy timeout
    /// - [`ServiceError::Engine`] with the engine's failure, unchanged
    /// - [`ServiceError::Codec`] or [`ServiceError::Storage`] if persisting fails
    /// - [`ServiceError::Unavailable`] after shutdown
    pub async fn submit(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, ServiceError> {
        let prompt = self.policy.resolve_prompt(request.prompt.as_deref())?;

        let permit = match &self.admission {
            Some(semaphore) => Some(Arc::clone(semaphore).try_acquire_owned().map_err(|_| {
                ServiceError::Busy { limit: self.policy.max_queue_depth.unwrap_or_default() }
            })?),
            None => None,
        };

        let (reply, completion) = oneshot::channel();
        self.enqueue(Job { prompt, reply, permit })?;

        match tokio::time::timeout(self.policy.timeout, completion).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                Err(ServiceError::Unavailable("generation worker stopped before replying".into()))
            }
            Err(_) => {
                warn!(timeout_secs = self.policy.timeout.as_secs_f64(), "Generation timed out");
                Err(ServiceError::Timeout(self.policy.timeout))
            }
        }
    }

    fn enqueue(&self, job: Job) -> Result<(), ServiceError> {
        let guard = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard
            .as_ref()
            .ok_or_else(|| ServiceError::Unavailable("service is shut down".into()))?;
        sender
            .send(job)
            .map_err(|_| ServiceError::Unavailable("generation worker is not running".into()))
    }

    /// Stop accepting requests, let the worker finish what is already queued,
    /// and release the engine.
    pub async fn shutdown(&self) {
        drop(self.jobs.lock().unwrap_or_else(PoisonError::into_inner).take());
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Generation worker ended abnormally: {e}");
            }
        }
    }
}

struct Worker {
    engine: Arc<dyn GenerationEngine>,
    store: Arc<OutputStore>,
    model: String,
    output_format: OutputFormat,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        info!(model = %self.model, "Generation worker started");
        while let Some(job) = jobs.recv().await {
            self.handle(job).await;
        }
        info!("Generation worker stopped");
    }

    async fn handle(&self, job: Job) {
        let Job { prompt, mut reply, permit } = job;

        if reply.is_closed() {
            info!("Skipping queued request; caller already gave up");
            return;
        }

        let started = Instant::now();
        info!(prompt_chars = prompt.chars().count(), "Generation started");

        let request = EngineRequest { model: self.model.clone(), prompt };
        let mut engine_task = {
            let engine = Arc::clone(&self.engine);
            let request = request.clone();
            tokio::spawn(async move { engine.generate(&request).await })
        };

        let finished = tokio::select! {
            joined = &mut engine_task => Some(joined),
            () = reply.closed() => None,
        };
        let Some(outcome) = finished else {
            self.abandon(engine_task, started).await;
            drop(permit);
            return;
        };

        let result = match outcome {
            Ok(Ok(image)) if image.data.is_empty() => {
                Err(ServiceError::Engine(EngineFailure::permanent("engine returned an empty image")))
            }
            Ok(Ok(image)) => self.persist(request.prompt, image).await,
            Ok(Err(failure)) => Err(ServiceError::Engine(failure)),
            Err(e) if e.is_panic() => {
                Err(ServiceError::Engine(EngineFailure::permanent("engine panicked during generation")))
            }
            Err(e) => Err(ServiceError::Engine(EngineFailure::permanent(format!(
                "engine task failed: {e}"
            )))),
        };

        match &result {
            Ok(done) => info!(
                elapsed_ms = elapsed_ms(started),
                path = %done.output_path.display(),
                size_bytes = done.size_bytes,
                "Generation finished"
            ),
            Err(e) => warn!(elapsed_ms = elapsed_ms(started), kind = e.kind(), "Generation failed: {e}"),
        }

        drop(permit);
        if let Err(Ok(orphan)) = reply.send(result) {
            // The caller timed out while the image was being written.
            match std::fs::remove_file(&orphan.output_path) {
                Ok(()) => info!(path = %orphan.output_path.display(), "Removed unclaimed image"),
                Err(e) => warn!(path = %orphan.output_path.display(), "Failed to remove unclaimed image: {e}"),
            }
        }
    }

    /// Stop or outlast an engine call whose caller is gone.
    ///
    /// Returns only once the engine has no work left, so the next job never
    /// overlaps with it. Whatever the call produced is discarded.
    async fn abandon(
        &self,
        engine_task: JoinHandle<Result<GeneratedImage, EngineFailure>>,
        started: Instant,
    ) {
        if self.engine.abortable() {
            engine_task.abort();
            let _ = engine_task.await;
            info!(elapsed_ms = elapsed_ms(started), "Caller gave up; generation cancelled");
        } else {
            info!("Caller gave up; waiting for the engine to finish before the next job");
            let _ = engine_task.await;
            info!(elapsed_ms = elapsed_ms(started), "Abandoned generation finished; result discarded");
        }
    }

    async fn persist(
        &self,
        prompt: String,
        image: GeneratedImage,
    ) -> Result<GenerationResult, ServiceError> {
        let store = Arc::clone(&self.store);
        let format = self.output_format;
        tokio::task::spawn_blocking(move || -> Result<GenerationResult, ServiceError> {
            let bytes = encode_as(&image, format).map_err(ServiceError::Codec)?;
            let output_path = store.save(&bytes, &prompt, format.extension())?;
            Ok(GenerationResult {
                output_path,
                size_bytes: bytes.len() as u64,
                generated_at: Utc::now(),
                mime_type: format.mime_type().to_string(),
            })
        })
        .await
        .unwrap_or_else(|e| Err(ServiceError::Unavailable(format!("persist task failed: {e}"))))
    }
}

fn elapsed_ms(started: Instant) -> u128 {
    started.elapsed().as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ServicePolicy {
        ServicePolicy { max_prompt_chars: 10, ..ServicePolicy::default() }
    }

    #[test]
    fn prompt_is_trimmed() {
        assert_eq!(policy().resolve_prompt(Some("  a cat \n")).unwrap(), "a cat");
    }

    #[test]
    fn blank_prompt_without_default_is_rejected() {
        for prompt in [None, Some(""), Some("   \t")] {
            let err = policy().resolve_prompt(prompt).unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{prompt:?}: {err:?}");
        }
    }

    #[test]
    fn blank_prompt_uses_default_when_configured() {
        let policy = ServicePolicy { default_prompt: Some(" sunset ".into()), ..policy() };
        assert_eq!(policy.resolve_prompt(None).unwrap(), "sunset");
        assert_eq!(policy.resolve_prompt(Some(" ")).unwrap(), "sunset");
        assert_eq!(policy.resolve_prompt(Some("a cat")).unwrap(), "a cat");
    }

    #[test]
    fn overlong_prompt_is_rejected() {
        let err = policy().resolve_prompt(Some("abcdefghijk")).unwrap_err();
        assert!(err.to_string().contains("the limit is 10"));
    }

    #[test]
    fn length_is_counted_in_characters() {
        assert!(policy().resolve_prompt(Some("éééééééééé")).is_ok());
    }

    #[test]
    fn request_accepts_description_alias() {
        let request: GenerationRequest =
            serde_json::from_str(r#"{"description": "a red fox"}"#).unwrap();
        assert_eq!(request.prompt.as_deref(), Some("a red fox"));

        let empty: GenerationRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.prompt.is_none());
    }
}
