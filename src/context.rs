//! Engine context: builds the generation engine handle for the chosen mode.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::adapters::live::huggingface::HuggingFaceEngine;
use crate::adapters::live::openai::OpenAiEngine;
use crate::adapters::recording::engine::RecordingEngine;
use crate::adapters::replaying::engine::ReplayingEngine;
use crate::cassette::recorder::CassetteRecorder;
use crate::cassette::replayer::CassetteReplayer;
use crate::config::Config;
use crate::error::StartupError;
use crate::model::Provider;
use crate::ports::GenerationEngine;

/// Directory recording sessions write their cassettes under.
const CASSETTE_ROOT: &str = ".imagen-server/cassettes";

/// How the engine handle was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMode {
    /// Calls the provider's API.
    Live,
    /// Calls the provider's API and records every interaction.
    Recording,
    /// Serves interactions from a cassette file; no network.
    Replaying(PathBuf),
}

impl EngineMode {
    /// Pick the mode from `IMAGEN_REPLAY` / `IMAGEN_REC`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("IMAGEN_REPLAY").ok().as_deref(),
            std::env::var("IMAGEN_REC").ok().as_deref(),
        )
    }

    fn from_vars(replay: Option<&str>, record: Option<&str>) -> Self {
        if let Some(path) = replay.filter(|p| !p.is_empty()) {
            Self::Replaying(PathBuf::from(path))
        } else if record.is_some_and(|v| v == "true" || v == "1") {
            Self::Recording
        } else {
            Self::Live
        }
    }
}

/// Owns the engine handle until it is handed to the service.
pub struct EngineContext {
    /// Generation engine port.
    pub engine: Box<dyn GenerationEngine>,
}

/// Handle to a recording session that must be finished after use.
pub struct RecordingSession {
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingSession {
    /// Finish the recording and write the cassette file to disk.
    ///
    /// Call after the service has shut down so the engine has released its
    /// reference to the recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be written.
    pub fn finish(self) -> Result<PathBuf, String> {
        let recorder = Arc::try_unwrap(self.recorder)
            .map_err(|_| "Recording engine still has references".to_string())?
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        recorder.finish().map_err(|e| format!("Failed to write cassette: {e}"))
    }
}

impl EngineContext {
    /// Build the context for `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if an API key is missing or the cassette cannot be loaded.
    pub fn for_mode(
        mode: &EngineMode,
        provider: Provider,
        config: &Config,
    ) -> Result<(Self, Option<RecordingSession>), StartupError> {
        match mode {
            EngineMode::Live => Ok((Self::live(provider, config)?, None)),
            EngineMode::Recording => {
                let (ctx, session) = Self::recording(provider, config)?;
                Ok((ctx, Some(session)))
            }
            EngineMode::Replaying(path) => Ok((Self::replaying(path)?, None)),
        }
    }

    /// Create a live context for the given provider.
    ///
    /// A key is required for the hosted APIs; a custom endpoint may run
    /// without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not configured.
    pub fn live(provider: Provider, config: &Config) -> Result<Self, StartupError> {
        let endpoint = config.engine.endpoint.clone();
        let key = match provider {
            Provider::HuggingFace => config.huggingface_key(),
            Provider::OpenAi => config.openai_key(),
        };
        if key.is_none() && endpoint.is_none() {
            return Err(StartupError::MissingApiKey {
                provider: provider.name().into(),
                env_var: provider.key_env_var().into(),
            });
        }

        let engine: Box<dyn GenerationEngine> = match provider {
            Provider::HuggingFace => {
                let engine = HuggingFaceEngine::new(key);
                Box::new(match endpoint {
                    Some(url) => engine.with_endpoint(url),
                    None => engine,
                })
            }
            Provider::OpenAi => {
                let engine = OpenAiEngine::new(key, config.engine.size.clone());
                Box::new(match endpoint {
                    Some(url) => engine.with_endpoint(url),
                    None => engine,
                })
            }
        };
        Ok(Self { engine })
    }

    /// Create a recording context that wraps a live engine with a recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the live engine cannot be created.
    pub fn recording(
        provider: Provider,
        config: &Config,
    ) -> Result<(Self, RecordingSession), StartupError> {
        let live_ctx = Self::live(provider, config)?;

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let path = PathBuf::from(CASSETTE_ROOT)
            .join(&timestamp)
            .join("generation_engine.cassette.yaml");
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(
            path,
            format!("{timestamp}-generation_engine"),
            get_commit_hash(),
        )));

        let engine = RecordingEngine::new(live_ctx.engine, Arc::clone(&recorder));
        Ok((Self { engine: Box::new(engine) }, RecordingSession { recorder }))
    }

    /// Create a replaying context from a cassette file.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be loaded.
    pub fn replaying(path: &Path) -> Result<Self, StartupError> {
        let replayer = CassetteReplayer::open(path).map_err(StartupError::Cassette)?;
        let engine = ReplayingEngine::new(Arc::new(Mutex::new(replayer)));
        Ok(Self { engine: Box::new(engine) })
    }

    /// Hand the engine over as a shareable handle.
    #[must_use]
    pub fn into_engine(self) -> Arc<dyn GenerationEngine> {
        Arc::from(self.engine)
    }
}

/// Get the current git commit hash, or "unknown" if unavailable.
fn get_commit_hash() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_defaults_to_live() {
        assert_eq!(EngineMode::from_vars(None, None), EngineMode::Live);
        assert_eq!(EngineMode::from_vars(None, Some("0")), EngineMode::Live);
        assert_eq!(EngineMode::from_vars(Some(""), None), EngineMode::Live);
    }

    #[test]
    fn mode_recording() {
        assert_eq!(EngineMode::from_vars(None, Some("1")), EngineMode::Recording);
        assert_eq!(EngineMode::from_vars(None, Some("true")), EngineMode::Recording);
    }

    #[test]
    fn replay_wins_over_recording() {
        assert_eq!(
            EngineMode::from_vars(Some("c.yaml"), Some("1")),
            EngineMode::Replaying(PathBuf::from("c.yaml"))
        );
    }

    #[test]
    fn custom_endpoint_needs_no_key() {
        let mut config = Config::default();
        config.engine.endpoint = Some("http://127.0.0.1:1/generate".into());
        config.keys.huggingface = None;
        assert!(EngineContext::live(Provider::HuggingFace, &config).is_ok());
    }

    #[test]
    fn missing_cassette_is_startup_error() {
        let result = EngineContext::replaying(Path::new("/nonexistent/c.yaml"));
        assert!(matches!(result, Err(StartupError::Cassette(_))));
    }
}
