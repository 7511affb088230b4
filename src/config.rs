//! Configuration file loading with environment variable overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::params::OutputFormat;
use crate::service::ServicePolicy;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Queueing, validation and output settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Engine selection.
    #[serde(default)]
    pub engine: EngineConfig,

    /// API key configuration.
    #[serde(default)]
    pub keys: KeysConfig,
}

/// HTTP listener settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 9001 }
    }
}

/// Queueing, validation and output settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Directory generated images are written to (`OUTPUT_DIR`).
    pub output_dir: PathBuf,
    /// Cap on outstanding requests, in-flight one included (`MAX_QUEUE_DEPTH`).
    /// `None` queues without limit.
    pub max_queue_depth: Option<usize>,
    /// Seconds a caller waits for its image (`GENERATION_TIMEOUT`).
    pub timeout_secs: u64,
    /// Prompt used when a request has none (`DEFAULT_PROMPT`).
    /// `None` rejects empty prompts instead.
    pub default_prompt: Option<String>,
    /// Longest accepted prompt, in characters.
    pub max_prompt_chars: usize,
    /// Encoding of stored images (`OUTPUT_FORMAT`).
    pub output_format: OutputFormat,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated"),
            max_queue_depth: None,
            timeout_secs: 120,
            default_prompt: None,
            max_prompt_chars: 2000,
            output_format: OutputFormat::Png,
        }
    }
}

impl GenerationConfig {
    /// Maximum time a caller waits for a result.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Service policy derived from these settings.
    #[must_use]
    pub fn policy(&self) -> ServicePolicy {
        ServicePolicy {
            max_queue_depth: self.max_queue_depth,
            timeout: self.timeout(),
            default_prompt: self.default_prompt.clone(),
            max_prompt_chars: self.max_prompt_chars,
            output_format: self.output_format,
        }
    }
}

/// Engine selection.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model name or short alias (`IMAGEN_MODEL`).
    pub model: String,
    /// Override for the provider's API URL (self-hosted servers).
    pub endpoint: Option<String>,
    /// Requested image size for OpenAI-style engines.
    pub size: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { model: "sd-1.5".to_string(), endpoint: None, size: "1024x1024".to_string() }
    }
}

/// API key configuration.
#[derive(Debug, Default, Deserialize)]
pub struct KeysConfig {
    /// Hugging Face access token.
    pub huggingface: Option<String>,
    /// `OpenAI` API key.
    pub openai: Option<String>,
}

impl Config {
    /// Load configuration from the given path, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparseable value.
    pub fn apply_env(&mut self) -> Result<(), String> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to read variables.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparseable value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("OUTPUT_DIR") {
            self.generation.output_dir = PathBuf::from(dir);
        }
        if let Some(depth) = var("MAX_QUEUE_DEPTH") {
            let depth = depth
                .trim()
                .parse()
                .map_err(|e| format!("MAX_QUEUE_DEPTH must be a positive integer: {e}"))?;
            self.generation.max_queue_depth = Some(depth);
        }
        if let Some(timeout) = var("GENERATION_TIMEOUT") {
            self.generation.timeout_secs = timeout
                .trim()
                .parse()
                .map_err(|e| format!("GENERATION_TIMEOUT must be a number of seconds: {e}"))?;
        }
        if let Some(prompt) = var("DEFAULT_PROMPT") {
            self.generation.default_prompt = Some(prompt);
        }
        if let Some(format) = var("OUTPUT_FORMAT") {
            self.generation.output_format = format.parse()?;
        }
        if let Some(model) = var("IMAGEN_MODEL") {
            self.engine.model = model;
        }
        Ok(())
    }

    /// Check cross-field constraints after all layers are applied.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        let generation = &self.generation;
        match generation.max_queue_depth {
            Some(0) => return Err("max_queue_depth must be at least 1".to_string()),
            Some(depth) if depth > Semaphore::MAX_PERMITS => {
                return Err(format!(
                    "max_queue_depth {depth} is too large; the limit is {}",
                    Semaphore::MAX_PERMITS
                ));
            }
            _ => {}
        }
        if generation.timeout_secs == 0 {
            return Err("timeout_secs must be at least 1".to_string());
        }
        if generation.max_prompt_chars == 0 {
            return Err("max_prompt_chars must be at least 1".to_string());
        }
        if let Some(prompt) = &generation.default_prompt {
            let prompt = prompt.trim();
            if prompt.is_empty() {
                return Err("default_prompt must not be blank".to_string());
            }
            if prompt.chars().count() > generation.max_prompt_chars {
                return Err(format!(
                    "default_prompt is longer than max_prompt_chars ({})",
                    generation.max_prompt_chars
                ));
            }
        }
        Ok(())
    }

    /// Get the Hugging Face token, preferring environment variable.
    #[must_use]
    pub fn huggingface_key(&self) -> Option<String> {
        std::env::var("HUGGINGFACE_API_KEY").ok().or_else(|| self.keys.huggingface.clone())
    }

    /// Get the `OpenAI` API key, preferring environment variable.
    #[must_use]
    pub fn openai_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY").ok().or_else(|| self.keys.openai.clone())
    }
}

/// Discover the config file path using the resolution order:
/// 1. Explicit path (from `--config` flag)
/// 2. `IMAGEN_CONFIG` environment variable
/// 3. `~/.config/imagen-server/config.toml`
#[must_use]
pub fn discover_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }

    if let Ok(p) = std::env::var("IMAGEN_CONFIG") {
        return PathBuf::from(p);
    }

    default_config_path()
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config/imagen-server/config.toml")
    } else {
        PathBuf::from("imagen-server.toml")
    }
}
