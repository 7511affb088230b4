//! On-disk cassette format.

use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Port name under which engine interactions are recorded.
pub const ENGINE_PORT: &str = "generation_engine";

/// Method name for [`crate::ports::GenerationEngine::generate`].
pub const GENERATE_METHOD: &str = "generate";

/// A recorded session of port interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cassette {
    /// Session name.
    pub name: String,
    /// When the session was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Git commit the recording was made from.
    pub commit: String,
    /// Interactions in recording order.
    pub interactions: Vec<Interaction>,
}

/// One call across a port and its outcome.
///
/// `output` follows the `{"Ok": ...}` / `{"Err": ...}` convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Sequence number within the cassette.
    pub seq: u64,
    /// Port name (e.g. `generation_engine`).
    pub port: String,
    /// Method name (e.g. `generate`).
    pub method: String,
    /// Serialized call input.
    pub input: serde_json::Value,
    /// Serialized call result.
    pub output: serde_json::Value,
}

impl Cassette {
    /// Read a cassette from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read cassette file {}: {e}", path.display()))?;
        serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse cassette file {}: {e}", path.display()))
    }

    /// Write the cassette as YAML, creating parent directories.
    ///
    /// The file appears under `path` only once fully written; an interrupted
    /// save leaves any previous cassette there untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let yaml = serde_yaml::to_string(self).map_err(io::Error::other)?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(yaml.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
