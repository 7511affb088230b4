//! Accumulates interactions and writes them out as a cassette.

use std::path::PathBuf;

use chrono::Utc;

use super::format::{Cassette, Interaction};

/// Collects interactions in call order for one recording session.
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    cassette: Cassette,
}

impl CassetteRecorder {
    /// Start a session whose cassette will be written to `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            cassette: Cassette {
                name: name.into(),
                recorded_at: Utc::now(),
                commit: commit.into(),
                interactions: Vec::new(),
            },
        }
    }

    /// Number of interactions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cassette.interactions.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cassette.interactions.is_empty()
    }

    /// Append an interaction; `seq` follows call order.
    pub fn record(
        &mut self,
        port: impl Into<String>,
        method: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) {
        let seq = self.cassette.interactions.len() as u64;
        self.cassette.interactions.push(Interaction {
            seq,
            port: port.into(),
            method: method.into(),
            input,
            output,
        });
    }

    /// Stamp the session end time and write the cassette.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn finish(mut self) -> Result<PathBuf, std::io::Error> {
        self.cassette.recorded_at = Utc::now();
        self.cassette.save(&self.path)?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::{ENGINE_PORT, GENERATE_METHOD};
    use serde_json::json;

    #[test]
    fn interactions_are_numbered_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cassettes/test.cassette.yaml");

        let mut recorder = CassetteRecorder::new(&path, "test-recording", "deadbeef");
        assert!(recorder.is_empty());
        recorder.record(
            ENGINE_PORT,
            GENERATE_METHOD,
            json!({"model": "sd", "prompt": "a lighthouse"}),
            json!({"Ok": {"data": "AQID", "mime_type": "image/png"}}),
        );
        recorder.record(
            ENGINE_PORT,
            GENERATE_METHOD,
            json!({"model": "sd", "prompt": "a harbour"}),
            json!({"Err": {"message": "model loading", "retryable": true}}),
        );
        assert_eq!(recorder.len(), 2);

        assert_eq!(recorder.finish().unwrap(), path);

        let cassette = Cassette::load(&path).unwrap();
        assert_eq!(cassette.name, "test-recording");
        assert_eq!(cassette.commit, "deadbeef");
        let prompts: Vec<_> = cassette.interactions.iter().map(|i| i.input["prompt"].clone()).collect();
        assert_eq!(prompts, vec![json!("a lighthouse"), json!("a harbour")]);
        assert_eq!(cassette.interactions[1].seq, 1);
    }

    #[test]
    fn empty_session_still_writes_a_cassette() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.cassette.yaml");

        CassetteRecorder::new(&path, "empty", "unknown").finish().unwrap();

        assert!(Cassette::load(&path).unwrap().interactions.is_empty());
    }
}
