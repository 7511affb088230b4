//! Replaying adapter for the `GenerationEngine` port.

use std::sync::{Arc, Mutex};

use super::{next_output, replay_result, Replayed};
use crate::cassette::format::{ENGINE_PORT, GENERATE_METHOD};
use crate::cassette::replayer::CassetteReplayer;
use crate::error::EngineFailure;
use crate::ports::engine::{EngineRequest, GenerateFuture, GeneratedImage, GenerationEngine};

/// Serves recorded generation results from a cassette.
///
/// Running out of recorded interactions is reported as a non-retryable
/// engine failure rather than a panic, so a long-running server stays up.
pub struct ReplayingEngine {
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingEngine {
    /// Create a replaying engine backed by the given replayer.
    #[must_use]
    pub fn new(replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { replayer }
    }
}

impl GenerationEngine for ReplayingEngine {
    fn generate(&self, _request: &EngineRequest) -> GenerateFuture<'_> {
        let output = next_output(&self.replayer, ENGINE_PORT, GENERATE_METHOD);
        Box::pin(async move {
            let output = output.map_err(EngineFailure::permanent)?;
            match replay_result::<GeneratedImage, EngineFailure>(output) {
                Ok(Replayed::Ok(image)) => Ok(image),
                Ok(Replayed::Err(failure)) => Err(failure),
                Err(e) => Err(EngineFailure::permanent(e)),
            }
        })
    }

    fn abortable(&self) -> bool {
        true
    }
}
