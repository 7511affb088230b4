//! Replaying adapters that serve recorded interactions from cassettes.

pub mod engine;

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;

use crate::cassette::replayer::CassetteReplayer;

/// Retrieve the next recorded output for a given port and method.
pub(crate) fn next_output(
    replayer: &Arc<Mutex<CassetteReplayer>>,
    port: &str,
    method: &str,
) -> Result<serde_json::Value, String> {
    let mut guard = replayer.lock().unwrap_or_else(PoisonError::into_inner);
    guard.next_interaction(port, method).map(|interaction| interaction.output.clone())
}

/// Outcome of decoding a replayed output.
#[derive(Debug)]
pub(crate) enum Replayed<T, E> {
    /// The recorded call succeeded.
    Ok(T),
    /// The recorded call failed.
    Err(E),
}

/// Deserialize a replayed output recorded with the Ok/Err convention.
pub(crate) fn replay_result<T, E>(output: serde_json::Value) -> Result<Replayed<T, E>, String>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
{
    if let Some(err_val) = output.get("Err").or_else(|| output.get("err")) {
        return serde_json::from_value(err_val.clone())
            .map(Replayed::Err)
            .map_err(|e| format!("Malformed recorded error: {e}"));
    }
    let recorded_ok = output.get("Ok").or_else(|| output.get("ok")).cloned();
    let ok_val = recorded_ok.unwrap_or(output);
    serde_json::from_value(ok_val)
        .map(Replayed::Ok)
        .map_err(|e| format!("Malformed recorded output: {e}"))
}
