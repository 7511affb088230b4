//! Recording adapters that capture interactions to cassettes.

pub mod engine;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::cassette::recorder::CassetteRecorder;

/// Record a `Result<T, E>` interaction using the Ok/Err JSON convention.
pub(crate) fn record_result<T, E, I>(
    recorder: &Arc<Mutex<CassetteRecorder>>,
    port: &str,
    method: &str,
    input: &I,
    result: &Result<T, E>,
) where
    T: Serialize,
    E: Serialize,
    I: Serialize,
{
    let serialized = serde_json::to_value(input).and_then(|input_json| {
        let output_json = match result {
            Ok(v) => serde_json::json!({ "Ok": serde_json::to_value(v)? }),
            Err(e) => serde_json::json!({ "Err": serde_json::to_value(e)? }),
        };
        Ok((input_json, output_json))
    });

    match serialized {
        Ok((input_json, output_json)) => {
            let mut guard = recorder.lock().unwrap_or_else(PoisonError::into_inner);
            guard.record(port, method, input_json, output_json);
        }
        Err(e) => tracing::warn!("Skipping {port}::{method} recording: {e}"),
    }
}
