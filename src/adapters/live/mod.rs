//! Live engines backed by remote inference APIs.

pub mod huggingface;
pub mod openai;

use crate::error::EngineFailure;

/// Cap on how much of an unexpected response body ends up in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Shorten a response body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Status codes that signal a transient upstream condition.
pub(crate) fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Failure for a non-success response, retryable when the status is transient.
pub(crate) fn status_failure(status: reqwest::StatusCode, message: String) -> EngineFailure {
    if is_transient_status(status) {
        EngineFailure::transient(message)
    } else {
        EngineFailure::permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failure_marks_transient_statuses() {
        let busy = status_failure(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert_eq!(busy, EngineFailure::transient("slow down"));
        assert!(status_failure(reqwest::StatusCode::BAD_GATEWAY, "x".into()).retryable);
        assert!(!status_failure(reqwest::StatusCode::UNAUTHORIZED, "x".into()).retryable);
    }

    #[test]
    fn truncate_short_body_unchanged() {
        assert_eq!(truncate_body("oops"), "oops");
    }

    #[test]
    fn truncate_long_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_ERROR_BODY + 3);
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(reqwest::StatusCode::UNAUTHORIZED));
    }
}
