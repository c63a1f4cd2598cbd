//! Error classification logic
//!
//! The single place where the shape of a remote failure is interpreted. The
//! rest of the dispatcher only sees the closed [`Outcome`] set.

use crate::types::GenerateContentResponse;
use crate::{Error, ErrorContext, Result};

/// Tagged result of one remote attempt.
#[derive(Debug)]
pub(crate) enum Outcome {
    Success(GenerateContentResponse),
    /// The prompt was rejected by the safety filter. Never retried.
    Blocked(Error),
    /// The attempt exceeded its wall-clock budget. Never retried.
    TimedOut(Error),
    /// Quota, overload, transient server or deadline signal. Rotate and retry.
    RateLimited(Error),
    /// Known non-recoverable failure (bad request, auth, executor state).
    Fatal(Error),
    /// Anything else. Propagated unchanged.
    Unexpected(Error),
}

impl Outcome {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Blocked(_) => "blocked",
            Outcome::TimedOut(_) => "timeout",
            Outcome::RateLimited(_) => "rate_limited",
            Outcome::Fatal(_) => "fatal",
            Outcome::Unexpected(_) => "unexpected",
        }
    }
}

pub(crate) fn classify(result: Result<GenerateContentResponse>) -> Outcome {
    match result {
        Ok(response) => match response.block_reason() {
            Some(reason) => {
                let message = response
                    .prompt_feedback
                    .as_ref()
                    .and_then(|f| f.block_reason_message.clone());
                Outcome::Blocked(Error::Blocked {
                    reason: reason.to_string(),
                    message,
                    context: ErrorContext::new().with_source("prompt_feedback"),
                })
            }
            None => Outcome::Success(response),
        },
        Err(err) => classify_error(err),
    }
}

fn classify_error(err: Error) -> Outcome {
    match &err {
        Error::Blocked { .. } => Outcome::Blocked(err),
        Error::Timeout { .. } => Outcome::TimedOut(err),
        Error::Remote { .. } if err.is_rate_limited() => Outcome::RateLimited(err),
        // The HTTP layer's own deadline: the server never answered in time.
        Error::Transport(t) if t.is_timeout() => Outcome::RateLimited(err),
        Error::Remote { .. }
        | Error::Configuration { .. }
        | Error::Initialization { .. }
        | Error::Validation { .. }
        | Error::CycleExhausted { .. }
        | Error::CannotRotate { .. }
        | Error::ExecutorClosed
        | Error::ExecutorSaturated { .. } => Outcome::Fatal(err),
        Error::Transport(_) | Error::Serialization(_) | Error::Io(_) | Error::Runtime { .. } => {
            Outcome::Unexpected(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_code::StandardErrorCode;
    use serde_json::json;
    use std::time::Duration;

    fn remote(status: u16, rpc: Option<&str>) -> Error {
        Error::Remote {
            status,
            code: StandardErrorCode::resolve(status, rpc),
            rpc_status: rpc.map(String::from),
            message: "x".into(),
            retry_after_ms: None,
            context: ErrorContext::new(),
        }
    }

    #[test]
    fn quota_and_server_errors_are_rate_limited() {
        for (status, rpc) in [
            (429, Some("RESOURCE_EXHAUSTED")),
            (429, None),
            (500, Some("INTERNAL")),
            (503, Some("UNAVAILABLE")),
            (504, Some("DEADLINE_EXCEEDED")),
        ] {
            let outcome = classify(Err(remote(status, rpc)));
            assert_eq!(outcome.label(), "rate_limited", "{} {:?}", status, rpc);
        }
    }

    #[test]
    fn any_429_rotates_even_with_odd_status_text() {
        let outcome = classify(Err(remote(429, Some("INVALID_ARGUMENT"))));
        assert!(matches!(outcome, Outcome::RateLimited(_)));
    }

    #[test]
    fn client_errors_are_fatal() {
        for (status, rpc) in [
            (400, Some("INVALID_ARGUMENT")),
            (403, Some("PERMISSION_DENIED")),
            (404, Some("NOT_FOUND")),
        ] {
            assert!(matches!(classify(Err(remote(status, rpc))), Outcome::Fatal(_)));
        }
    }

    #[test]
    fn timeout_is_not_retryable() {
        let err = Error::Timeout {
            timeout: Duration::from_secs(1),
            context: ErrorContext::new(),
        };
        assert!(matches!(classify(Err(err)), Outcome::TimedOut(_)));
    }

    #[test]
    fn block_reason_becomes_blocked_error() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "unsafe"
            }
        }))
        .unwrap();
        match classify(Ok(response)) {
            Outcome::Blocked(Error::Blocked {
                reason, message, ..
            }) => {
                assert_eq!(reason, "SAFETY");
                assert_eq!(message.as_deref(), Some("unsafe"));
            }
            other => panic!("unexpected outcome: {}", other.label()),
        }
    }

    #[test]
    fn textless_response_is_still_success() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(matches!(classify(Ok(response)), Outcome::Success(_)));
    }

    #[test]
    fn runtime_errors_are_unexpected() {
        assert!(matches!(
            classify(Err(Error::runtime("boom"))),
            Outcome::Unexpected(_)
        ));
    }
}
