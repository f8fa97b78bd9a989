//! Error types for generation and repair calls.
//!
//! Only the generation client and its callers fail. Classification, guidance
//! lookup, composition and sanitization are infallible.

use std::time::Duration;

use thiserror::Error;

/// What the caller was doing when a call failed. Selects the user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Generate,
    Repair,
    Title,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The caller aborted the call. Never shown to the user.
    #[error("generation cancelled")]
    Cancelled,

    #[error("generation endpoint is not configured: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("generation endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("model returned no usable text")]
    EmptyResponse,
}

impl GenerationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Network failures, non-success statuses and timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http { .. } | Self::Timeout(_))
    }

    /// Short message for the transcript. Technical detail goes to the log only.
    pub fn user_message(&self, op: Operation) -> &'static str {
        if let Self::Configuration(_) = self {
            return "The diagram generator is not configured. Set an API key in the settings.";
        }
        match op {
            Operation::Generate => "Sorry, the diagram could not be generated.",
            Operation::Repair => "Sorry, the diagram could not be fixed.",
            Operation::Title => "Sorry, a title could not be generated.",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(GenerationError::Transport("reset".into()).is_transport());
        assert!(GenerationError::Http { status: 502, body: String::new() }.is_transport());
        assert!(GenerationError::Timeout(Duration::from_secs(3)).is_transport());
        assert!(!GenerationError::EmptyResponse.is_transport());
        assert!(!GenerationError::Cancelled.is_transport());
        assert!(GenerationError::Cancelled.is_cancelled());
    }

    #[test]
    fn http_error_carries_status_and_body() {
        let err = GenerationError::Http {
            status: 401,
            body: "invalid token".into(),
        };
        assert_eq!(err.to_string(), "generation endpoint returned 401: invalid token");
    }

    #[test]
    fn configuration_message_is_distinct() {
        let config = GenerationError::Configuration("no key".into());
        let transport = GenerationError::Transport("down".into());
        assert_ne!(
            config.user_message(Operation::Generate),
            transport.user_message(Operation::Generate)
        );
        assert_eq!(
            GenerationError::EmptyResponse.user_message(Operation::Repair),
            transport.user_message(Operation::Repair)
        );
    }
}
