use std::time::Duration;

use thiserror::Error;

/// Failures surfaced to the host from one recognition round.
///
/// None of these mutate canvas or variable state; the next debounced trigger
/// is the retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecognitionError {
    /// The request never produced a response (DNS, connect, reset, ...).
    #[error("recognition transport failed: {0}")]
    Transport(String),
    /// Non-success HTTP status without a readable error message.
    #[error("recognition service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The service answered with an explicit error message.
    #[error("recognition service error: {0}")]
    Service(String),
    #[error("recognition timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The persistent channel is closed or was never connected.
    #[error("recognition channel unavailable: {0}")]
    Channel(String),
}

impl RecognitionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RecognitionError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_displayable() {
        let err = RecognitionError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "recognition timed out after 1500ms");
        assert!(err.is_timeout());

        let err = RecognitionError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert!(err.to_string().contains("HTTP 502"));
        assert!(!err.is_timeout());
    }
}
