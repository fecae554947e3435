use thiserror::Error;

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, StressError>;

/// Errors that can occur while driving the license server.
///
/// Only [`StressError::Configuration`] stops a run. Every other variant is scoped to the
/// single notification call that produced it.
#[derive(Debug, Error)]
pub enum StressError {
    /// Required parameter missing or invalid
    #[error("{0}")]
    Configuration(String),

    /// The OS entropy source could not produce a content key
    #[error("unable to generate a key: {0}")]
    KeyGeneration(#[from] rand::Error),

    /// The notification could not be encoded
    #[error("json marshal error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Connection, TLS handshake or DNS failure
    #[error("call error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a status outside 2xx and 302
    #[error("lcp server error {status}: {detail}")]
    Server { status: u16, detail: String },

    /// The server's problem body was not valid JSON
    #[error("unable to unmarshal response body: {0}")]
    ResponseParse(#[source] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StressError {
    /// Whether the error aborts the whole run rather than a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StressError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(StressError::Configuration("url param is required".to_string()).is_fatal());
        assert!(
            !StressError::Server {
                status: 503,
                detail: "overloaded".to_string()
            }
            .is_fatal()
        );
        assert!(!StressError::Internal("join".to_string()).is_fatal());
    }

    #[test]
    fn test_server_error_display_carries_detail() {
        let err = StressError::Server {
            status: 503,
            detail: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "lcp server error 503: overloaded");
    }
}
