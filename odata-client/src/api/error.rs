//! Error taxonomy for the OData client
//!
//! Local faults (configuration, key, type mismatch, unsupported operation) are
//! raised synchronously before any request is sent. Transport failures are
//! passed through unchanged.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, ODataError>;

/// Errors raised by resources, models and collections
#[derive(Debug, Error)]
pub enum ODataError {
    /// No (or more than one) configuration resolves for a type name
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An entity key is missing where one is required, or present where it must not be
    #[error("key error: {0}")]
    Key(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The resource kind does not support the requested verb
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body did not have the expected wire shape
    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl ODataError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::OperationNotSupported(msg.into())
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload(msg.into())
    }

    /// HTTP status of a failed request, if the error came from the server
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(TransportError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// True for a 404 response, the signal used by fetch-or-create
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Failures reported by a [`Transport`](super::transport::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_http_failures() {
        let err = ODataError::from(TransportError::Status {
            status: 404,
            body: "not found".to_string(),
        });
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());

        let err = ODataError::from(TransportError::Network("reset".to_string()));
        assert_eq!(err.status(), None);
        assert!(ODataError::key("missing").status().is_none());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ODataError::key("entity key is empty").to_string(),
            "key error: entity key is empty"
        );
        let err = ODataError::from(TransportError::Status {
            status: 412,
            body: "precondition failed".to_string(),
        });
        assert_eq!(err.to_string(), "HTTP 412: precondition failed");
    }
}
