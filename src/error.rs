//! Error taxonomy for the access layer
//!
//! Only authorization failures are acted upon by the credential layer. Every
//! other failure reaches the caller unchanged so presentation stays the caller's
//! concern.

use thiserror::Error;

use crate::retry::Retryable;
use crate::transport::HttpResponse;

/// Errors surfaced by [`ApiClient`](crate::transport::ApiClient) calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connect failure, timeout, broken body)
    #[error("Network failure: {0}")]
    Network(String),

    /// The backend answered with a non-success status other than 401
    #[error("Request failed with status {}", .0.status)]
    Status(HttpResponse),

    /// A replayed call was rejected as unauthorized again
    #[error("Request still unauthorized after credential renewal")]
    Unauthorized(HttpResponse),

    /// Credential renewal failed and the session was ended
    #[error("Session ended: {0}")]
    SessionEnded(#[from] RenewalFailure),

    /// A request or response body could not be encoded or decoded
    #[error("Could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// The response attached to this error, if the backend answered at all
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            ApiError::Status(response) | ApiError::Unauthorized(response) => Some(response),
            _ => None,
        }
    }

    /// Whether this error ended the user's session
    pub fn is_session_ended(&self) -> bool {
        matches!(self, ApiError::SessionEnded(_))
    }
}

impl Retryable for ApiError {
    fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status(response) => {
                response.status == 429 || (500..=599).contains(&response.status)
            }
            ApiError::Unauthorized(_)
            | ApiError::SessionEnded(_)
            | ApiError::Decode(_)
            | ApiError::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Why a credential renewal did not produce a new access credential
///
/// Cloneable so a single renewal outcome can be handed to every call waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalFailure {
    /// No renewal credential is stored
    #[error("No renewal credential available")]
    MissingRenewalCredential,

    /// The renewal endpoint answered with a non-success status
    #[error("Renewal rejected with status {status}")]
    Rejected { status: u16 },

    /// The renewal request never got a response
    #[error("Renewal request failed: {0}")]
    Network(String),

    /// The renewal endpoint answered 2xx without a usable access credential
    #[error("Malformed renewal response: {0}")]
    MalformedResponse(String),

    /// The user logged out or logged in again while the renewal was in flight
    #[error("Session was replaced during renewal")]
    Superseded,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status(HttpResponse::new(code, "{}"))
    }

    #[test]
    fn test_network_failures_are_transient() {
        assert!(ApiError::Network("connection refused".to_string()).is_transient());
    }

    #[test]
    fn test_server_errors_and_throttling_are_transient() {
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
    }

    #[test]
    fn test_validation_failures_are_not_transient() {
        assert!(!status(400).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(422).is_transient());
    }

    #[test]
    fn test_credential_failures_are_not_transient() {
        let unauthorized = ApiError::Unauthorized(HttpResponse::new(401, ""));
        assert!(!unauthorized.is_transient());

        let ended = ApiError::SessionEnded(RenewalFailure::MissingRenewalCredential);
        assert!(!ended.is_transient());
        assert!(ended.is_session_ended());
    }

    #[test]
    fn test_status_error_keeps_response() {
        let err = status(422);
        assert_eq!(err.response().map(|r| r.status), Some(422));
        assert!(err.to_string().contains("422"));
    }
}
