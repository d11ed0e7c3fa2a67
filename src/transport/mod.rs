//! Transport client and credential renewal
//!
//! All HTTP traffic to the backend goes through [`ApiClient`]. The actual wire
//! work is delegated to an [`HttpBackend`], which is `reqwest` in production
//! and a scripted fake in tests.

mod backend;
mod client;
mod renewal;
pub mod testing;

pub use backend::ReqwestBackend;
pub use client::{ApiClient, ApiClientBuilder};

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// HTTP verbs used by the backend API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Maximum number of times a call is replayed after a credential renewal
const MAX_REPLAYS: u8 = 1;

/// An outbound call awaiting dispatch or replay
///
/// The replay count only grows through [`PendingCall::replay_with`], which
/// returns a new value; a call is never mutated in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/lending/transactions/`
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    credential: Option<String>,
    replays: u8,
}

impl PendingCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            credential: None,
            replays: 0,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// How many times this call has been replayed after a renewal
    pub fn replays(&self) -> u8 {
        self.replays
    }

    /// Whether an authorization failure on this call is final
    pub fn already_retried(&self) -> bool {
        self.replays >= MAX_REPLAYS
    }

    /// Credential pinned by a renewal, overriding the session's
    pub fn pinned_credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// The replay of this call with a freshly renewed access credential
    pub fn replay_with(&self, access: impl Into<String>) -> Self {
        Self {
            credential: Some(access.into()),
            replays: self.replays.saturating_add(1),
            ..self.clone()
        }
    }
}

/// A fully resolved request as handed to an [`HttpBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The bearer credential carried by this request, if any
    pub fn bearer(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

/// Status and body of a backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decodes the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Performs a single HTTP exchange
///
/// Implementations report "no response" as [`ApiError::Network`] and return
/// every response, whatever its status, as `Ok`.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replay_increments_count_and_pins_credential() {
        let call = PendingCall::new(Method::Get, "/lending/transactions/");
        assert_eq!(call.replays(), 0);
        assert!(!call.already_retried());
        assert!(call.pinned_credential().is_none());

        let replay = call.replay_with("fresh");
        assert_eq!(replay.replays(), 1);
        assert!(replay.already_retried());
        assert_eq!(replay.pinned_credential(), Some("fresh"));
        assert_eq!(replay.path, call.path);

        // The original is untouched
        assert_eq!(call.replays(), 0);
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let mut request = HttpRequest::new(Method::Get, "http://api/x");
        request
            .headers
            .push(("authorization".to_string(), "Bearer abc".to_string()));
        assert_eq!(request.header("Authorization"), Some("Bearer abc"));
        assert_eq!(request.bearer(), Some("abc"));
    }

    #[test]
    fn test_response_classification() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(302, "").is_success());
        assert!(HttpResponse::new(401, "").is_unauthorized());
        assert!(!HttpResponse::new(403, "").is_unauthorized());
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponse::new(200, r#"{"access":"a"}"#);
        let value: Value = response.json().unwrap();
        assert_eq!(value, json!({ "access": "a" }));

        let broken = HttpResponse::new(200, "oops");
        assert!(matches!(broken.json::<Value>(), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert_eq!(reqwest::Method::from(Method::Delete), reqwest::Method::DELETE);
    }
}
