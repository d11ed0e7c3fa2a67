//! Client configuration

use std::time::Duration;

use crate::cache::CachePolicy;
use crate::retry::RetryPolicy;

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Endpoint that exchanges a renewal credential for a new access credential
pub const RENEWAL_PATH: &str = "/users/login/refresh/";

/// Endpoint that exchanges a username and password for a credential pair
pub const LOGIN_PATH: &str = "/users/login/";

/// Where the user is sent once the session has ended
pub const LOGIN_REDIRECT: &str = "/login";

/// Configuration for [`ApiClient`](crate::transport::ApiClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    pub login_path: String,
    pub renewal_path: String,
    /// Redirect target announced when the session ends
    pub login_redirect: String,
    /// Per-request timeout; `None` lets a hung request wait forever
    pub request_timeout: Option<Duration>,
    /// Retry policy applied by domain calls
    pub retry: RetryPolicy,
    pub cache: CachePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: LOGIN_PATH.to_string(),
            renewal_path: RENEWAL_PATH.to_string(),
            login_redirect: LOGIN_REDIRECT.to_string(),
            request_timeout: None,
            retry: RetryPolicy::default(),
            cache: CachePolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    pub fn renewal_url(&self) -> String {
        self.url(&self.renewal_path)
    }

    pub fn login_url(&self) -> String {
        self.url(&self.login_path)
    }
}
