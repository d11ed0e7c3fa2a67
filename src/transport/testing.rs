//! In-process backend for exercising the access layer without a network

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{HttpBackend, HttpRequest, HttpResponse};
use crate::error::ApiError;

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync;

/// A backend that answers every request with a caller-supplied function and
/// records what it was asked
pub struct ScriptedBackend {
    responder: Box<Responder>,
    latency: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Delays every response, letting concurrent calls overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests whose URL ends with `path`
    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|request| request.url.ends_with(path))
            .count()
    }

    pub fn total(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        (self.responder)(&request)
    }
}
