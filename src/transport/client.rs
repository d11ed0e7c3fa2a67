//! The single chokepoint for backend calls
//!
//! Each call runs through a small pipeline: the outbound hook attaches the
//! current access credential, the inbound hook passes successes and ordinary
//! failures straight through, and an authorization failure is handed to the
//! renewal gate and replayed once.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::renewal::RenewalGate;
use super::{HttpBackend, HttpRequest, HttpResponse, Method, PendingCall, ReqwestBackend};
use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::retry::RetryPolicy;
use crate::session::{CredentialPair, Session};

/// Success payload of the login endpoint
#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

struct ClientInner {
    config: ClientConfig,
    backend: Arc<dyn HttpBackend>,
    session: Session,
    gate: RenewalGate,
}

/// Authenticated client for the backend API
///
/// Cheap to clone; clones share the session and any in-flight renewal.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    config: ClientConfig,
    session: Option<Session>,
    backend: Option<Arc<dyn HttpBackend>>,
    local_cache: Option<Arc<dyn CacheStore>>,
}

impl ApiClientBuilder {
    /// Session to read and renew credentials in; defaults to an in-memory one
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Backend to send requests with; defaults to [`ReqwestBackend`]
    pub fn backend(mut self, backend: Arc<dyn HttpBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Local result store wiped together with the credentials when the session ends
    pub fn local_cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.local_cache = Some(store);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(ReqwestBackend::new(self.config.request_timeout)?),
        };
        let session = self.session.unwrap_or_else(Session::in_memory);
        let gate = RenewalGate::new(
            backend.clone(),
            session.clone(),
            self.local_cache,
            self.config.renewal_url(),
            self.config.login_redirect.clone(),
        );
        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                backend,
                session,
                gate,
            }),
        })
    }
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            session: None,
            backend: None,
            local_cache: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.config.retry
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.send(PendingCall::new(Method::Get, path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, ApiError> {
        let call = PendingCall::new(Method::Post, path).with_body(serde_json::to_value(body)?);
        self.send(call).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, ApiError> {
        let call = PendingCall::new(Method::Patch, path).with_body(serde_json::to_value(body)?);
        self.send(call).await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.send(PendingCall::new(Method::Delete, path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post(path, body).await?.json()
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.patch(path, body).await?.json()
    }

    /// Dispatches a call through the credential pipeline
    ///
    /// A 401 triggers one renewal and one replay of the same call.
    ///
    /// # Arguments
    /// * `call` - The call to send; a call that has already been replayed is never renewed again
    ///
    /// # Returns
    /// * `Ok(HttpResponse)` for any 2xx answer
    /// * `Err(ApiError::Status)` with the response untouched for any other non-401 status
    /// * `Err(ApiError::Unauthorized)` when the replay is rejected as well
    /// * `Err(ApiError::SessionEnded)` when renewal failed and the session was cleared
    pub async fn send(&self, call: PendingCall) -> Result<HttpResponse, ApiError> {
        let mut call = call;
        loop {
            let (request, credential) = self.outbound(&call);
            debug!(
                method = %call.method,
                path = %call.path,
                authenticated = credential.is_some(),
                replays = call.replays(),
                "Dispatching request"
            );
            let response = self.inner.backend.execute(request).await?;

            if response.is_success() {
                return Ok(response);
            }
            if !response.is_unauthorized() {
                debug!(status = response.status, path = %call.path, "Request failed");
                return Err(ApiError::Status(response));
            }
            if call.already_retried() {
                warn!(path = %call.path, "Replayed request was rejected as unauthorized");
                return Err(ApiError::Unauthorized(response));
            }

            let access = self.inner.gate.renew(credential.as_deref()).await?;
            call = call.replay_with(access);
        }
    }

    /// Exchanges a username and password for a credential pair and stores it
    ///
    /// Bypasses the renewal pipeline: a rejected login is an ordinary failure.
    ///
    /// # Returns
    /// * `Ok(())` once the session holds the new pair
    /// * `Err(ApiError::Status)` if the backend refused the login
    /// * `Err(ApiError::Decode)` if the answer lacks either credential
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = HttpRequest::new(Method::Post, self.inner.config.login_url())
            .with_json(json!({ "username": username, "password": password }));
        let response = self.inner.backend.execute(request).await?;
        if !response.is_success() {
            return Err(ApiError::Status(response));
        }
        let login: LoginResponse = response.json()?;
        self.inner
            .session
            .establish(CredentialPair::new(login.access, login.refresh));
        Ok(())
    }

    /// Clears credentials and local results and announces the end of the session
    pub fn logout(&self) {
        self.inner.gate.end_session();
    }

    /// Resolves a call into a request, attaching the credential it carries
    fn outbound(&self, call: &PendingCall) -> (HttpRequest, Option<String>) {
        let credential = call
            .pinned_credential()
            .map(str::to_owned)
            .or_else(|| self.inner.session.access());

        let mut request = HttpRequest::new(call.method, self.inner.config.url(&call.path));
        request.headers = call.headers.clone();
        request.body = call.body.clone();
        if let Some(access) = &credential {
            request
                .headers
                .push(("Authorization".to_string(), format!("Bearer {}", access)));
        }
        (request, credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionEvent;
    use crate::transport::testing::ScriptedBackend;
    use serde_json::Value;

    fn client_with(backend: Arc<ScriptedBackend>, session: Session) -> ApiClient {
        ApiClient::builder(ClientConfig::new("http://api.test"))
            .session(session)
            .backend(backend)
            .build()
            .expect("Client should build")
    }

    #[tokio::test]
    async fn test_attaches_bearer_when_authenticated() {
        let backend = Arc::new(ScriptedBackend::new(|_| Ok(HttpResponse::new(200, "[]"))));
        let session = Session::in_memory();
        session.establish(CredentialPair::new("access-1", "refresh-1"));
        let client = client_with(backend.clone(), session);

        client.get("/budget/categories/").await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://api.test/budget/categories/");
        assert_eq!(requests[0].header("Authorization"), Some("Bearer access-1"));
    }

    #[tokio::test]
    async fn test_dispatches_unauthenticated_without_credentials() {
        let backend = Arc::new(ScriptedBackend::new(|_| Ok(HttpResponse::new(200, "{}"))));
        let client = client_with(backend.clone(), Session::in_memory());

        client.get("/public/").await.unwrap();

        assert!(backend.requests()[0].header("Authorization").is_none());
    }

    #[tokio::test]
    async fn test_body_and_headers_are_forwarded() {
        let backend = Arc::new(ScriptedBackend::new(|_| Ok(HttpResponse::new(201, "{}"))));
        let client = client_with(backend.clone(), Session::in_memory());

        let call = PendingCall::new(Method::Post, "/todos/")
            .with_body(json!({ "title": "pay rent" }))
            .with_header("X-Request-Source", "cli");
        client.send(call).await.unwrap();

        let request = &backend.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body, Some(json!({ "title": "pay rent" })));
        assert_eq!(request.header("x-request-source"), Some("cli"));
    }

    #[tokio::test]
    async fn test_validation_failure_passes_through_untouched() {
        let backend = Arc::new(ScriptedBackend::new(|_| {
            Ok(HttpResponse::new(400, r#"{"amount":["required"]}"#))
        }));
        let session = Session::in_memory();
        session.establish(CredentialPair::new("access-1", "refresh-1"));
        let client = client_with(backend.clone(), session.clone());

        let err = client
            .post("/lending/transactions/", &json!({}))
            .await
            .unwrap_err();

        match err {
            ApiError::Status(response) => {
                assert_eq!(response, HttpResponse::new(400, r#"{"amount":["required"]}"#));
            }
            other => panic!("Expected status error, got {other:?}"),
        }
        assert_eq!(backend.total(), 1, "No renewal should be attempted");
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_network_failure_is_surfaced() {
        let backend = Arc::new(ScriptedBackend::new(|_| {
            Err(ApiError::Network("connection reset".to_string()))
        }));
        let client = client_with(backend, Session::in_memory());

        let err = client.get("/lending/transactions/").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let backend = Arc::new(ScriptedBackend::new(|_| {
            Ok(HttpResponse::new(200, r#"[{"id":1}]"#))
        }));
        let client = client_with(backend, Session::in_memory());

        let items: Vec<Value> = client.get_json("/subscriptions/").await.unwrap();
        assert_eq!(items, vec![json!({ "id": 1 })]);
    }

    #[tokio::test]
    async fn test_login_establishes_session() {
        let backend = Arc::new(ScriptedBackend::new(|request| {
            assert_eq!(request.body.as_ref().unwrap()["username"], "ada");
            assert!(request.header("Authorization").is_none());
            Ok(HttpResponse::new(200, r#"{"access":"a1","refresh":"r1"}"#))
        }));
        let session = Session::in_memory();
        let mut events = session.subscribe();
        let client = client_with(backend.clone(), session.clone());

        client.login("ada", "secret").await.unwrap();

        assert_eq!(backend.count("/users/login/"), 1);
        assert_eq!(session.access().as_deref(), Some("a1"));
        assert_eq!(session.renewal().as_deref(), Some("r1"));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Established);
    }

    #[tokio::test]
    async fn test_rejected_login_does_not_renew() {
        let backend = Arc::new(ScriptedBackend::new(|_| Ok(HttpResponse::new(401, "{}"))));
        let client = client_with(backend.clone(), Session::in_memory());

        let err = client.login("ada", "wrong").await.unwrap_err();

        assert!(matches!(err, ApiError::Status(ref r) if r.status == 401));
        assert_eq!(backend.total(), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let backend = Arc::new(ScriptedBackend::new(|_| Ok(HttpResponse::new(200, "{}"))));
        let session = Session::in_memory();
        session.establish(CredentialPair::new("a", "r"));
        let mut events = session.subscribe();
        let client = client_with(backend, session.clone());

        client.logout();

        assert!(session.credentials().is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Ended {
                redirect_to: "/login".to_string()
            }
        );
    }
}
