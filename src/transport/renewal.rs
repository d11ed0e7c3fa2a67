//! Credential renewal gate
//!
//! Turns an authorization failure into either a new access credential or the
//! end of the session. Concurrent failures share one in-flight renewal, so any
//! number of simultaneous 401s cost a single request to the renewal endpoint.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{HttpBackend, HttpRequest, Method};
use crate::cache::CacheStore;
use crate::error::RenewalFailure;
use crate::session::Session;

type RenewalFuture = Shared<BoxFuture<'static, Result<String, RenewalFailure>>>;

/// Success payload of the renewal endpoint
#[derive(Debug, Deserialize)]
struct RenewalResponse {
    access: String,
    /// Present when the backend rotates renewal credentials
    #[serde(default)]
    refresh: Option<String>,
}

struct GateInner {
    backend: Arc<dyn HttpBackend>,
    session: Session,
    local_cache: Option<Arc<dyn CacheStore>>,
    renewal_url: String,
    login_redirect: String,
    /// Renewal in flight, tagged with the session generation it belongs to.
    /// Never held across an await point.
    in_flight: Mutex<Option<(u64, RenewalFuture)>>,
}

#[derive(Clone)]
pub(crate) struct RenewalGate {
    inner: Arc<GateInner>,
}

impl RenewalGate {
    pub(crate) fn new(
        backend: Arc<dyn HttpBackend>,
        session: Session,
        local_cache: Option<Arc<dyn CacheStore>>,
        renewal_url: String,
        login_redirect: String,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                backend,
                session,
                local_cache,
                renewal_url,
                login_redirect,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Obtains an access credential to replace `stale`
    ///
    /// # Arguments
    /// * `stale` - The access credential the backend just rejected, if one was sent
    ///
    /// # Returns
    /// The credential to replay with. Joins a renewal already in flight for the
    /// current session. If the session already holds a different credential
    /// than the one that was rejected, another call has renewed in the meantime
    /// and that credential is returned without a new request. If the session
    /// was ended after the rejected credential was sent, the call fails without
    /// ending it a second time.
    pub(crate) async fn renew(&self, stale: Option<&str>) -> Result<String, RenewalFailure> {
        let renewal = {
            let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            let (generation, credentials) = self.inner.session.snapshot();
            match slot.as_ref() {
                Some((started, pending)) if *started == generation => {
                    debug!(generation, "Joining in-flight credential renewal");
                    pending.clone()
                }
                _ => {
                    let current = credentials
                        .as_ref()
                        .map(|pair| pair.access.as_str())
                        .filter(|access| !access.is_empty());
                    match current {
                        Some(current) if stale != Some(current) => {
                            debug!("Credential already renewed by another call");
                            return Ok(current.to_string());
                        }
                        None if stale.is_some() && credentials.is_none() => {
                            debug!("Session already ended by another call");
                            return Err(RenewalFailure::MissingRenewalCredential);
                        }
                        _ => {}
                    }
                    let refresh = credentials
                        .map(|pair| pair.refresh)
                        .filter(|refresh| !refresh.is_empty());
                    let pending = self.clone().run(generation, refresh).boxed().shared();
                    *slot = Some((generation, pending.clone()));
                    pending
                }
            }
        };
        renewal.await
    }

    /// Clears credentials and local results, then announces the end of the session
    pub(crate) fn end_session(&self) {
        self.inner.session.end(&self.inner.login_redirect);
        self.clear_local_cache();
    }

    /// Ends the session a failed renewal belonged to, unless a new login replaced it
    fn end_session_if_current(&self, generation: u64) {
        if self
            .inner
            .session
            .end_if_current(generation, &self.inner.login_redirect)
        {
            self.clear_local_cache();
        }
    }

    fn clear_local_cache(&self) {
        if let Some(cache) = &self.inner.local_cache {
            if let Err(e) = cache.clear() {
                warn!(error = %e, "Failed to clear local result cache");
            }
        }
    }

    async fn run(self, generation: u64, refresh: Option<String>) -> Result<String, RenewalFailure> {
        let outcome = self.request_renewal(generation, refresh).await;
        if let Err(failure) = &outcome {
            warn!(error = %failure, generation, "Credential renewal failed");
            self.end_session_if_current(generation);
        }
        // Cleared only after the session reflects the outcome, so late arrivals
        // either see the new credential or an empty session.
        let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.as_ref(), Some((started, _)) if *started == generation) {
            slot.take();
        }
        outcome
    }

    async fn request_renewal(
        &self,
        generation: u64,
        refresh: Option<String>,
    ) -> Result<String, RenewalFailure> {
        let refresh = refresh.ok_or(RenewalFailure::MissingRenewalCredential)?;

        info!(generation, "Renewing access credential");
        let request = HttpRequest::new(Method::Post, self.inner.renewal_url.clone())
            .with_json(json!({ "refresh": refresh }));
        let response = self
            .inner
            .backend
            .execute(request)
            .await
            .map_err(|e| RenewalFailure::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(RenewalFailure::Rejected {
                status: response.status,
            });
        }

        let renewed: RenewalResponse = serde_json::from_str(&response.body)
            .map_err(|e| RenewalFailure::MalformedResponse(e.to_string()))?;
        if renewed.access.is_empty() {
            return Err(RenewalFailure::MalformedResponse(
                "empty access credential".to_string(),
            ));
        }

        if !self
            .inner
            .session
            .update_access(generation, renewed.access.clone(), renewed.refresh)
        {
            return Err(RenewalFailure::Superseded);
        }
        Ok(renewed.access)
    }
}
