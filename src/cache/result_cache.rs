//! TTL cache in front of expensive insight endpoints

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CacheEntry, CacheStore, QuietWindow};
use crate::clock::Clock;
use crate::error::ApiError;
use crate::transport::ApiClient;

/// An endpoint whose responses are cached under a fixed key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheableEndpoint {
    /// Storage key for the endpoint's cached result
    pub key: &'static str,
    /// API path fetched on a miss
    pub path: &'static str,
}

/// AI-generated lending insights
pub const LENDING_INSIGHTS: CacheableEndpoint = CacheableEndpoint {
    key: "lending_insights",
    path: "/lending/insights/",
};

/// AI-generated subscription insights
pub const SUBSCRIPTION_INSIGHTS: CacheableEndpoint = CacheableEndpoint {
    key: "subscription_insights",
    path: "/subscriptions/insights/",
};

/// Freshness rules for cached results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a stored result is served without refetching
    pub ttl: Duration,
    /// Daily window in which automatic refreshes are skipped
    pub quiet: QuietWindow,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(270),
            quiet: QuietWindow::default(),
        }
    }
}

/// Who asked for the refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Triggered by the application; subject to TTL and quiet hours
    Auto,
    /// Explicit user action; always goes to the network
    Forced,
}

/// Result of a cache-wrapped fetch
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome<T> {
    /// Fetched from the backend and stored
    Fresh(T),
    /// Served from the cache without contacting the backend
    Cached(T),
    /// Not attempted because of quiet hours
    Skipped,
}

impl<T> CacheOutcome<T> {
    /// The payload, unless the request was skipped
    pub fn into_data(self) -> Option<T> {
        match self {
            CacheOutcome::Fresh(data) | CacheOutcome::Cached(data) => Some(data),
            CacheOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CacheOutcome::Skipped)
    }
}

/// Serves recent results from a [`CacheStore`] and fetches the rest through an [`ApiClient`]
///
/// Storage failures never reach the caller: a failed read is a miss and a
/// failed write is logged and forgotten.
pub struct ResultCache {
    client: ApiClient,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
}

impl ResultCache {
    /// Uses the client's configured cache policy
    pub fn new(client: ApiClient, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        let policy = client.config().cache;
        Self {
            client,
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Whether an automatic refresh right now would be skipped
    pub fn is_quiet_now(&self) -> bool {
        self.policy.quiet.contains(&self.clock.now())
    }

    /// A fresh entry for `key`, or `None` if absent, expired or unreadable
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.lookup_at(key, now)
    }

    /// The stored entry for `key` regardless of age
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores `payload` under `key`, replacing any previous entry
    pub fn store(&self, key: &str, payload: Value) {
        let entry = CacheEntry::new(payload, self.clock.now().with_timezone(&Utc));
        if let Err(e) = self.store.set(key, &entry) {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "Cache invalidation failed");
        }
    }

    /// Fetches an endpoint's result, honouring TTL and quiet hours for automatic refreshes
    ///
    /// # Arguments
    /// * `endpoint` - The cacheable endpoint; its key names the stored entry
    /// * `refresh` - `Refresh::Auto` for background refreshes, `Refresh::Forced`
    ///   when the user explicitly asked for new data
    ///
    /// # Returns
    /// * `Skipped` for `Refresh::Auto` during quiet hours, without touching the
    ///   store or the network
    /// * `Cached` for `Refresh::Auto` when a fresh entry exists
    /// * `Fresh` after a fetch, which also overwrites the stored entry
    ///
    /// Backend failures propagate unchanged and leave the stored entry alone.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &CacheableEndpoint,
        refresh: Refresh,
    ) -> Result<CacheOutcome<T>, ApiError> {
        if refresh == Refresh::Auto {
            let now = self.clock.now();
            if self.policy.quiet.contains(&now) {
                info!(key = endpoint.key, "Quiet hours, skipping automatic refresh");
                return Ok(CacheOutcome::Skipped);
            }
            if let Some(entry) = self.lookup_at(endpoint.key, now) {
                match serde_json::from_value(entry.data) {
                    Ok(data) => {
                        debug!(key = endpoint.key, "Serving cached result");
                        return Ok(CacheOutcome::Cached(data));
                    }
                    Err(e) => {
                        warn!(key = endpoint.key, error = %e, "Cached result has unexpected shape, refetching");
                    }
                }
            }
        }

        let payload: Value = self.client.get_json(endpoint.path).await?;
        let data = serde_json::from_value(payload.clone())?;
        self.store(endpoint.key, payload);
        Ok(CacheOutcome::Fresh(data))
    }

    fn lookup_at(&self, key: &str, now: DateTime<Local>) -> Option<CacheEntry> {
        let entry = self.peek(key)?;
        if entry.is_fresh(now.with_timezone(&Utc), self.policy.ttl) {
            Some(entry)
        } else {
            debug!(key, "Cached result expired");
            None
        }
    }
}
