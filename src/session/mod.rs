//! Credential session
//!
//! A [`Session`] is the one piece of shared mutable state in the access layer:
//! it is read at the start of every call and written at login, on renewal and
//! when the session ends. It is an explicit handle owned by the client rather
//! than ambient global storage, so tests can create as many as they like.

mod store;

pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Access and renewal credentials for one user session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived credential carried on every request
    pub access: String,
    /// Long-lived credential used only to mint a new access credential
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were stored after a login
    Established,
    /// The access credential was replaced by a renewal
    Renewed,
    /// Credentials were cleared; the user should be sent to `redirect_to`
    Ended { redirect_to: String },
}

/// Credentials plus a counter bumped whenever a session starts or ends
///
/// A renewal records the generation it started under and may only write back
/// into that same generation.
struct SessionState {
    credentials: Option<CredentialPair>,
    generation: u64,
}

struct SessionInner {
    state: RwLock<SessionState>,
    store: Box<dyn CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
}

/// Cheaply cloneable handle to the current credentials
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("generation", &self.generation())
            .finish()
    }
}

impl Session {
    /// Creates a session backed by `store`, loading any persisted credentials
    ///
    /// A store that cannot be read starts the session unauthenticated.
    pub fn new(store: impl CredentialStore + 'static) -> Self {
        let credentials = match store.load() {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "Failed to load stored credentials");
                None
            }
        };
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(SessionState {
                    credentials,
                    generation: 0,
                }),
                store: Box::new(store),
                events,
            }),
        }
    }

    /// Creates a session that is never persisted
    pub fn in_memory() -> Self {
        Self::new(MemoryCredentialStore::default())
    }

    /// Current credentials, if any
    pub fn credentials(&self) -> Option<CredentialPair> {
        self.snapshot().1
    }

    /// Generation and credentials read under a single lock
    pub fn snapshot(&self) -> (u64, Option<CredentialPair>) {
        let state = self.read();
        (state.generation, state.credentials.clone())
    }

    /// Counter identifying the current session; changes on every login and logout
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Current access credential; empty values count as absent
    pub fn access(&self) -> Option<String> {
        self.credentials()
            .map(|pair| pair.access)
            .filter(|access| !access.is_empty())
    }

    /// Current renewal credential; empty values count as absent
    pub fn renewal(&self) -> Option<String> {
        self.credentials()
            .map(|pair| pair.refresh)
            .filter(|refresh| !refresh.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access().is_some() && self.renewal().is_some()
    }

    /// Stores a fresh credential pair after a login, starting a new generation
    pub fn establish(&self, pair: CredentialPair) {
        {
            let mut state = self.write();
            state.generation += 1;
            self.persist(Some(&pair));
            state.credentials = Some(pair);
        }
        info!("Session established");
        let _ = self.inner.events.send(SessionEvent::Established);
    }

    /// Replaces the access credential, and the renewal credential when rotated
    ///
    /// # Arguments
    /// * `generation` - The generation the renewal was started under
    /// * `access` - The new access credential
    /// * `rotated_refresh` - A replacement renewal credential, if the backend sent one
    ///
    /// # Returns
    /// `true` if the credentials were updated. `false` if the session has ended
    /// or been replaced by a new login since `generation` was read; nothing is
    /// written in that case.
    pub fn update_access(
        &self,
        generation: u64,
        access: impl Into<String>,
        rotated_refresh: Option<String>,
    ) -> bool {
        {
            let mut state = self.write();
            if state.generation != generation {
                warn!(
                    generation,
                    current = state.generation,
                    "Ignoring renewed credential from a previous session"
                );
                return false;
            }
            let Some(pair) = state.credentials.as_mut() else {
                warn!("Ignoring renewed credential for a session that has ended");
                return false;
            };
            pair.access = access.into();
            if let Some(refresh) = rotated_refresh {
                pair.refresh = refresh;
            }
            self.persist(Some(&*pair));
        }
        let _ = self.inner.events.send(SessionEvent::Renewed);
        true
    }

    /// Clears all credentials and announces the end of the session
    pub fn end(&self, redirect_to: &str) {
        self.clear(None, redirect_to);
    }

    /// Ends the session only if it is still at `generation`
    ///
    /// Returns whether the session was ended.
    pub fn end_if_current(&self, generation: u64, redirect_to: &str) -> bool {
        self.clear(Some(generation), redirect_to)
    }

    /// Subscribes to lifecycle events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn clear(&self, expected: Option<u64>, redirect_to: &str) -> bool {
        {
            let mut state = self.write();
            if expected.is_some_and(|generation| generation != state.generation) {
                debug!(
                    current = state.generation,
                    "Session was replaced, leaving it in place"
                );
                return false;
            }
            state.generation += 1;
            state.credentials = None;
            self.persist(None);
        }
        info!(redirect_to, "Session ended");
        let _ = self.inner.events.send(SessionEvent::Ended {
            redirect_to: redirect_to.to_string(),
        });
        true
    }

    // Called with the write guard held so the store never lags behind memory.
    fn persist(&self, credentials: Option<&CredentialPair>) {
        let persisted = match credentials {
            Some(pair) => self.inner.store.save(pair),
            None => self.inner.store.clear(),
        };
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist credentials");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
