//! Ledgerline API access layer
//!
//! Every call to the Ledgerline backend goes through this crate: credentials are
//! attached to outgoing requests, expired access credentials are renewed and the
//! original call replayed once, transient failures are retried, and expensive
//! insight results are cached with a TTL and a daily quiet window.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod resources;
pub mod retry;
pub mod session;
pub mod transport;

pub use cache::{CacheOutcome, CachePolicy, CacheableEndpoint, QuietWindow, Refresh, ResultCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use error::{ApiError, RenewalFailure};
pub use retry::{Backoff, RetryPolicy, Retryable};
pub use session::{CredentialPair, Session, SessionEvent};
pub use transport::{ApiClient, HttpBackend, HttpResponse, Method, PendingCall};
