//! Result cache for expensive derived results
//!
//! Insight endpoints are costly to compute on the backend, so their responses
//! are kept in a keyed store for a fixed TTL. Automatic refreshes are paused
//! during a daily quiet window; a forced refresh ignores both rules.

mod quiet;
mod result_cache;
mod store;

pub use quiet::{is_quiet_hours, QuietWindow};
pub use result_cache::{
    CacheOutcome, CachePolicy, CacheableEndpoint, Refresh, ResultCache, LENDING_INSIGHTS,
    SUBSCRIPTION_INSIGHTS,
};
pub use store::{CacheEntry, CacheStore, FileCacheStore, MemoryCacheStore};
