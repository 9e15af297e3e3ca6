//! bookfeed cache system
//!
//! Two in-memory caches sit between the HTTP surface and the catalog:
//!
//! - **Collection cache**: release collections per author, series and the
//!   recent-releases listing, keyed `hardcover/<kind>/<slug>`.
//! - **Interest cache**: derived reading interests per user, keyed
//!   `hardcover/user/<username>`.
//!
//! Both expire entries a fixed time after creation and are snapshotted to disk
//! so restarts come back warm.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! collection_ttl_seconds = 43200
//! interest_ttl_seconds = 86400
//! not_found_ttl_seconds = 3600
//! snapshot_dir = "/var/lib/bookfeed"
//! # ... see config.rs for all options
//! ```

mod config;
pub mod keys;
mod loader;
mod snapshot;
mod store;

pub use config::CacheConfig;
pub use keys::{RECENT_RELEASES_KEY, author_key, series_key, user_key};
pub use loader::{BulkLoader, BulkOutcome, Loader};
pub use snapshot::{SnapshotError, SnapshotStore};
pub use store::{
    Cacheable, CollectionCache, ExpiryPolicy, InterestCache, LoadingCache, Stored,
};

/// Snapshot file name of the collection cache.
pub const COLLECTION_CACHE_NAME: &str = "collection";
/// Snapshot file name of the interest cache.
pub const INTEREST_CACHE_NAME: &str = "user";

/// Build the collection cache described by `config`.
pub fn collection_cache(config: &CacheConfig) -> CollectionCache {
    LoadingCache::new(
        COLLECTION_CACHE_NAME,
        config.collection_capacity_non_zero().get(),
        config.collection_policy(),
    )
}

/// Build the interest cache described by `config`.
pub fn interest_cache(config: &CacheConfig) -> InterestCache {
    LoadingCache::new(
        INTEREST_CACHE_NAME,
        config.interest_capacity_non_zero().get(),
        config.interest_policy(),
    )
}
