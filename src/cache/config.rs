//! Cache configuration.
//!
//! Sizes and lifetimes for the collection and interest caches, plus snapshot
//! placement, via the `[cache]` table of `bookfeed.toml`.

use std::{num::NonZeroU64, path::PathBuf, time::Duration};

use super::store::ExpiryPolicy;

// Default values for cache configuration
const DEFAULT_COLLECTION_CAPACITY: u64 = 10_000;
const DEFAULT_INTEREST_CAPACITY: u64 = 10_000;
const DEFAULT_COLLECTION_TTL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_INTEREST_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_NOT_FOUND_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_SNAPSHOT_DIR: &str = ".";

/// Cache configuration resolved from the `[cache]` settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum collections kept in memory.
    pub collection_capacity: u64,
    /// Maximum user interest sets kept in memory.
    pub interest_capacity: u64,
    /// Lifetime of a collection, measured from creation.
    pub collection_ttl_secs: u64,
    /// Lifetime of a user's interests, measured from creation.
    pub interest_ttl_secs: u64,
    /// Lifetime of negative (not found) results in either cache.
    pub not_found_ttl_secs: u64,
    /// Write snapshots on a timer and at shutdown.
    pub enable_snapshots: bool,
    /// Directory holding `collection.json` and `user.json`.
    pub snapshot_dir: PathBuf,
    /// Interval between periodic snapshot writes.
    pub snapshot_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            collection_capacity: DEFAULT_COLLECTION_CAPACITY,
            interest_capacity: DEFAULT_INTEREST_CAPACITY,
            collection_ttl_secs: DEFAULT_COLLECTION_TTL_SECS,
            interest_ttl_secs: DEFAULT_INTEREST_TTL_SECS,
            not_found_ttl_secs: DEFAULT_NOT_FOUND_TTL_SECS,
            enable_snapshots: true,
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            collection_capacity: settings.collection_capacity.get(),
            interest_capacity: settings.interest_capacity.get(),
            collection_ttl_secs: settings.collection_ttl.as_secs(),
            interest_ttl_secs: settings.interest_ttl.as_secs(),
            not_found_ttl_secs: settings.not_found_ttl.as_secs(),
            enable_snapshots: settings.enable_snapshots,
            snapshot_dir: settings.snapshot_dir.clone(),
            snapshot_interval_secs: settings.snapshot_interval.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Returns the collection capacity, clamping to 1 if zero.
    pub fn collection_capacity_non_zero(&self) -> NonZeroU64 {
        NonZeroU64::new(self.collection_capacity).unwrap_or(NonZeroU64::MIN)
    }

    /// Returns the interest capacity, clamping to 1 if zero.
    pub fn interest_capacity_non_zero(&self) -> NonZeroU64 {
        NonZeroU64::new(self.interest_capacity).unwrap_or(NonZeroU64::MIN)
    }

    pub fn collection_ttl(&self) -> Duration {
        Duration::from_secs(self.collection_ttl_secs)
    }

    pub fn interest_ttl(&self) -> Duration {
        Duration::from_secs(self.interest_ttl_secs)
    }

    pub fn collection_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(
            self.collection_ttl(),
            Duration::from_secs(self.not_found_ttl_secs),
        )
    }

    pub fn interest_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(
            self.interest_ttl(),
            Duration::from_secs(self.not_found_ttl_secs),
        )
    }

    /// Snapshot cadence, never shorter than one second.
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }
}
