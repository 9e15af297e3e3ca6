//! Loading cache storage.
//!
//! A bounded key/value cache (TinyLFU admission via moka) whose entries expire
//! a fixed time after they were *created*, not after their last read. Misses
//! are filled through [`Loader`] / [`BulkLoader`] implementations.

use std::{
    collections::{HashMap, HashSet},
    error::Error as StdError,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use metrics::counter;
use moka::{Expiry, future::Cache};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    catalog::CatalogError,
    domain::{Collection, UserInterests},
};

use super::loader::{BulkLoader, BulkOutcome, Loader};

const METRIC_CACHE_HIT: &str = "bookfeed_cache_hit_total";
const METRIC_CACHE_MISS: &str = "bookfeed_cache_miss_total";
const METRIC_CACHE_LOAD: &str = "bookfeed_cache_load_total";
const METRIC_CACHE_LOAD_ERROR: &str = "bookfeed_cache_load_error_total";

/// Values that can live in a [`LoadingCache`].
pub trait Cacheable: Clone + Send + Sync + 'static {
    /// `false` for negative results, which expire on the shorter not-found TTL.
    fn is_found(&self) -> bool {
        true
    }
}

impl Cacheable for Collection {
    fn is_found(&self) -> bool {
        self.found
    }
}

impl Cacheable for UserInterests {
    fn is_found(&self) -> bool {
        self.found
    }
}

/// A cached value with the wall-clock time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<V> {
    pub value: V,
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
}

impl<V> Stored<V> {
    pub fn now(value: V) -> Self {
        Self {
            value,
            stored_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Time-to-live rules for one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    ttl: Duration,
    not_found_ttl: Duration,
}

impl ExpiryPolicy {
    /// `not_found_ttl` is clamped so negative results never outlive positive ones.
    pub fn new(ttl: Duration, not_found_ttl: Duration) -> Self {
        Self {
            ttl,
            not_found_ttl: not_found_ttl.min(ttl),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn not_found_ttl(&self) -> Duration {
        self.not_found_ttl
    }

    fn ttl_for<V: Cacheable>(&self, value: &V) -> Duration {
        if value.is_found() {
            self.ttl
        } else {
            self.not_found_ttl
        }
    }

    /// Lifetime left for an entry created at `stored_at`, as of `now`.
    pub fn remaining<V: Cacheable>(&self, stored: &Stored<V>, now: OffsetDateTime) -> Duration {
        let age = Duration::try_from(now - stored.stored_at).unwrap_or(Duration::ZERO);
        self.ttl_for(&stored.value).saturating_sub(age)
    }

    pub fn is_expired<V: Cacheable>(&self, stored: &Stored<V>, now: OffsetDateTime) -> bool {
        self.remaining(stored, now).is_zero()
    }
}

struct CreationExpiry {
    policy: ExpiryPolicy,
}

impl<V: Cacheable> Expiry<String, Stored<V>> for CreationExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.policy.remaining(value, OffsetDateTime::now_utc()))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.policy.remaining(value, OffsetDateTime::now_utc()))
    }
}

/// Bounded cache with single-flight and bulk loading.
///
/// `E` is the loader error; failures of an in-flight bulk load are handed to
/// every caller that joined it.
pub struct LoadingCache<V: Cacheable, E> {
    name: &'static str,
    policy: ExpiryPolicy,
    inner: Cache<String, Stored<V>>,
    in_flight: DashMap<String, InFlight<V, E>>,
    next_claim: AtomicU64,
}

/// Cache of release collections keyed by `hardcover/<kind>/<slug>`.
pub type CollectionCache = LoadingCache<Collection, CatalogError>;
/// Cache of derived user interests keyed by `hardcover/user/<username>`.
pub type InterestCache = LoadingCache<UserInterests, CatalogError>;

/// A key currently being loaded by one `bulk_get` caller.
struct InFlight<V, E> {
    claim: u64,
    slot: watch::Receiver<Slot<V, E>>,
}

enum Slot<V, E> {
    Loading,
    Done {
        value: Option<V>,
        error: Option<Arc<E>>,
    },
}

impl<V: Clone, E> Clone for Slot<V, E> {
    fn clone(&self) -> Self {
        match self {
            Slot::Loading => Slot::Loading,
            Slot::Done { value, error } => Slot::Done {
                value: value.clone(),
                error: error.clone(),
            },
        }
    }
}

enum Claim<V, E> {
    Owned(watch::Sender<Slot<V, E>>),
    Joined(watch::Receiver<Slot<V, E>>),
}

/// Releases the keys one `bulk_get` round claimed, also when the caller is cancelled.
struct ClaimGuard<'a, V, E> {
    in_flight: &'a DashMap<String, InFlight<V, E>>,
    claim: u64,
    keys: Vec<String>,
}

impl<V, E> Drop for ClaimGuard<'_, V, E> {
    fn drop(&mut self) {
        for key in &self.keys {
            self.in_flight
                .remove_if(key, |_, in_flight| in_flight.claim == self.claim);
        }
    }
}

impl<V: Cacheable, E> LoadingCache<V, E> {
    pub fn new(name: &'static str, max_capacity: u64, policy: ExpiryPolicy) -> Self {
        let inner = Cache::builder()
            .name(name)
            .max_capacity(max_capacity)
            .expire_after(CreationExpiry { policy })
            .build();

        Self {
            name,
            policy,
            inner,
            in_flight: DashMap::new(),
            next_claim: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Cached value for `key`, without loading.
    pub async fn get_if_present(&self, key: &str) -> Option<V> {
        self.inner.get(key).await.map(|stored| stored.value)
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), Stored::now(value)).await;
    }

    /// Insert an entry that keeps its original creation time, e.g. from a snapshot.
    pub async fn insert_stored(&self, key: impl Into<String>, stored: Stored<V>) {
        self.inner.insert(key.into(), stored).await;
    }

    /// Point-in-time copy of all live entries.
    pub fn entries(&self) -> Vec<(String, Stored<V>)> {
        let now = OffsetDateTime::now_utc();
        self.inner
            .iter()
            .filter(|(_, stored)| !self.policy.is_expired(stored, now))
            .map(|(key, stored)| (key.as_ref().clone(), stored))
            .collect()
    }

    fn claim(&self, key: &str, claim: u64) -> Claim<V, E> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => Claim::Joined(entry.get().slot.clone()),
            Entry::Vacant(entry) => {
                let (sender, slot) = watch::channel(Slot::Loading);
                entry.insert(InFlight { claim, slot });
                Claim::Owned(sender)
            }
        }
    }
}

impl<V, E> LoadingCache<V, E>
where
    V: Cacheable,
    E: StdError + Send + Sync + 'static,
{
    /// Return the cached value for `key`, loading it on a miss.
    ///
    /// Concurrent callers for the same absent key share one loader invocation
    /// and all observe its outcome. Errors are handed to every waiter and are
    /// never stored.
    pub async fn get<L>(&self, key: &str, loader: &L) -> Result<V, Arc<E>>
    where
        L: Loader<V, Error = E> + ?Sized,
    {
        let entry = self
            .inner
            .entry_by_ref(key)
            .or_try_insert_with(async {
                counter!(METRIC_CACHE_LOAD, "cache" => self.name).increment(1);
                match loader.load(key).await {
                    Ok(value) => Ok(Stored::now(value)),
                    Err(err) => {
                        counter!(METRIC_CACHE_LOAD_ERROR, "cache" => self.name).increment(1);
                        Err(err)
                    }
                }
            })
            .await?;

        if entry.is_fresh() {
            counter!(METRIC_CACHE_MISS, "cache" => self.name).increment(1);
        } else {
            counter!(METRIC_CACHE_HIT, "cache" => self.name).increment(1);
        }

        Ok(entry.into_value().value)
    }

    /// Resolve every key in `keys`, loading all absent ones with one bulk call.
    ///
    /// Duplicate keys collapse. Keys another caller is already loading are
    /// awaited rather than loaded again, so at most one load per key is in
    /// flight. The loader is not called when every key is cached or claimed.
    /// When a load reports an error, whatever it did produce is returned
    /// alongside the error but nothing from that load is stored.
    pub async fn bulk_get<L>(&self, keys: &[String], loader: &L) -> BulkOutcome<V, Arc<E>>
    where
        L: BulkLoader<V, Error = E> + ?Sized,
    {
        let mut entries = HashMap::with_capacity(keys.len());
        let mut error = None;
        let mut seen = HashSet::with_capacity(keys.len());
        let mut pending: Vec<String> = keys
            .iter()
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect();

        // A second round only happens when the caller we joined was cancelled.
        while !pending.is_empty() {
            let claim = self.next_claim.fetch_add(1, Ordering::Relaxed);
            let mut guard = ClaimGuard {
                in_flight: &self.in_flight,
                claim,
                keys: Vec::new(),
            };
            let mut owned = Vec::new();
            let mut joined = Vec::new();

            for key in pending.drain(..) {
                if let Some(stored) = self.inner.get(key.as_str()).await {
                    counter!(METRIC_CACHE_HIT, "cache" => self.name).increment(1);
                    entries.insert(key, stored.value);
                    continue;
                }
                match self.claim(&key, claim) {
                    Claim::Joined(slot) => {
                        counter!(METRIC_CACHE_MISS, "cache" => self.name).increment(1);
                        joined.push((key, slot));
                    }
                    Claim::Owned(sender) => {
                        guard.keys.push(key.clone());
                        // Checked after claiming: a load finishing in between has already stored its value.
                        match self.inner.get(key.as_str()).await {
                            Some(stored) => {
                                counter!(METRIC_CACHE_HIT, "cache" => self.name).increment(1);
                                sender.send_replace(Slot::Done {
                                    value: Some(stored.value.clone()),
                                    error: None,
                                });
                                entries.insert(key, stored.value);
                            }
                            None => {
                                counter!(METRIC_CACHE_MISS, "cache" => self.name).increment(1);
                                owned.push((key, sender));
                            }
                        }
                    }
                }
            }

            // Load our own claims before waiting on others so two callers
            // holding each other's keys both make progress.
            if !owned.is_empty() {
                let load_error = self.load_owned(owned, loader, &mut entries).await;
                if error.is_none() {
                    error = load_error;
                }
            }
            drop(guard);

            for (key, mut slot) in joined {
                let settled = slot
                    .wait_for(|slot| matches!(slot, Slot::Done { .. }))
                    .await
                    .map(|slot| (*slot).clone());
                match settled {
                    Ok(Slot::Done {
                        value,
                        error: failure,
                    }) => {
                        if let Some(value) = value {
                            entries.insert(key, value);
                        }
                        if error.is_none() {
                            error = failure;
                        }
                    }
                    // The owner went away before finishing; claim the key ourselves.
                    _ => pending.push(key),
                }
            }
        }

        BulkOutcome { entries, error }
    }

    async fn load_owned<L>(
        &self,
        owned: Vec<(String, watch::Sender<Slot<V, E>>)>,
        loader: &L,
        entries: &mut HashMap<String, V>,
    ) -> Option<Arc<E>>
    where
        L: BulkLoader<V, Error = E> + ?Sized,
    {
        let keys: Vec<String> = owned.iter().map(|(key, _)| key.clone()).collect();
        debug!(
            target = "bookfeed::cache::store",
            cache = self.name,
            missing = keys.len(),
            "bulk load"
        );
        counter!(METRIC_CACHE_LOAD, "cache" => self.name).increment(1);

        let BulkOutcome {
            entries: mut loaded,
            error,
        } = loader.bulk_load(&keys).await;
        let error = error.map(Arc::new);
        if error.is_some() {
            counter!(METRIC_CACHE_LOAD_ERROR, "cache" => self.name).increment(1);
        }

        for (key, sender) in owned {
            let value = loaded.remove(&key);
            if let (Some(value), None) = (value.as_ref(), error.as_ref()) {
                self.inner
                    .insert(key.clone(), Stored::now(value.clone()))
                    .await;
            }
            sender.send_replace(Slot::Done {
                value: value.clone(),
                error: error.clone(),
            });
            if let Some(value) = value {
                entries.insert(key, value);
            }
        }

        error
    }
}
