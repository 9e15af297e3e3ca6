//! Flat-file snapshots of cache contents.
//!
//! Each cache is written to `<dir>/<cache name>.json` on a timer and at
//! shutdown, and read back at startup so a restart does not cold-start the
//! upstream catalog. Entries keep their original creation time; anything that
//! expired while the process was down is skipped on restore.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinError;
use tracing::{info, warn};

use super::store::{Cacheable, LoadingCache, Stored};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("failed to move snapshot into place: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("snapshot writer task failed: {0}")]
    Join(#[from] JoinError),
    #[error("unsupported snapshot version {found} (expected {SNAPSHOT_VERSION})")]
    Version { found: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile<V> {
    version: u32,
    entries: Vec<SnapshotEntry<V>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry<V> {
    key: String,
    #[serde(flatten)]
    stored: Stored<V>,
}

/// Reads and writes cache snapshots inside one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Load the snapshot for `cache` into it, returning the number of entries restored.
    ///
    /// A missing file is not an error.
    pub async fn restore<V, E>(&self, cache: &LoadingCache<V, E>) -> Result<usize, SnapshotError>
    where
        V: Cacheable + DeserializeOwned,
    {
        let path = self.path_for(cache.name());
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(
                    target = "bookfeed::cache::snapshot",
                    path = %path.display(),
                    "no snapshot to restore"
                );
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        let file: SnapshotFile<V> = serde_json::from_slice(&bytes)?;
        if file.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: file.version,
            });
        }

        let policy = cache.policy();
        let now = OffsetDateTime::now_utc();
        let total = file.entries.len();
        let mut restored = 0;
        for entry in file.entries {
            if policy.is_expired(&entry.stored, now) {
                continue;
            }
            cache.insert_stored(entry.key, entry.stored).await;
            restored += 1;
        }

        info!(
            target = "bookfeed::cache::snapshot",
            cache = cache.name(),
            path = %path.display(),
            restored,
            skipped = total - restored,
            "restored cache snapshot"
        );
        Ok(restored)
    }

    /// Write the current contents of `cache`, replacing any previous snapshot atomically.
    pub async fn persist<V, E>(&self, cache: &LoadingCache<V, E>) -> Result<usize, SnapshotError>
    where
        V: Cacheable + Serialize,
    {
        let entries: Vec<SnapshotEntry<V>> = cache
            .entries()
            .into_iter()
            .map(|(key, stored)| SnapshotEntry { key, stored })
            .collect();
        let count = entries.len();
        let bytes = serde_json::to_vec(&SnapshotFile {
            version: SNAPSHOT_VERSION,
            entries,
        })?;

        let dir = self.dir.clone();
        let path = self.path_for(cache.name());
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes)).await??;

        info!(
            target = "bookfeed::cache::snapshot",
            cache = cache.name(),
            path = %path.display(),
            entries = count,
            "saved cache snapshot"
        );
        Ok(count)
    }

    /// Persist and log instead of failing; used by the timer and at shutdown.
    pub async fn persist_logged<V, E>(&self, cache: &LoadingCache<V, E>)
    where
        V: Cacheable + Serialize,
    {
        if let Err(err) = self.persist(cache).await {
            warn!(
                target = "bookfeed::cache::snapshot",
                cache = cache.name(),
                error = %err,
                "failed to save cache snapshot"
            );
        }
    }

    /// Restore and log instead of failing; a corrupt snapshot only costs a cold cache.
    pub async fn restore_logged<V, E>(&self, cache: &LoadingCache<V, E>)
    where
        V: Cacheable + DeserializeOwned,
    {
        if let Err(err) = self.restore(cache).await {
            warn!(
                target = "bookfeed::cache::snapshot",
                cache = cache.name(),
                error = %err,
                "failed to restore cache snapshot"
            );
        }
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    std::fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::store::{CollectionCache, ExpiryPolicy};
    use crate::domain::Collection;

    fn collection_cache() -> CollectionCache {
        LoadingCache::new(
            "collection",
            100,
            ExpiryPolicy::new(Duration::from_secs(3600), Duration::from_secs(600)),
        )
    }

    #[tokio::test]
    async fn missing_snapshot_restores_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let cache = collection_cache();

        assert_eq!(store.restore(&cache).await.expect("restore"), 0);
    }

    #[tokio::test]
    async fn persisted_entries_survive_a_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());

        let before = collection_cache();
        before
            .insert(
                "hardcover/series/the-expanse",
                Collection::new("The Expanse", "series/the-expanse", Vec::new()),
            )
            .await;
        before
            .insert(
                "hardcover/author/nobody",
                Collection::not_found("authors/nobody"),
            )
            .await;
        assert_eq!(store.persist(&before).await.expect("persist"), 2);
        assert!(store.path_for("collection").exists());

        let after = collection_cache();
        assert_eq!(store.restore(&after).await.expect("restore"), 2);
        let restored = after
            .get_if_present("hardcover/series/the-expanse")
            .await
            .expect("restored entry");
        assert_eq!(restored.name, "The Expanse");
        assert!(
            !after
                .get_if_present("hardcover/author/nobody")
                .await
                .expect("negative entry")
                .found
        );
    }

    #[tokio::test]
    async fn expired_entries_are_skipped_on_restore() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let stale = SnapshotFile {
            version: SNAPSHOT_VERSION,
            entries: vec![SnapshotEntry {
                key: "hardcover/releases".to_string(),
                stored: Stored {
                    value: Collection::new("Recent", "upcoming/recent", Vec::new()),
                    stored_at: OffsetDateTime::now_utc() - time::Duration::hours(2),
                },
            }],
        };
        std::fs::write(
            store.path_for("collection"),
            serde_json::to_vec(&stale).expect("encode"),
        )
        .expect("write snapshot");

        let cache = collection_cache();
        assert_eq!(store.restore(&cache).await.expect("restore"), 0);
        assert!(cache.get_if_present("hardcover/releases").await.is_none());
    }

    #[tokio::test]
    async fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        std::fs::write(
            store.path_for("collection"),
            br#"{"version":99,"entries":[]}"#,
        )
        .expect("write snapshot");

        let cache = collection_cache();
        assert!(matches!(
            store.restore(&cache).await,
            Err(SnapshotError::Version { found: 99 })
        ));
    }
}
