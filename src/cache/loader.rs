//! Loader seams used by [`LoadingCache`](super::LoadingCache) on a miss.

use std::{collections::HashMap, error::Error as StdError};

use async_trait::async_trait;

/// Computes the value of one absent key.
#[async_trait]
pub trait Loader<V: Send + 'static>: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    async fn load(&self, key: &str) -> Result<V, Self::Error>;
}

/// Computes the values of several absent keys with one upstream round trip.
///
/// Implementations return whatever they managed to produce even when they
/// also report an error; keys they could not resolve are simply absent.
#[async_trait]
pub trait BulkLoader<V: Send + 'static>: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    async fn bulk_load(&self, keys: &[String]) -> BulkOutcome<V, Self::Error>;
}

/// Result of a bulk load or a bulk cache read: resolved entries plus an optional failure.
#[derive(Debug)]
pub struct BulkOutcome<V, E> {
    pub entries: HashMap<String, V>,
    pub error: Option<E>,
}

impl<V, E> BulkOutcome<V, E> {
    pub fn complete(entries: HashMap<String, V>) -> Self {
        Self {
            entries,
            error: None,
        }
    }

    pub fn partial(entries: HashMap<String, V>, error: E) -> Self {
        Self {
            entries,
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}
