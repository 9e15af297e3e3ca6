//! Upstream book catalog access.
//!
//! [`CatalogClient`] is the seam between the aggregation layer and the
//! network. [`HardcoverClient`] implements it against Hardcover's GraphQL API;
//! tests substitute in-memory fakes.

mod hardcover;
mod queries;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;
use time::{Date, Duration, OffsetDateTime};

pub use hardcover::{HardcoverClient, RetryPolicy};
pub use types::{
    RawAuthor, RawAuthorReleases, RawBook, RawSeries, RawSeriesReleases, RawUserBooks,
};

/// Closed date range `[since, until]` used to bound release queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseWindow {
    pub since: Date,
    pub until: Date,
}

impl ReleaseWindow {
    /// Window ending today (UTC) and reaching `lookback` into the past.
    pub fn trailing(lookback: Duration) -> Self {
        Self::trailing_from(OffsetDateTime::now_utc(), lookback)
    }

    pub fn trailing_from(now: OffsetDateTime, lookback: Duration) -> Self {
        Self {
            since: (now - lookback).date(),
            until: now.date(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog responded with HTTP {status}")]
    Status { status: u16, body: String },
    #[error("catalog query failed: {}", .messages.join("; "))]
    Query { messages: Vec<String> },
    #[error("catalog response carried no data")]
    EmptyResponse,
    #[error("invalid catalog configuration: {0}")]
    Configuration(String),
}

impl CatalogError {
    /// Returns `true` if retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Transport(err) => err.is_timeout() || err.is_connect(),
            CatalogError::Status { status, .. } => *status == 429 || *status >= 500,
            CatalogError::Query { .. }
            | CatalogError::EmptyResponse
            | CatalogError::Configuration(_) => false,
        }
    }
}

/// Queries the aggregation layer needs from the upstream catalog.
///
/// All calls are cancel-safe: dropping the future aborts the request.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch_recent(&self, window: ReleaseWindow) -> Result<Vec<RawBook>, CatalogError>;

    async fn fetch_by_author_slugs(
        &self,
        window: ReleaseWindow,
        slugs: &[String],
        include_compilations: bool,
    ) -> Result<RawAuthorReleases, CatalogError>;

    async fn fetch_by_author_ids(
        &self,
        window: ReleaseWindow,
        ids: &[i64],
        include_compilations: bool,
    ) -> Result<RawAuthorReleases, CatalogError>;

    async fn fetch_by_series_slugs(
        &self,
        window: ReleaseWindow,
        slugs: &[String],
        include_compilations: bool,
    ) -> Result<RawSeriesReleases, CatalogError>;

    async fn fetch_by_series_ids(
        &self,
        window: ReleaseWindow,
        ids: &[i64],
        include_compilations: bool,
    ) -> Result<RawSeriesReleases, CatalogError>;

    /// Library of `username` with books added on or after `since`.
    async fn fetch_user_library(
        &self,
        username: &str,
        since: Date,
    ) -> Result<RawUserBooks, CatalogError>;
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn trailing_window_spans_lookback() {
        let now = datetime!(2024-03-15 10:00 UTC);
        let window = ReleaseWindow::trailing_from(now, Duration::days(30));
        assert_eq!(window.until, time::macros::date!(2024 - 03 - 15));
        assert_eq!(window.since, time::macros::date!(2024 - 02 - 14));
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        let throttled = CatalogError::Status {
            status: 429,
            body: String::new(),
        };
        let unavailable = CatalogError::Status {
            status: 503,
            body: String::new(),
        };
        let unauthorized = CatalogError::Status {
            status: 401,
            body: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(unavailable.is_retryable());
        assert!(!unauthorized.is_retryable());
        assert!(
            !CatalogError::Query {
                messages: vec!["field not found".into()]
            }
            .is_retryable()
        );
    }
}
