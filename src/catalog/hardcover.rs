use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};
use tracing::{debug, warn};
use url::Url;

use super::{
    CatalogClient, CatalogError, RawAuthorReleases, RawBook, RawSeriesReleases, RawUserBooks,
    ReleaseWindow, queries, types::RawRecentReleases,
};

const USER_AGENT: &str = concat!(
    "bookfeed/",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Exponential backoff for transient catalog failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// GraphQL client for `api.hardcover.app`.
#[derive(Debug, Clone)]
pub struct HardcoverClient {
    http: reqwest::Client,
    endpoint: Url,
    authorization: Option<String>,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl HardcoverClient {
    pub fn new(
        endpoint: &str,
        token: Option<&str>,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, CatalogError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| CatalogError::Configuration(format!("endpoint `{endpoint}`: {err}")))?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            authorization: token.map(authorization_header),
            retry,
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        document: &'static str,
        variables: Value,
    ) -> Result<T, CatalogError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute(document, &variables).await {
                Ok(data) => {
                    debug!(
                        target = "bookfeed::catalog::hardcover",
                        operation, attempt, "catalog query succeeded"
                    );
                    return Ok(data);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        target = "bookfeed::catalog::hardcover",
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying catalog query"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: &Value,
    ) -> Result<T, CatalogError> {
        let mut request = self.http.post(self.endpoint.clone()).json(&GraphQlRequest {
            query: document,
            variables,
        });
        if let Some(value) = self.authorization.as_deref() {
            request = request.header(AUTHORIZATION, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GraphQlResponse<T> = response.json().await?;
        if !envelope.errors.is_empty() {
            return Err(CatalogError::Query {
                messages: envelope.errors.into_iter().map(|e| e.message).collect(),
            });
        }
        envelope.data.ok_or(CatalogError::EmptyResponse)
    }
}

fn authorization_header(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

fn compilation_filter(include_compilations: bool) -> Value {
    if include_compilations {
        json!([true, false])
    } else {
        json!([false])
    }
}

fn window_variables(window: ReleaseWindow, include_compilations: bool) -> Value {
    json!({
        "since": format_date(window.since),
        "until": format_date(window.until),
        "compilations": compilation_filter(include_compilations),
    })
}

fn with_field(mut variables: Value, name: &str, value: Value) -> Value {
    if let Value::Object(map) = &mut variables {
        map.insert(name.to_string(), value);
    }
    variables
}

#[async_trait]
impl CatalogClient for HardcoverClient {
    async fn fetch_recent(&self, window: ReleaseWindow) -> Result<Vec<RawBook>, CatalogError> {
        let variables = json!({
            "since": format_date(window.since),
            "until": format_date(window.until),
        });
        let data: RawRecentReleases = self
            .query("recent_releases", queries::RECENT_RELEASES, variables)
            .await?;
        Ok(data.books)
    }

    async fn fetch_by_author_slugs(
        &self,
        window: ReleaseWindow,
        slugs: &[String],
        include_compilations: bool,
    ) -> Result<RawAuthorReleases, CatalogError> {
        let variables = with_field(
            window_variables(window, include_compilations),
            "slugs",
            json!(slugs),
        );
        self.query(
            "author_releases_by_slug",
            queries::AUTHOR_RELEASES_BY_SLUG,
            variables,
        )
        .await
    }

    async fn fetch_by_author_ids(
        &self,
        window: ReleaseWindow,
        ids: &[i64],
        include_compilations: bool,
    ) -> Result<RawAuthorReleases, CatalogError> {
        let variables = with_field(
            window_variables(window, include_compilations),
            "ids",
            json!(ids),
        );
        self.query(
            "author_releases_by_id",
            queries::AUTHOR_RELEASES_BY_ID,
            variables,
        )
        .await
    }

    async fn fetch_by_series_slugs(
        &self,
        window: ReleaseWindow,
        slugs: &[String],
        include_compilations: bool,
    ) -> Result<RawSeriesReleases, CatalogError> {
        let variables = with_field(
            window_variables(window, include_compilations),
            "slugs",
            json!(slugs),
        );
        self.query(
            "series_releases_by_slug",
            queries::SERIES_RELEASES_BY_SLUG,
            variables,
        )
        .await
    }

    async fn fetch_by_series_ids(
        &self,
        window: ReleaseWindow,
        ids: &[i64],
        include_compilations: bool,
    ) -> Result<RawSeriesReleases, CatalogError> {
        let variables = with_field(
            window_variables(window, include_compilations),
            "ids",
            json!(ids),
        );
        self.query(
            "series_releases_by_id",
            queries::SERIES_RELEASES_BY_ID,
            variables,
        )
        .await
    }

    async fn fetch_user_library(
        &self,
        username: &str,
        since: Date,
    ) -> Result<RawUserBooks, CatalogError> {
        let variables = json!({
            "username": username,
            "since": format_date(since),
        });
        self.query("user_library", queries::USER_LIBRARY, variables)
            .await
    }
}
