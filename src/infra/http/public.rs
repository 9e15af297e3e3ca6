use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, LAST_MODIFIED},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use metrics::{counter, histogram};
use serde::Deserialize;
use time::{
    Duration, OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem,
    macros::format_description,
};

use crate::{
    application::{
        error::{HttpError, NOT_FOUND_CACHE_CONTROL},
        feed::Feed,
        releases::{ReleaseError, ReleaseFilter},
        syndication::{FeedFormat, encode, split_format},
    },
    domain::slug::normalize_slug,
};

use super::{
    HttpState,
    middleware::{enforce_deadline, limit_requests, log_responses, set_request_context},
};

const METRIC_FEED_REQUESTS: &str = "bookfeed_feed_requests_total";
const METRIC_FEED_RENDER_MS: &str = "bookfeed_feed_render_ms";
const HTTP_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

pub fn build_router(state: HttpState) -> Router {
    let feeds = Router::new()
        .route("/hc/{entry}", get(recent_feed))
        .route("/hc/author/{author}", get(author_feed))
        .route("/hc/series/{series}", get(series_feed))
        .route("/hc/me/{username}", get(user_feed))
        .layer(middleware::from_fn_with_state(state.clone(), limit_requests));

    Router::new()
        .route("/up", get(heartbeat))
        .merge(feeds)
        .fallback(fallback)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_deadline,
        ))
        .layer(middleware::from_fn_with_state(state, log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilterQuery {
    filter: Option<String>,
}

async fn heartbeat() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("."))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn fallback() -> Response {
    not_found("infra::http::public::fallback", "no route matched").into_response()
}

async fn recent_feed(State(state): State<HttpState>, Path(entry): Path<String>) -> Response {
    let (name, format) = split_format(&entry);
    if !name.eq_ignore_ascii_case("recent") {
        return not_found("infra::http::public::recent", format!("unknown feed `{name}`"))
            .into_response();
    }

    let started = Instant::now();
    let result = state.feeds.recent_feed().await;
    respond(&state, "recent", format, started, result)
}

async fn author_feed(State(state): State<HttpState>, Path(segment): Path<String>) -> Response {
    let (slug, format) = match feed_target("infra::http::public::author", &segment) {
        Ok(target) => target,
        Err(err) => return err.into_response(),
    };

    let started = Instant::now();
    let result = state.feeds.author_feed(&slug).await;
    respond(&state, "author", format, started, result)
}

async fn series_feed(State(state): State<HttpState>, Path(segment): Path<String>) -> Response {
    let (slug, format) = match feed_target("infra::http::public::series", &segment) {
        Ok(target) => target,
        Err(err) => return err.into_response(),
    };

    let started = Instant::now();
    let result = state.feeds.series_feed(&slug).await;
    respond(&state, "series", format, started, result)
}

async fn user_feed(
    State(state): State<HttpState>,
    Path(segment): Path<String>,
    Query(query): Query<FilterQuery>,
) -> Response {
    let (username, format) = match feed_target("infra::http::public::user", &segment) {
        Ok(target) => target,
        Err(err) => return err.into_response(),
    };
    let filter = match query
        .filter
        .as_deref()
        .unwrap_or_default()
        .parse::<ReleaseFilter>()
    {
        Ok(filter) => filter,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let started = Instant::now();
    let result = state.feeds.user_feed(&username, filter).await;
    respond(&state, "user", format, started, result)
}

/// Lower-cased slug and feed format from a `slug[.ext]` path segment.
fn feed_target(source: &'static str, segment: &str) -> Result<(String, FeedFormat), HttpError> {
    let (name, format) = split_format(segment);
    match normalize_slug(name) {
        Ok(slug) => Ok((slug, format)),
        Err(err) => Err(not_found(source, err.to_string())),
    }
}

fn not_found(source: &'static str, detail: impl Into<String>) -> HttpError {
    HttpError::new(source, StatusCode::NOT_FOUND, "Not found", detail)
        .with_cache_control(NOT_FOUND_CACHE_CONTROL)
}

fn respond(
    state: &HttpState,
    kind: &'static str,
    format: FeedFormat,
    started: Instant,
    result: Result<Feed, ReleaseError>,
) -> Response {
    let response = match result {
        Ok(feed) => feed_response(&feed, format, state.collection_ttl),
        Err(err) => HttpError::from(err).into_response(),
    };

    let status = response.status().as_u16().to_string();
    counter!(
        METRIC_FEED_REQUESTS,
        "kind" => kind,
        "format" => format.as_str(),
        "status" => status
    )
    .increment(1);
    histogram!(METRIC_FEED_RENDER_MS, "kind" => kind)
        .record(started.elapsed().as_secs_f64() * 1000.0);
    response
}

fn feed_response(feed: &Feed, format: FeedFormat, ttl: std::time::Duration) -> Response {
    let body = match encode(feed, format) {
        Ok(body) => body,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let cache_control = if feed.partial {
        "no-store".to_string()
    } else {
        let remaining = remaining_seconds(feed.created, ttl, OffsetDateTime::now_utc());
        format!("max-age={remaining}")
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, format.content_type())
        .header(LAST_MODIFIED, http_date(feed.created))
        .header(CACHE_CONTROL, cache_control)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Seconds until a collection created at `created` leaves the cache, floored at zero.
fn remaining_seconds(created: OffsetDateTime, ttl: std::time::Duration, now: OffsetDateTime) -> i64 {
    let ttl = Duration::try_from(ttl).unwrap_or(Duration::MAX);
    (created.saturating_add(ttl) - now).whole_seconds().max(0)
}

fn http_date(value: OffsetDateTime) -> String {
    let value = value.to_offset(UtcOffset::UTC);
    value
        .format(HTTP_DATE_FORMAT)
        .unwrap_or_else(|_| value.to_string())
}
