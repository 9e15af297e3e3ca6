use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "bookfeed_cache_hit_total",
            Unit::Count,
            "Cache lookups answered from memory."
        );
        describe_counter!(
            "bookfeed_cache_miss_total",
            Unit::Count,
            "Cache lookups that required a load."
        );
        describe_counter!(
            "bookfeed_cache_load_total",
            Unit::Count,
            "Loader invocations, single or bulk."
        );
        describe_counter!(
            "bookfeed_cache_load_error_total",
            Unit::Count,
            "Loader invocations that returned an error."
        );
        describe_counter!(
            "bookfeed_feed_requests_total",
            Unit::Count,
            "Feed requests by kind, format and status."
        );
        describe_histogram!(
            "bookfeed_feed_render_ms",
            Unit::Milliseconds,
            "Time to resolve and encode a feed."
        );
    });
}
