use std::collections::HashMap;

use super::*;

#[test]
fn defaults_match_public_deployment() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 8080);
    assert_eq!(settings.server.request_timeout, Duration::from_secs(30));
    assert_eq!(
        settings.catalog.endpoint.as_str(),
        "https://api.hardcover.app/v1/graphql"
    );
    assert!(settings.catalog.token.is_none());
    assert!(!settings.catalog.include_compilations);
    assert_eq!(settings.cache.collection_ttl, Duration::from_secs(43_200));
    assert_eq!(settings.cache.not_found_ttl, Duration::from_secs(3_600));
    assert_eq!(settings.releases.recent_lookback_days.get(), 30);
    assert_eq!(settings.releases.entity_lookback_days.get(), 365);
    assert_eq!(settings.rate_limit.window_seconds.get(), 10);
    assert_eq!(settings.rate_limit.max_requests.get(), 10);
    assert!(!settings.logging.requests);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.catalog.token = Some("from-file".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        catalog: CatalogOverrides {
            token: Some("from-cli".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.catalog.token.as_deref(), Some("from-cli"));
}

#[test]
fn platform_env_only_fills_gaps() {
    let env: HashMap<&str, &str> = [("HARDCOVER_TOKEN", "env-token"), ("PORT", "9090")]
        .into_iter()
        .collect();
    let lookup = |name: &str| env.get(name).map(|value| value.to_string());

    let mut raw = RawSettings::default();
    raw.apply_platform_env(lookup);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.catalog.token.as_deref(), Some("env-token"));
    assert_eq!(settings.server.addr.port(), 9090);

    let mut raw = RawSettings::default();
    raw.catalog.token = Some("configured".to_string());
    raw.server.port = Some(7000);
    raw.apply_platform_env(lookup);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.catalog.token.as_deref(), Some("configured"));
    assert_eq!(settings.server.addr.port(), 7000);
}

#[test]
fn blank_token_is_treated_as_absent() {
    let mut raw = RawSettings::default();
    raw.catalog.token = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(settings.catalog.token.is_none());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        log_requests: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert!(settings.logging.requests);
}

#[test]
fn zero_durations_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.collection_ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");

    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.collection_ttl_seconds",
            ..
        }
    ));
}

#[test]
fn backoff_bounds_are_validated() {
    let mut raw = RawSettings::default();
    raw.catalog.initial_backoff_ms = Some(1_000);
    raw.catalog.max_backoff_ms = Some(10);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_endpoint_is_rejected() {
    let mut raw = RawSettings::default();
    raw.catalog.endpoint = Some("not a url".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "catalog.endpoint",
            ..
        })
    ));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["bookfeed"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "bookfeed",
        "serve",
        "--server-host",
        "127.0.0.1",
        "--rate-limit-max-requests",
        "50",
        "--catalog-include-compilations",
        "yes",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
            assert_eq!(serve.overrides.rate_limit_max_requests, Some(50));
            assert_eq!(serve.overrides.catalog.include_compilations, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_feed_arguments() {
    let args = CliArgs::parse_from([
        "bookfeed",
        "feed",
        "user",
        "reader",
        "--filter",
        "series",
        "--format",
        "atom",
    ]);

    match args.command.expect("feed command") {
        Command::Feed(feed) => {
            assert_eq!(feed.kind, FeedKind::User);
            assert_eq!(feed.slug.as_deref(), Some("reader"));
            assert_eq!(feed.filter.as_deref(), Some("series"));
            assert_eq!(feed.format, FeedFormatArg::Atom);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn feed_format_defaults_to_rss() {
    let args = CliArgs::parse_from(["bookfeed", "feed", "recent"]);

    match args.command.expect("feed command") {
        Command::Feed(feed) => {
            assert_eq!(feed.kind, FeedKind::Recent);
            assert!(feed.slug.is_none());
            assert_eq!(feed.format, FeedFormatArg::Rss);
        }
        _ => panic!("wrong command parsed"),
    }
}
