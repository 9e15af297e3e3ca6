use std::{future::IntoFuture, io::Write, net::SocketAddr, process, sync::Arc, time::Duration};

use bookfeed::{
    application::{
        error::AppError,
        feed::{Feed, FeedAssembler, FeedService},
        releases::{ReleaseAggregator, ReleaseFilter, ReleaseOptions},
        syndication::{FeedFormat, encode},
    },
    cache::{self, CacheConfig, CollectionCache, InterestCache, SnapshotStore},
    catalog::{HardcoverClient, RetryPolicy},
    config::{self, Command, FeedArgs, FeedFormatArg, FeedKind, ServeArgs, Settings},
    domain::slug::normalize_slug,
    infra::{
        error::InfraError,
        http::{self, HttpState, RateLimiter},
        telemetry,
    },
    presentation::views::TemplateContentRenderer,
};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        report_application_error(&err);
        process::exit(1);
    }
}

fn report_application_error(err: &AppError) {
    if dispatcher::has_been_set() {
        error!(target = "bookfeed::main", error = %err, "bookfeed terminated");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    dispatcher::with_default(&dispatcher::Dispatch::new(subscriber), || {
        error!(target = "bookfeed::main", error = %err, "bookfeed terminated");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        Command::Serve(_) => serve(settings).await,
        Command::Feed(args) => print_feed(settings, args).await,
    }
}

struct Services {
    feeds: Arc<FeedService>,
    collections: Arc<CollectionCache>,
    interests: Arc<InterestCache>,
    cache_config: CacheConfig,
}

fn build_services(settings: &Settings) -> Result<Services, AppError> {
    let catalog_settings = &settings.catalog;
    if catalog_settings.token.is_none() {
        warn!(
            target = "bookfeed::main",
            "no Hardcover token configured; catalog requests will be anonymous"
        );
    }

    let catalog = HardcoverClient::new(
        catalog_settings.endpoint.as_str(),
        catalog_settings.token.as_deref(),
        catalog_settings.request_timeout,
        RetryPolicy {
            max_attempts: catalog_settings.max_attempts.get(),
            initial_backoff: catalog_settings.initial_backoff,
            max_backoff: catalog_settings.max_backoff,
        },
    )
    .map_err(|err| AppError::from(InfraError::from(err)))?;

    let cache_config = CacheConfig::from(&settings.cache);
    let collections = Arc::new(cache::collection_cache(&cache_config));
    let interests = Arc::new(cache::interest_cache(&cache_config));

    let releases = &settings.releases;
    let options = ReleaseOptions {
        recent_lookback: days(releases.recent_lookback_days.get()),
        entity_lookback: days(releases.entity_lookback_days.get()),
        library_lookback: days(releases.library_lookback_days.get()),
        include_compilations: catalog_settings.include_compilations,
    };

    let aggregator = Arc::new(ReleaseAggregator::new(
        Arc::new(catalog),
        collections.clone(),
        interests.clone(),
        options,
    ));
    let assembler = FeedAssembler::new(Arc::new(TemplateContentRenderer));
    let feeds = Arc::new(FeedService::new(aggregator, assembler));

    Ok(Services {
        feeds,
        collections,
        interests,
        cache_config,
    })
}

fn days(count: u32) -> time::Duration {
    time::Duration::days(i64::from(count))
}

async fn serve(settings: Settings) -> Result<(), AppError> {
    let services = build_services(&settings)?;

    let snapshots = services
        .cache_config
        .enable_snapshots
        .then(|| SnapshotStore::new(services.cache_config.snapshot_dir.clone()));
    if let Some(store) = snapshots.as_ref() {
        store.restore_logged(&services.collections).await;
        store.restore_logged(&services.interests).await;
    }

    let snapshot_task = snapshots.clone().map(|store| {
        spawn_snapshot_task(
            store,
            services.collections.clone(),
            services.interests.clone(),
            services.cache_config.snapshot_interval(),
        )
    });

    let rate_limiter = settings.rate_limit.enabled.then(|| {
        RateLimiter::new(
            Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
            settings.rate_limit.max_requests.get(),
        )
    });

    let state = HttpState {
        feeds: services.feeds.clone(),
        collection_ttl: settings.cache.collection_ttl,
        request_timeout: settings.server.request_timeout,
        rate_limiter,
        log_requests: settings.logging.requests,
    };

    let result = serve_http(
        settings.server.addr,
        settings.server.graceful_shutdown,
        http::build_router(state),
    )
    .await;

    if let Some(handle) = snapshot_task {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(store) = snapshots.as_ref() {
        store.persist_logged(&services.collections).await;
        store.persist_logged(&services.interests).await;
    }

    result
}

fn spawn_snapshot_task(
    store: SnapshotStore,
    collections: Arc<CollectionCache>,
    interests: Arc<InterestCache>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            store.persist_logged(&collections).await;
            store.persist_logged(&interests).await;
        }
    })
}

async fn serve_http(
    addr: SocketAddr,
    grace: Duration,
    router: axum::Router,
) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = "bookfeed::main", %addr, "serving feeds");

    let stopping = Arc::new(Notify::new());
    let signal = {
        let stopping = stopping.clone();
        async move {
            shutdown_signal().await;
            stopping.notify_waiters();
        }
    };
    let drain_deadline = async {
        stopping.notified().await;
        tokio::time::sleep(grace).await;
    };

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .into_future();

    tokio::select! {
        result = server => result.map_err(|err| AppError::from(InfraError::from(err)))?,
        _ = drain_deadline => {
            warn!(
                target = "bookfeed::main",
                grace_ms = grace.as_millis() as u64,
                "in-flight requests did not finish before the shutdown deadline"
            );
        }
    }

    info!(target = "bookfeed::main", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "bookfeed::main", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "bookfeed::main", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "bookfeed::main", "shutdown signal received");
}

async fn print_feed(settings: Settings, args: FeedArgs) -> Result<(), AppError> {
    let services = build_services(&settings)?;
    let feed = build_feed(&services.feeds, &args).await?;

    let format = match args.format {
        FeedFormatArg::Rss => FeedFormat::Rss,
        FeedFormatArg::Atom => FeedFormat::Atom,
        FeedFormatArg::Json => FeedFormat::Json,
    };
    let body = encode(&feed, format)?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(body.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    if feed.partial {
        warn!(
            target = "bookfeed::main",
            "feed is incomplete; some interests could not be loaded"
        );
    }
    Ok(())
}

async fn build_feed(feeds: &FeedService, args: &FeedArgs) -> Result<Feed, AppError> {
    if args.kind == FeedKind::Recent {
        return Ok(feeds.recent_feed().await?);
    }

    let raw = args
        .slug
        .as_deref()
        .ok_or_else(|| AppError::validation("a slug or username is required for this feed"))?;
    let slug = normalize_slug(raw).map_err(|err| AppError::validation(err.to_string()))?;

    let feed = match args.kind {
        FeedKind::Author => feeds.author_feed(&slug).await?,
        FeedKind::Series => feeds.series_feed(&slug).await?,
        FeedKind::User => {
            let filter = args
                .filter
                .as_deref()
                .unwrap_or_default()
                .parse::<ReleaseFilter>()?;
            feeds.user_feed(&slug, filter).await?
        }
        FeedKind::Recent => feeds.recent_feed().await?,
    };
    Ok(feed)
}
