use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stocksim::application::actors::{PriceStreamActor, StreamConfig};
use stocksim::application::handlers::{router, AppState};
use stocksim::application::services::{PriceService, SymbolService};
use stocksim::config::{QuoteSource, SimulatorConfig};
use stocksim::infrastructure::quote_provider_factory::QuoteProviderFactory;
use stocksim::persistence::{init_database, DatabaseConfig};
use stocksim::rate_limit::prune_rate_limiter;
use stocksim::task_runner::{run_periodic, RetryPolicy};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time allowed for background tasks to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How often idle rate-limit buckets are dropped
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stocksim=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SimulatorConfig::from_env();
    info!(
        "Stock simulator starting (quotes: {}, {} default symbols)",
        config.quote_source,
        config.default_symbols.len()
    );

    let pool = init_database(&DatabaseConfig::from_env()).await?;
    let provider = QuoteProviderFactory::create(&config)?;
    let mut state = AppState::new(pool, provider, &config);

    let seeded = state.symbols.seed(&config.default_symbols).await?;
    let enabled = state.symbols.enabled_symbols().await?;
    info!("{} symbols seeded, {} enabled", seeded, enabled.len());

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut background = Vec::new();

    match config.quote_source {
        QuoteSource::Finnhub => {
            let (handle, task) = PriceStreamActor::spawn(
                StreamConfig::from_simulator_config(&config),
                state.prices.cache(),
                state.prices.registry(),
                enabled,
            );
            state.attach_stream(handle).await;
            background.push(task);
        }
        QuoteSource::Simulated => {
            let prices = state.prices.clone();
            let symbols = state.symbols.clone();
            let policy = RetryPolicy::every(config.quote_refresh_interval());
            let stop_rx = stop_rx.clone();
            background.push(tokio::spawn(async move {
                run_periodic("quote_refresh", policy, stop_rx, || {
                    refresh_quotes(prices.clone(), symbols.clone())
                })
                .await;
            }));
        }
    }

    let limiter = state.rate_limiter.clone();
    background.push(tokio::spawn(async move {
        run_periodic(
            "rate_limit_prune",
            RetryPolicy::every(RATE_LIMIT_PRUNE_INTERVAL),
            stop_rx,
            || {
                let remaining = prune_rate_limiter(&limiter);
                debug!("{} rate limit buckets in use", remaining);
                std::future::ready(Ok::<(), String>(()))
            },
        )
        .await;
    }));

    let stream = state.stream.clone();
    let app = router(state, &config);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down gracefully...");
    stop_tx.send_replace(true);
    if let Some(stream) = stream {
        stream.shutdown().await;
    }
    for task in background {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("Background task did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// One polling round over the enabled symbols
async fn refresh_quotes(prices: Arc<PriceService>, symbols: Arc<SymbolService>) -> Result<(), String> {
    let enabled = symbols.enabled_symbols().await.map_err(|e| e.to_string())?;
    if enabled.is_empty() {
        return Ok(());
    }

    let report = prices.refresh(&enabled).await;
    if report.refreshed == 0 {
        return Err(format!("no quote refreshed ({} failed)", report.failed.len()));
    }
    if !report.failed.is_empty() {
        warn!("Quote refresh failed for {:?}", report.failed);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
