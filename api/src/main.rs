mod config;
mod credentials;
mod handler;
mod service;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use common::cache::Cache;
use common::models::Platform;
use connectors::bybit::BybitConnector;
use connectors::hyperliquid::HyperliquidConnector;
use connectors::paradex::ParadexConnector;
use connectors::price::PriceOracle;
use connectors::woox::WooxConnector;
use connectors::ExchangeConnector;
use credentials::EnvCredentialProvider;
use handler::AppState;
use service::AggregationService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting perpvol API");

    let config = config::ApiConfig::from_env();

    // Load store configuration from environment
    let store_config = store::StoreConfig::from_env()
        .map_err(|e| format!("Failed to load store configuration: {}", e))?;
    let volume_store = store::InfluxVolumeStore::new(store_config)
        .map_err(|e| format!("Failed to create volume store: {}", e))?;

    // The cache is the only shared mutable state; everything borrows it.
    let cache = Arc::new(Cache::new());
    let oracle = Arc::new(PriceOracle::new(cache.clone(), config.price_fallback)?);

    let woox_symbols = config.symbols.get(&Platform::Woox).cloned().unwrap_or_default();
    let paradex_markets = config
        .symbols
        .get(&Platform::Paradex)
        .cloned()
        .unwrap_or_default();

    let connectors: Vec<Arc<dyn ExchangeConnector>> = vec![
        Arc::new(BybitConnector::new()?),
        Arc::new(HyperliquidConnector::new(oracle.clone())?),
        Arc::new(WooxConnector::new(oracle.clone(), woox_symbols)?),
        Arc::new(ParadexConnector::new(
            oracle,
            cache.clone(),
            paradex_markets,
        )?),
    ];

    let service = AggregationService::new(
        connectors,
        Arc::new(EnvCredentialProvider),
        Arc::new(volume_store),
        cache,
        config.symbols.clone(),
        config.current_cache_ttl,
        config.historical_cache_ttl,
    );

    let state = Arc::new(AppState {
        service,
        config: config.clone(),
    });

    spawn_jobs(state.clone());

    // Create CORS middleware
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/volume/current", get(handler::get_current_volume))
        .route(
            "/api/v1/volume/current/:platform",
            get(handler::get_current_platform_volume),
        )
        .route(
            "/api/v1/volume/historical",
            get(handler::get_historical_volume),
        )
        .route(
            "/api/v1/volume/historical/fetch",
            post(handler::trigger_backfill),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Background job triggers: refresh the current aggregate on a short
/// interval and backfill the trailing historical window daily.
fn spawn_jobs(state: Arc<AppState>) {
    let current_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(current_state.config.current_job_interval);
        loop {
            ticker.tick().await;
            match current_state.service.current_aggregate().await {
                Ok(aggregate) => info!(
                    "current volume job: total {:.2} USD across {} platforms",
                    aggregate.total_volume_24h_usd,
                    aggregate.platforms.len()
                ),
                Err(e) => error!("current volume job failed: {}", e),
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.historical_job_interval);
        loop {
            ticker.tick().await;
            let end = (Utc::now() - ChronoDuration::days(1)).date_naive();
            let start = end - ChronoDuration::days(state.config.historical_fetch_days);
            match state
                .service
                .fetch_and_store_historical(None, start, end)
                .await
            {
                Ok(reports) => {
                    for report in reports {
                        info!(
                            "historical job: {} {:?} fetched {} stored {}",
                            report.platform, report.status, report.fetched, report.stored
                        );
                    }
                }
                Err(e) => error!("historical backfill job failed: {}", e),
            }
        }
    });
}
