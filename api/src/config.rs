use common::models::Platform;
use connectors::price::PriceFallback;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// TTL for the memoized current aggregate; on the order of the polling
    /// interval.
    pub current_cache_ttl: Duration,
    /// TTL for memoized historical range aggregates.
    pub historical_cache_ttl: Duration,
    /// How often the background job refreshes the current aggregate.
    pub current_job_interval: Duration,
    /// How often the background job backfills historical data.
    pub historical_job_interval: Duration,
    /// Trailing window, in days, for the periodic backfill.
    pub historical_fetch_days: i64,
    pub price_fallback: PriceFallback,
    /// Symbols each connector fetches historical data and account volume
    /// for.
    pub symbols: HashMap<Platform, Vec<String>>,
}

fn default_symbols() -> HashMap<Platform, Vec<String>> {
    let mut symbols = HashMap::new();
    symbols.insert(
        Platform::Bybit,
        vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
    );
    symbols.insert(
        Platform::Woox,
        vec!["PERP_BTC_USDT".to_string(), "PERP_ETH_USDT".to_string()],
    );
    symbols.insert(
        Platform::Paradex,
        vec!["BTC-USD-PERP".to_string(), "ETH-USD-PERP".to_string()],
    );
    symbols.insert(
        Platform::Hyperliquid,
        vec!["BTC".to_string(), "ETH".to_string()],
    );
    symbols
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            current_cache_ttl: Duration::from_secs(2 * 60),
            historical_cache_ttl: Duration::from_secs(10 * 60),
            current_job_interval: Duration::from_secs(5 * 60),
            historical_job_interval: Duration::from_secs(24 * 60 * 60),
            historical_fetch_days: 30,
            price_fallback: PriceFallback::AssumeParity,
            symbols: default_symbols(),
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map(Duration::from_secs)
}

fn env_symbols(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("API_HOST").unwrap_or(defaults.host);
        let port = std::env::var("API_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let price_fallback = match std::env::var("PRICE_FALLBACK").ok().as_deref() {
            Some("fail") => PriceFallback::Fail,
            _ => PriceFallback::AssumeParity,
        };

        let mut symbols = defaults.symbols;
        for (platform, var) in [
            (Platform::Bybit, "BYBIT_SYMBOLS"),
            (Platform::Woox, "WOOX_SYMBOLS"),
            (Platform::Paradex, "PARADEX_SYMBOLS"),
            (Platform::Hyperliquid, "HYPERLIQUID_SYMBOLS"),
        ] {
            if let Some(list) = env_symbols(var) {
                symbols.insert(platform, list);
            }
        }

        Self {
            host,
            port,
            current_cache_ttl: env_secs("CACHE_TTL_CURRENT_SECS")
                .unwrap_or(defaults.current_cache_ttl),
            historical_cache_ttl: env_secs("CACHE_TTL_HISTORICAL_SECS")
                .unwrap_or(defaults.historical_cache_ttl),
            current_job_interval: env_secs("CURRENT_VOLUME_JOB_SECS")
                .unwrap_or(defaults.current_job_interval),
            historical_job_interval: env_secs("HISTORICAL_JOB_SECS")
                .unwrap_or(defaults.historical_job_interval),
            historical_fetch_days: std::env::var("HISTORICAL_DATA_FETCH_DAYS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.historical_fetch_days),
            price_fallback,
            symbols,
        }
    }
}
