use crate::http::RestClient;
use chrono::{DateTime, Utc};
use common::cache::Cache;
use common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
const FRESH_TTL: Duration = Duration::from_secs(5 * 60);
const LAST_KNOWN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// What to do when a USD price cannot be resolved at all: neither a fresh
/// fetch nor a stale cached value is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceFallback {
    /// Assume 1:1 USD parity and log the degradation. Understates or
    /// overstates volume for non-stable assets; acceptable where a gap in
    /// the series is worse than an approximate point.
    AssumeParity,
    /// Fail the lookup and let the caller surface a per-platform error.
    Fail,
}

/// Resolves a base-asset symbol to a USD price with a TTL-bound cache.
///
/// Stablecoins short-circuit to 1.0. Other symbols go through CoinGecko
/// with a fresh cache entry (5 min TTL) and a long-lived last-known entry
/// used as a stale fallback when the upstream lookup fails.
pub struct PriceOracle {
    rest: RestClient,
    cache: Arc<Cache>,
    fallback: PriceFallback,
}

impl PriceOracle {
    pub fn new(cache: Arc<Cache>, fallback: PriceFallback) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(COINGECKO_API_URL)?,
            cache,
            fallback,
        })
    }

    fn is_stablecoin(symbol: &str) -> bool {
        matches!(symbol, "USD" | "USDT" | "USDC" | "DAI" | "BUSD")
    }

    fn coingecko_id(symbol: &str) -> Option<&'static str> {
        match symbol {
            "BTC" => Some("bitcoin"),
            "ETH" => Some("ethereum"),
            "SOL" => Some("solana"),
            "XRP" => Some("ripple"),
            "ADA" => Some("cardano"),
            "DOGE" => Some("dogecoin"),
            "AVAX" => Some("avalanche-2"),
            "LINK" => Some("chainlink"),
            "BNB" => Some("binancecoin"),
            _ => None,
        }
    }

    /// USD price for a symbol around `as_of`.
    ///
    /// The free price source only serves current prices, so the current
    /// quote stands in for recent timestamps; `as_of` is kept in the
    /// degradation logs to make the approximation visible.
    pub async fn usd_price(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<f64> {
        let symbol = symbol.to_uppercase();
        if Self::is_stablecoin(&symbol) {
            return Ok(1.0);
        }

        let fresh_key = format!("price:usd:{}", symbol);
        if let Some(price) = self.cache.get_json::<f64>(&fresh_key).await {
            debug!("price: cache hit for {}: {}", symbol, price);
            return Ok(price);
        }

        match self.fetch_price(&symbol).await {
            Ok(price) => {
                self.cache.set_json(&fresh_key, &price, FRESH_TTL).await;
                self.cache
                    .set_json(&Self::last_known_key(&symbol), &price, LAST_KNOWN_TTL)
                    .await;
                Ok(price)
            }
            Err(e) => {
                warn!("price lookup for {} (as of {}) failed: {}", symbol, as_of, e);
                if let Some(stale) = self
                    .cache
                    .get_json::<f64>(&Self::last_known_key(&symbol))
                    .await
                {
                    warn!("price: using stale cached value for {}: {}", symbol, stale);
                    return Ok(stale);
                }
                match self.fallback {
                    PriceFallback::AssumeParity => {
                        warn!(
                            "price: no cached value for {}; assuming 1:1 USD parity",
                            symbol
                        );
                        Ok(1.0)
                    }
                    PriceFallback::Fail => Err(e),
                }
            }
        }
    }

    fn last_known_key(symbol: &str) -> String {
        format!("price:usd:{}:last", symbol)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let id = Self::coingecko_id(symbol).ok_or_else(|| {
            Error::NotFound(format!("no price source mapping for symbol {}", symbol))
        })?;
        let params = vec![
            ("ids".to_string(), id.to_string()),
            ("vs_currencies".to_string(), "usd".to_string()),
        ];
        let data: HashMap<String, HashMap<String, f64>> =
            self.rest.get_json("/simple/price", &params, &[]).await?;
        data.get(id)
            .and_then(|quotes| quotes.get("usd"))
            .copied()
            .ok_or_else(|| Error::Parse(format!("USD price missing for {} in response", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle(fallback: PriceFallback) -> (PriceOracle, Arc<Cache>) {
        let cache = Arc::new(Cache::new());
        let oracle = PriceOracle::new(cache.clone(), fallback).unwrap();
        (oracle, cache)
    }

    #[tokio::test]
    async fn stablecoins_short_circuit() {
        let (oracle, _) = oracle(PriceFallback::Fail);
        assert_eq!(oracle.usd_price("USDT", Utc::now()).await.unwrap(), 1.0);
        assert_eq!(oracle.usd_price("usdc", Utc::now()).await.unwrap(), 1.0);
        assert_eq!(oracle.usd_price("USD", Utc::now()).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn fresh_cache_hit_avoids_upstream() {
        // An unmapped symbol would fail the fetch, so a returned value can
        // only have come from the cache.
        let (oracle, cache) = oracle(PriceFallback::Fail);
        cache
            .set_json("price:usd:FOO", &123.0f64, Duration::from_secs(60))
            .await;
        assert_eq!(oracle.usd_price("FOO", Utc::now()).await.unwrap(), 123.0);
    }

    #[tokio::test]
    async fn stale_value_survives_lookup_failure() {
        let (oracle, cache) = oracle(PriceFallback::Fail);
        cache
            .set_json("price:usd:FOO:last", &99.5f64, Duration::from_secs(3600))
            .await;
        assert_eq!(oracle.usd_price("foo", Utc::now()).await.unwrap(), 99.5);
    }

    #[tokio::test]
    async fn terminal_fallback_policy_is_configurable() {
        let (parity, _) = oracle(PriceFallback::AssumeParity);
        assert_eq!(parity.usd_price("FOO", Utc::now()).await.unwrap(), 1.0);

        let (fail, _) = oracle(PriceFallback::Fail);
        assert!(fail.usd_price("FOO", Utc::now()).await.is_err());
    }
}
