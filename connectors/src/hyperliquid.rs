use crate::http::{de, RestClient};
use crate::paging::Paginator;
use crate::price::PriceOracle;
use crate::ExchangeConnector;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use common::models::{Credential, DailyVolumeRecord, ExchangeVolumeInfo, Platform};
use common::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const HYPERLIQUID_API_URL: &str = "https://api.hyperliquid.xyz";
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Hyperliquid's info endpoint serves full candle snapshots in one shot, so
/// only the bounded-retry half of the engine is used. Candle volume is
/// base-asset denominated and converted through the price oracle.
pub struct HyperliquidConnector {
    rest: RestClient,
    paginator: Paginator,
    oracle: Arc<PriceOracle>,
}

impl HyperliquidConnector {
    pub fn new(oracle: Arc<PriceOracle>) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(HYPERLIQUID_API_URL)?,
            paginator: Paginator::new(1),
            oracle,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Candle {
    #[serde(rename = "t")]
    start_ms: i64,
    #[serde(rename = "o", deserialize_with = "de::f64_lenient")]
    open: f64,
    #[serde(rename = "h", deserialize_with = "de::f64_lenient")]
    high: f64,
    #[serde(rename = "l", deserialize_with = "de::f64_lenient")]
    low: f64,
    #[serde(rename = "c", deserialize_with = "de::f64_lenient")]
    close: f64,
    #[serde(rename = "v", deserialize_with = "de::f64_lenient")]
    base_volume: f64,
}

#[derive(Debug, Deserialize)]
struct AssetContext {
    #[serde(rename = "dayNtlVlm")]
    day_notional_volume: Option<String>,
}

#[async_trait]
impl ExchangeConnector for HyperliquidConnector {
    fn platform(&self) -> Platform {
        Platform::Hyperliquid
    }

    async fn fetch_historical_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _credential: Option<&Credential>,
    ) -> Result<Vec<DailyVolumeRecord>> {
        let start_ms = Utc
            .from_utc_datetime(&start.and_time(NaiveTime::MIN))
            .timestamp_millis();
        let end_ms = Utc
            .from_utc_datetime(&end.and_time(NaiveTime::MIN))
            .timestamp_millis()
            + DAY_MS
            - 1;

        debug!(
            "Hyperliquid: fetching candle snapshot for {} from {} to {}",
            symbol, start, end
        );

        let rest = self.rest.clone();
        let coin = symbol.to_string();
        let mut candles: Vec<Candle> = self
            .paginator
            .fetch_one(|| {
                let rest = rest.clone();
                let coin = coin.clone();
                async move {
                    let body = serde_json::json!({
                        "type": "candleSnapshot",
                        "req": {
                            "coin": coin,
                            "interval": "1d",
                            "startTime": start_ms,
                            "endTime": end_ms,
                        },
                    });
                    rest.post_json("/info", &body, &[]).await
                }
            })
            .await?;
        candles.sort_by_key(|c| c.start_ms);

        if candles.is_empty() {
            debug!("Hyperliquid: no candles returned for {} in range", symbol);
            return Ok(Vec::new());
        }

        // Candles carry base-asset volume only.
        let usd_price = self.oracle.usd_price(symbol, Utc::now()).await?;

        let records = candles
            .into_iter()
            .filter_map(|candle| {
                let date = Utc
                    .timestamp_millis_opt(candle.start_ms)
                    .single()?
                    .date_naive();
                if date < start || date > end {
                    return None;
                }
                Some(DailyVolumeRecord {
                    platform: Platform::Hyperliquid,
                    symbol: symbol.to_string(),
                    date,
                    open: candle.open,
                    high: candle.high,
                    low: candle.low,
                    close: candle.close,
                    volume_quote_usd: candle.base_volume * usd_price,
                })
            })
            .collect();
        Ok(records)
    }

    async fn fetch_latest_24h(
        &self,
        _credential: Option<&Credential>,
    ) -> Result<ExchangeVolumeInfo> {
        let rest = self.rest.clone();
        // Response shape: [meta, [assetCtx, ...]]
        let response: (serde_json::Value, Vec<AssetContext>) = self
            .paginator
            .fetch_one(|| {
                let rest = rest.clone();
                async move {
                    let body = serde_json::json!({"type": "metaAndAssetCtxs"});
                    rest.post_json("/info", &body, &[]).await
                }
            })
            .await?;

        let contexts = response.1;
        if contexts.is_empty() {
            return Ok(ExchangeVolumeInfo::failed(
                Platform::Hyperliquid,
                "no asset contexts in metaAndAssetCtxs response",
            ));
        }

        let mut total = 0.0;
        for context in &contexts {
            match context.day_notional_volume.as_deref().map(str::parse::<f64>) {
                // dayNtlVlm is notional (USD) volume
                Some(Ok(volume)) => total += volume,
                Some(Err(e)) => warn!("Hyperliquid: unparsable dayNtlVlm: {}", e),
                None => {}
            }
        }

        Ok(ExchangeVolumeInfo::ok(
            Platform::Hyperliquid,
            "HYPERLIQUID_TOTAL",
            total,
        ))
    }
}
