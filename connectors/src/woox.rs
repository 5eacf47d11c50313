use crate::http::{de, RestClient};
use crate::paging::{Page, PagedItem, Paginator};
use crate::price::PriceOracle;
use crate::rollup::{self, Fill};
use crate::sign;
use crate::ExchangeConnector;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use common::models::{Credential, DailyVolumeRecord, ExchangeVolumeInfo, Platform};
use common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

const WOOX_API_URL: &str = "https://api.woox.io";
const TRADE_PAGE_SIZE: usize = 100;
/// WOO X keeps only ~90 days of trades on the live endpoint; older fills
/// come from the archive endpoint.
const RETENTION_DAYS: i64 = 90;

/// WOO X account trade history. Both endpoints are private and HMAC-signed;
/// daily volume is reconstructed from fills since there is no account-wide
/// aggregate endpoint.
pub struct WooxConnector {
    rest: RestClient,
    paginator: Paginator,
    oracle: Arc<PriceOracle>,
    symbols: Vec<String>,
}

impl WooxConnector {
    pub fn new(oracle: Arc<PriceOracle>, symbols: Vec<String>) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(WOOX_API_URL)?,
            paginator: Paginator::new(TRADE_PAGE_SIZE),
            oracle,
            symbols,
        })
    }
}

/// Quote asset from a WOO X symbol like PERP_BTC_USDT or SPOT_ETH_USDC.
fn quote_asset(symbol: &str) -> &str {
    symbol.rsplit('_').next().unwrap_or("USD")
}

/// Split [start_ms, end_ms] at the retention boundary into the recent
/// window (live trades endpoint) and the archive window (history endpoint).
/// The windows are adjacent with no overlap and no gap.
fn split_retention_windows(
    start_ms: i64,
    end_ms: i64,
    boundary_ms: i64,
) -> (Option<(i64, i64)>, Option<(i64, i64)>) {
    let recent = if end_ms > boundary_ms {
        Some((start_ms.max(boundary_ms), end_ms))
    } else {
        None
    };
    let archive = if start_ms < boundary_ms {
        let archive_end = end_ms.min(boundary_ms - 1);
        if start_ms <= archive_end {
            Some((start_ms, archive_end))
        } else {
            None
        }
    } else {
        None
    };
    (recent, archive)
}

#[derive(Debug, Clone, Deserialize)]
struct WooxTrade {
    id: i64,
    #[serde(rename = "executed_price", deserialize_with = "de::f64_lenient")]
    price: f64,
    #[serde(rename = "executed_quantity", deserialize_with = "de::f64_lenient")]
    quantity: f64,
    #[serde(rename = "executed_timestamp", deserialize_with = "de::i64_lenient")]
    timestamp_ms: i64,
}

impl PagedItem for WooxTrade {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default)]
    current_page: Option<u64>,
    #[serde(default)]
    total_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    meta: Option<PageMeta>,
    #[serde(default)]
    rows: Vec<WooxTrade>,
}

/// Signed GET against a private WOO X endpoint. The signature covers the
/// sorted query string plus the request timestamp.
async fn signed_get<T: DeserializeOwned>(
    rest: &RestClient,
    path: &str,
    mut params: Vec<(String, String)>,
    credential: &Credential,
) -> Result<T> {
    let timestamp_ms = Utc::now().timestamp_millis();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    let signature = sign::hmac::hmac_sha256_hex(&params, timestamp_ms, credential.api_secret()?)?;
    let headers = vec![
        ("x-api-key".to_string(), credential.api_key.clone()),
        ("x-api-signature".to_string(), signature),
        ("x-api-timestamp".to_string(), timestamp_ms.to_string()),
    ];
    rest.get_json(path, &params, &headers).await
}

fn check_success(response: &TradesResponse, endpoint: &str) -> Result<()> {
    if !response.success {
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| "unknown WOO X API error".to_string());
        return Err(Error::Upstream {
            status: 200,
            message: format!("WOO X {}: {}", endpoint, message),
        });
    }
    Ok(())
}

impl WooxConnector {
    /// Live trades for the trailing retention window; page-number
    /// pagination.
    async fn fetch_recent(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        credential: &Credential,
    ) -> Result<Vec<WooxTrade>> {
        let rest = self.rest.clone();
        let credential = credential.clone();
        let symbol = symbol.to_string();
        let fetched = self
            .paginator
            .fetch_all(1u64, move |page: u64| {
                let rest = rest.clone();
                let credential = credential.clone();
                let symbol = symbol.clone();
                async move {
                    let params = vec![
                        ("symbol".to_string(), symbol),
                        ("start_t".to_string(), start_ms.to_string()),
                        ("end_t".to_string(), end_ms.to_string()),
                        ("page".to_string(), page.to_string()),
                        ("size".to_string(), TRADE_PAGE_SIZE.to_string()),
                    ];
                    let response: TradesResponse =
                        signed_get(&rest, "/v1/client/trades", params, &credential).await?;
                    check_success(&response, "/v1/client/trades")?;

                    let next = match &response.meta {
                        Some(meta) => {
                            let current = meta.current_page.unwrap_or(page);
                            let total = meta.total_page.unwrap_or(current);
                            if current < total {
                                Some(current + 1)
                            } else {
                                None
                            }
                        }
                        None => None,
                    };
                    Ok(Page {
                        items: response.rows,
                        next,
                    })
                }
            })
            .await;

        if let Some(err) = &fetched.aborted {
            warn!("WOO X: recent trade pagination ended early: {}", err);
        }
        fetched.into_result()
    }

    /// Archived trades older than the retention boundary; cursor
    /// pagination via the id of the last fetched trade.
    async fn fetch_archive(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        credential: &Credential,
    ) -> Result<Vec<WooxTrade>> {
        let rest = self.rest.clone();
        let credential = credential.clone();
        let symbol = symbol.to_string();
        let fetched = self
            .paginator
            .fetch_all(None::<i64>, move |from_id: Option<i64>| {
                let rest = rest.clone();
                let credential = credential.clone();
                let symbol = symbol.clone();
                async move {
                    let mut params = vec![
                        ("symbol".to_string(), symbol),
                        ("start_t".to_string(), start_ms.to_string()),
                        ("end_t".to_string(), end_ms.to_string()),
                        ("limit".to_string(), TRADE_PAGE_SIZE.to_string()),
                    ];
                    if let Some(id) = from_id {
                        params.push(("fromId".to_string(), id.to_string()));
                    }
                    let response: TradesResponse =
                        signed_get(&rest, "/v1/client/hist_trades", params, &credential).await?;
                    check_success(&response, "/v1/client/hist_trades")?;

                    // The query resumes after the last trade id.
                    let next = response.rows.last().map(|trade| Some(trade.id));
                    Ok(Page {
                        items: response.rows,
                        next,
                    })
                }
            })
            .await;

        if let Some(err) = &fetched.aborted {
            warn!("WOO X: archive trade pagination ended early: {}", err);
        }
        fetched.into_result()
    }

    /// Fetch trades across both retention windows, merged and deduplicated
    /// by trade id.
    async fn fetch_trades(
        &self,
        symbol: &str,
        start_ms: i64,
        end_ms: i64,
        credential: &Credential,
    ) -> Result<Vec<WooxTrade>> {
        let boundary_ms = (Utc::now() - ChronoDuration::days(RETENTION_DAYS)).timestamp_millis();
        let (recent_window, archive_window) = split_retention_windows(start_ms, end_ms, boundary_ms);

        let mut trades: Vec<WooxTrade> = Vec::new();
        if let Some((window_start, window_end)) = recent_window {
            debug!(
                "WOO X: fetching recent trades for {} in [{}, {}]",
                symbol, window_start, window_end
            );
            trades.extend(
                self.fetch_recent(symbol, window_start, window_end, credential)
                    .await?,
            );
        }
        if let Some((window_start, window_end)) = archive_window {
            debug!(
                "WOO X: fetching archived trades for {} in [{}, {}]",
                symbol, window_start, window_end
            );
            trades.extend(
                self.fetch_archive(symbol, window_start, window_end, credential)
                    .await?,
            );
        }

        let mut seen: HashSet<i64> = HashSet::with_capacity(trades.len());
        trades.retain(|trade| seen.insert(trade.id));
        trades.sort_by_key(|trade| trade.timestamp_ms);
        Ok(trades)
    }

    async fn symbol_volume_24h(&self, symbol: &str, credential: &Credential) -> Result<f64> {
        let now = Utc::now();
        let start_ms = (now - ChronoDuration::hours(24)).timestamp_millis();
        let end_ms = now.timestamp_millis();
        let trades = self.fetch_trades(symbol, start_ms, end_ms, credential).await?;
        let quote_usd = self.oracle.usd_price(quote_asset(symbol), Utc::now()).await?;
        Ok(trades
            .iter()
            .map(|trade| trade.price * trade.quantity * quote_usd)
            .sum())
    }
}

#[async_trait]
impl ExchangeConnector for WooxConnector {
    fn platform(&self) -> Platform {
        Platform::Woox
    }

    async fn fetch_historical_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        credential: Option<&Credential>,
    ) -> Result<Vec<DailyVolumeRecord>> {
        let credential = credential.ok_or_else(|| {
            Error::Auth("WOO X: API credentials are required for trade history".into())
        })?;

        let start_ms = Utc
            .from_utc_datetime(&start.and_time(NaiveTime::MIN))
            .timestamp_millis();
        let end_ms = Utc
            .from_utc_datetime(&end.and_time(NaiveTime::MIN))
            .timestamp_millis()
            + ChronoDuration::days(1).num_milliseconds()
            - 1;

        let trades = self.fetch_trades(symbol, start_ms, end_ms, credential).await?;
        if trades.is_empty() {
            debug!("WOO X: no trades for {} in range", symbol);
            return Ok(Vec::new());
        }

        let quote_usd = self.oracle.usd_price(quote_asset(symbol), Utc::now()).await?;
        let fills: Vec<Fill> = trades
            .iter()
            .map(|trade| Fill {
                timestamp_ms: trade.timestamp_ms,
                price: trade.price,
                size: trade.quantity,
            })
            .collect();
        Ok(rollup::daily_records_from_fills(
            Platform::Woox,
            symbol,
            &fills,
            start,
            end,
            quote_usd,
        ))
    }

    async fn fetch_latest_24h(
        &self,
        credential: Option<&Credential>,
    ) -> Result<ExchangeVolumeInfo> {
        let credential = match credential {
            Some(credential) => credential,
            None => {
                return Ok(ExchangeVolumeInfo::failed(
                    Platform::Woox,
                    "API credentials not configured",
                ))
            }
        };
        if self.symbols.is_empty() {
            return Ok(ExchangeVolumeInfo::failed(
                Platform::Woox,
                "no symbols configured for 24h volume",
            ));
        }

        let mut total = 0.0;
        let mut failures = Vec::new();
        for symbol in &self.symbols {
            match self.symbol_volume_24h(symbol, credential).await {
                Ok(volume) => total += volume,
                Err(e) => {
                    warn!("WOO X: 24h volume for {} failed: {}", symbol, e);
                    failures.push(format!("{}: {}", symbol, e));
                }
            }
        }

        if failures.len() == self.symbols.len() {
            return Ok(ExchangeVolumeInfo::failed(
                Platform::Woox,
                failures.join("; "),
            ));
        }
        Ok(ExchangeVolumeInfo::ok(
            Platform::Woox,
            "ACCOUNT_TOTAL",
            total,
        ))
    }
}
