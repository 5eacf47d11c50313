use crate::http::RestClient;
use crate::paging::{Page, PagedItem, Paginator};
use crate::ExchangeConnector;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use common::models::{Credential, DailyVolumeRecord, ExchangeVolumeInfo, Platform};
use common::{Error, Result};
use serde::Deserialize;
use tracing::{debug, warn};

const BYBIT_API_URL: &str = "https://api.bybit.com";
const KLINE_PAGE_SIZE: usize = 1000;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Bybit V5 market data. Kline and ticker endpoints are public, so the
/// credential parameter is unused.
pub struct BybitConnector {
    rest: RestClient,
    paginator: Paginator,
}

impl BybitConnector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(BYBIT_API_URL)?,
            paginator: Paginator::new(KLINE_PAGE_SIZE),
        })
    }

    /// Coin-margined contracts (BTCUSD) live under "inverse", everything
    /// stablecoin-quoted under "linear".
    fn category_for(symbol: &str) -> &'static str {
        if symbol.ends_with("USD") && !symbol.ends_with("USDT") && !symbol.ends_with("USDC") {
            "inverse"
        } else {
            "linear"
        }
    }
}

#[derive(Debug, Deserialize)]
struct BybitEnvelope<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<T>,
}

/// Bybit wraps everything in a retCode envelope; 10001 is its parameter
/// error code, anything else non-zero is an upstream protocol failure.
fn check_envelope<T>(envelope: BybitEnvelope<T>) -> Result<T> {
    if envelope.ret_code != 0 {
        let message = format!("Bybit: {} (code {})", envelope.ret_msg, envelope.ret_code);
        if envelope.ret_code == 10001 {
            return Err(Error::Parameter(message));
        }
        return Err(Error::Upstream {
            status: 200,
            message,
        });
    }
    envelope
        .result
        .ok_or_else(|| Error::Parse("Bybit: missing result payload".into()))
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
struct BybitKline {
    start_ms: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    turnover: f64,
}

impl PagedItem for BybitKline {
    type Key = i64;

    fn key(&self) -> i64 {
        self.start_ms
    }

    fn timestamp_ms(&self) -> i64 {
        self.start_ms
    }
}

// [startTime, open, high, low, close, volume, turnover]
fn parse_kline(raw: &[String]) -> Option<BybitKline> {
    if raw.len() < 7 {
        return None;
    }
    Some(BybitKline {
        start_ms: raw[0].parse().ok()?,
        open: raw[1].parse().ok()?,
        high: raw[2].parse().ok()?,
        low: raw[3].parse().ok()?,
        close: raw[4].parse().ok()?,
        turnover: raw[6].parse().ok()?,
    })
}

#[derive(Debug, Deserialize)]
struct TickersResult {
    #[serde(default)]
    list: Vec<BybitTicker>,
}

#[derive(Debug, Deserialize)]
struct BybitTicker {
    symbol: String,
    #[serde(rename = "turnover24h")]
    turnover_24h: Option<String>,
}

fn day_start_ms(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp_millis()
}

#[async_trait]
impl ExchangeConnector for BybitConnector {
    fn platform(&self) -> Platform {
        Platform::Bybit
    }

    async fn fetch_historical_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _credential: Option<&Credential>,
    ) -> Result<Vec<DailyVolumeRecord>> {
        let start_ms = day_start_ms(start);
        let end_ms = day_start_ms(end) + DAY_MS - 1;
        let category = Self::category_for(symbol);

        debug!(
            "Bybit: fetching daily klines for {} ({}) from {} to {}",
            symbol, category, start, end
        );

        let rest = self.rest.clone();
        let symbol_owned = symbol.to_string();
        let fetched = self
            .paginator
            .fetch_all(start_ms, move |cursor: i64| {
                let rest = rest.clone();
                let symbol = symbol_owned.clone();
                async move {
                    let params = vec![
                        ("category".to_string(), category.to_string()),
                        ("symbol".to_string(), symbol.clone()),
                        ("interval".to_string(), "D".to_string()),
                        ("start".to_string(), cursor.to_string()),
                        ("end".to_string(), end_ms.to_string()),
                        ("limit".to_string(), KLINE_PAGE_SIZE.to_string()),
                    ];
                    let envelope: BybitEnvelope<KlineResult> =
                        rest.get_json("/v5/market/kline", &params, &[]).await?;
                    let result = check_envelope(envelope)?;

                    let mut items = Vec::with_capacity(result.list.len());
                    for raw in &result.list {
                        match parse_kline(raw) {
                            Some(kline) => items.push(kline),
                            None => {
                                warn!("Bybit: skipping malformed kline for {}: {:?}", symbol, raw)
                            }
                        }
                    }
                    // Bybit returns klines newest-first
                    items.sort_by_key(|k| k.start_ms);
                    let next = items
                        .last()
                        .map(|k| k.start_ms + DAY_MS)
                        .filter(|next| *next <= end_ms);
                    Ok(Page { items, next })
                }
            })
            .await;

        if let Some(err) = &fetched.aborted {
            warn!("Bybit: pagination for {} ended early: {}", symbol, err);
        }
        let klines = fetched.into_result()?;

        let records = klines
            .into_iter()
            .filter_map(|kline| {
                let date = Utc
                    .timestamp_millis_opt(kline.start_ms)
                    .single()?
                    .date_naive();
                if date < start || date > end {
                    return None;
                }
                // Turnover is quote-asset (stablecoin) volume already.
                Some(DailyVolumeRecord {
                    platform: Platform::Bybit,
                    symbol: symbol.to_string(),
                    date,
                    open: kline.open,
                    high: kline.high,
                    low: kline.low,
                    close: kline.close,
                    volume_quote_usd: kline.turnover,
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
        let tickers: TickersResult = self
            .paginator
            .fetch_one(|| {
                let rest = rest.clone();
                async move {
                    let params = vec![("category".to_string(), "linear".to_string())];
                    let envelope: BybitEnvelope<TickersResult> =
                        rest.get_json("/v5/market/tickers", &params, &[]).await?;
                    check_envelope(envelope)
                }
            })
            .await?;

        if tickers.list.is_empty() {
            return Ok(ExchangeVolumeInfo::failed(
                Platform::Bybit,
                "no ticker data returned for linear category",
            ));
        }

        let mut total = 0.0;
        for ticker in &tickers.list {
            if !ticker.symbol.contains("USDT") && !ticker.symbol.contains("USDC") {
                continue;
            }
            match ticker.turnover_24h.as_deref().map(str::parse::<f64>) {
                Some(Ok(turnover)) => total += turnover,
                Some(Err(e)) => warn!(
                    "Bybit: unparsable turnover24h for {}: {}",
                    ticker.symbol, e
                ),
                None => {}
            }
        }

        Ok(ExchangeVolumeInfo::ok(
            Platform::Bybit,
            "LINEAR_TOTAL",
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_by_symbol_suffix() {
        assert_eq!(BybitConnector::category_for("BTCUSD"), "inverse");
        assert_eq!(BybitConnector::category_for("BTCUSDT"), "linear");
        assert_eq!(BybitConnector::category_for("ETHUSDC"), "linear");
    }

    #[test]
    fn kline_parsing_skips_malformed_rows() {
        let good: Vec<String> = vec![
            "1709251200000", "62000", "63000", "61000", "62500", "1000", "62000000",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let kline = parse_kline(&good).unwrap();
        assert_eq!(kline.start_ms, 1_709_251_200_000);
        assert_eq!(kline.turnover, 62_000_000.0);

        let short: Vec<String> = vec!["1709251200000".to_string()];
        assert!(parse_kline(&short).is_none());

        let garbage: Vec<String> = vec!["x", "1", "2", "3", "4", "5", "6"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(parse_kline(&garbage).is_none());
    }

    #[test]
    fn envelope_classification() {
        let param: BybitEnvelope<KlineResult> = BybitEnvelope {
            ret_code: 10001,
            ret_msg: "invalid symbol".into(),
            result: None,
        };
        assert!(matches!(check_envelope(param), Err(Error::Parameter(_))));

        let upstream: BybitEnvelope<KlineResult> = BybitEnvelope {
            ret_code: 10006,
            ret_msg: "too many visits".into(),
            result: None,
        };
        assert!(matches!(
            check_envelope(upstream),
            Err(Error::Upstream { .. })
        ));
    }
}
