use crate::http::{de, RestClient};
use crate::paging::{Page, PagedItem, Paginator};
use crate::price::PriceOracle;
use crate::rollup::{self, Fill};
use crate::sign::typed_data::{self, AuthRequest};
use crate::ExchangeConnector;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use common::cache::Cache;
use common::models::{Credential, DailyVolumeRecord, ExchangeVolumeInfo, Platform};
use common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use serde::Deserialize;
use tracing::{debug, info, warn};

const PARADEX_API_URL: &str = "https://api.prod.paradex.trade";
const FILL_PAGE_SIZE: usize = 5000;
const JWT_CACHE_KEY: &str = "paradex:jwt";
/// Signature expiration requested from the platform: a week (the hard cap)
/// minus a minute of clock-skew margin.
const JWT_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60 - 60;
/// Cached token is dropped five minutes before its expiration.
const JWT_CACHE_TTL: Duration = Duration::from_secs(JWT_LIFETIME_SECS - 5 * 60);

/// Paradex account fills, authenticated with a bearer token obtained by
/// signing a Starknet typed-data message with the account's L2 key. The
/// token is cached and reused until its expiration margin.
pub struct ParadexConnector {
    rest: RestClient,
    paginator: Paginator,
    oracle: Arc<PriceOracle>,
    cache: Arc<Cache>,
    markets: Vec<String>,
}

impl ParadexConnector {
    pub fn new(oracle: Arc<PriceOracle>, cache: Arc<Cache>, markets: Vec<String>) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(PARADEX_API_URL)?,
            paginator: Paginator::new(FILL_PAGE_SIZE),
            oracle,
            cache,
            markets,
        })
    }
}

/// Quote asset from a Paradex market like BTC-USD-PERP.
fn quote_asset(market: &str) -> &str {
    market.split('-').nth(1).unwrap_or("USD")
}

#[derive(Debug, Deserialize)]
struct SystemConfig {
    starknet_chain_id: String,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    jwt_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ParadexFill {
    id: String,
    #[serde(deserialize_with = "de::f64_lenient")]
    price: f64,
    #[serde(deserialize_with = "de::f64_lenient")]
    size: f64,
    created_at: i64,
}

impl PagedItem for ParadexFill {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn timestamp_ms(&self) -> i64 {
        self.created_at
    }
}

#[derive(Debug, Deserialize)]
struct FillsPage {
    #[serde(default)]
    results: Vec<ParadexFill>,
    #[serde(default)]
    next: Option<String>,
}

impl ParadexConnector {
    /// Reuse the cached bearer token or run the auth handshake.
    async fn bearer_token(&self, credential: &Credential) -> Result<String> {
        if let Some(token) = self.cache.get(JWT_CACHE_KEY).await {
            return Ok(token);
        }
        let token = self.issue_jwt(credential).await?;
        self.cache
            .set(JWT_CACHE_KEY, token.clone(), JWT_CACHE_TTL)
            .await;
        Ok(token)
    }

    /// One-time auth request: sign the typed-data message with the account
    /// key and exchange it for a JWT.
    async fn issue_jwt(&self, credential: &Credential) -> Result<String> {
        let config: SystemConfig = self.rest.get_json("/v1/system/config", &[], &[]).await?;
        let chain_id = typed_data::encode_short_string(&config.starknet_chain_id)?;
        let account = typed_data::felt_from_hex(credential.wallet_address()?)?;
        let private_key = typed_data::felt_from_hex(credential.private_key()?)?;

        let now = Utc::now().timestamp() as u64;
        let expiration = now + JWT_LIFETIME_SECS;
        let request = AuthRequest::token_request(now, expiration);
        let message_hash = typed_data::auth_message_hash(chain_id, account, &request)?;
        let (r, s) = typed_data::sign_message(&message_hash, &private_key)?;

        info!("Paradex: requesting bearer token for account");
        let headers = vec![
            (
                "PARADEX-STARKNET-ACCOUNT".to_string(),
                credential.wallet_address()?.to_string(),
            ),
            (
                "PARADEX-STARKNET-SIGNATURE".to_string(),
                format!(r#"["{}","{}"]"#, r, s),
            ),
            ("PARADEX-TIMESTAMP".to_string(), now.to_string()),
            ("PARADEX-SIGNATURE-EXPIRATION".to_string(), expiration.to_string()),
        ];
        let response: AuthResponse = self.rest.post_empty("/v1/auth", &headers).await?;
        Ok(response.jwt_token)
    }

    async fn paged_fills(
        &self,
        market: &str,
        start_ms: i64,
        end_ms: i64,
        token: &str,
    ) -> crate::paging::PagedFetch<ParadexFill> {
        let rest = self.rest.clone();
        let market = market.to_string();
        let bearer = format!("Bearer {}", token);
        self.paginator
            .fetch_all(None::<String>, move |cursor: Option<String>| {
                let rest = rest.clone();
                let market = market.clone();
                let bearer = bearer.clone();
                async move {
                    let mut params = vec![
                        ("market".to_string(), market),
                        ("start_at".to_string(), start_ms.to_string()),
                        ("end_at".to_string(), end_ms.to_string()),
                        ("page_size".to_string(), FILL_PAGE_SIZE.to_string()),
                    ];
                    if let Some(cursor) = cursor {
                        params.push(("cursor".to_string(), cursor));
                    }
                    let headers = vec![
                        ("Authorization".to_string(), bearer),
                        ("Accept".to_string(), "application/json".to_string()),
                    ];
                    let page: FillsPage = rest
                        .get_json("/v1/account/list-fills", &params, &headers)
                        .await?;
                    let next = page.next.map(Some);
                    Ok(Page {
                        items: page.results,
                        next,
                    })
                }
            })
            .await
    }

    /// Fetch fills for one market, re-authenticating once if the cached
    /// bearer token is rejected.
    async fn fetch_fills(
        &self,
        market: &str,
        start_ms: i64,
        end_ms: i64,
        credential: &Credential,
    ) -> Result<Vec<ParadexFill>> {
        let token = self.bearer_token(credential).await?;
        let fetched = self.paged_fills(market, start_ms, end_ms, &token).await;

        if matches!(fetched.aborted, Some(Error::Auth(_))) {
            warn!("Paradex: bearer token rejected, re-authenticating");
            self.cache.delete(JWT_CACHE_KEY).await;
            let token = self.bearer_token(credential).await?;
            return self
                .paged_fills(market, start_ms, end_ms, &token)
                .await
                .into_result();
        }

        if let Some(err) = &fetched.aborted {
            warn!("Paradex: fill pagination for {} ended early: {}", market, err);
        }
        fetched.into_result()
    }

    async fn market_volume_24h(&self, market: &str, credential: &Credential) -> Result<f64> {
        let now = Utc::now();
        let start_ms = (now - ChronoDuration::hours(24)).timestamp_millis();
        let end_ms = now.timestamp_millis();
        let fills = self.fetch_fills(market, start_ms, end_ms, credential).await?;
        let quote_usd = self.oracle.usd_price(quote_asset(market), Utc::now()).await?;
        Ok(fills
            .iter()
            .map(|fill| fill.price * fill.size * quote_usd)
            .sum())
    }
}

#[async_trait]
impl ExchangeConnector for ParadexConnector {
    fn platform(&self) -> Platform {
        Platform::Paradex
    }

    async fn fetch_historical_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        credential: Option<&Credential>,
    ) -> Result<Vec<DailyVolumeRecord>> {
        let credential = credential.ok_or_else(|| {
            Error::Auth("Paradex: an L2 wallet credential is required for account fills".into())
        })?;

        let start_ms = Utc
            .from_utc_datetime(&start.and_time(NaiveTime::MIN))
            .timestamp_millis();
        let end_ms = Utc
            .from_utc_datetime(&end.and_time(NaiveTime::MIN))
            .timestamp_millis()
            + ChronoDuration::days(1).num_milliseconds()
            - 1;

        debug!(
            "Paradex: fetching fills for {} from {} to {}",
            symbol, start, end
        );
        let fills = self.fetch_fills(symbol, start_ms, end_ms, credential).await?;
        if fills.is_empty() {
            debug!("Paradex: no fills for {} in range", symbol);
            return Ok(Vec::new());
        }

        let quote_usd = self.oracle.usd_price(quote_asset(symbol), Utc::now()).await?;
        let normalized: Vec<Fill> = fills
            .iter()
            .map(|fill| Fill {
                timestamp_ms: fill.created_at,
                price: fill.price,
                size: fill.size,
            })
            .collect();
        Ok(rollup::daily_records_from_fills(
            Platform::Paradex,
            symbol,
            &normalized,
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
                    Platform::Paradex,
                    "L2 wallet credential not configured",
                ))
            }
        };
        if self.markets.is_empty() {
            return Ok(ExchangeVolumeInfo::failed(
                Platform::Paradex,
                "no markets configured for 24h volume",
            ));
        }

        let mut total = 0.0;
        let mut failures = Vec::new();
        for market in &self.markets {
            match self.market_volume_24h(market, credential).await {
                Ok(volume) => total += volume,
                Err(e) => {
                    warn!("Paradex: 24h volume for {} failed: {}", market, e);
                    failures.push(format!("{}: {}", market, e));
                }
            }
        }

        if failures.len() == self.markets.len() {
            return Ok(ExchangeVolumeInfo::failed(
                Platform::Paradex,
                failures.join("; "),
            ));
        }
        Ok(ExchangeVolumeInfo::ok(
            Platform::Paradex,
            "ACCOUNT_TOTAL",
            total,
        ))
    }
}
