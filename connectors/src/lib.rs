pub mod bybit;
pub mod http;
pub mod hyperliquid;
pub mod paging;
pub mod paradex;
pub mod price;
pub mod rollup;
pub mod sign;
pub mod woox;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::models::{Credential, DailyVolumeRecord, ExchangeVolumeInfo, Platform};
use common::Result;

/// Trait defining the interface for exchange API clients.
///
/// Implementations fetch data in whatever shape the platform exposes
/// (klines, account fills) and normalize it into the common schema before
/// returning. The aggregation service only ever talks to this trait.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// The platform this connector talks to
    fn platform(&self) -> Platform;

    /// Fetch one record per calendar day for a symbol within [start, end].
    ///
    /// Days outside the requested range are discarded even if the upstream
    /// endpoint over-returns. Volumes are quote-currency (USD) normalized.
    async fn fetch_historical_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        credential: Option<&Credential>,
    ) -> Result<Vec<DailyVolumeRecord>>;

    /// Fetch the platform's trailing 24h volume in USD.
    ///
    /// When the platform cannot reliably answer (e.g. credentials missing
    /// for a fills-based connector), this returns an `ExchangeVolumeInfo`
    /// with zero volume and a populated error field rather than an `Err`;
    /// `Err` is reserved for transport-level failures after retries.
    async fn fetch_latest_24h(
        &self,
        credential: Option<&Credential>,
    ) -> Result<ExchangeVolumeInfo>;
}
