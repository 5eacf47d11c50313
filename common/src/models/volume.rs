use crate::models::Platform;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One day of trading activity for a (platform, symbol) pair.
///
/// `volume_quote_usd` is always quote-currency (USD) denominated; base-asset
/// volumes are converted before a record is produced. Records are uniquely
/// identified by (platform, symbol, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyVolumeRecord {
    pub platform: Platform,
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume_quote_usd: f64,
}

/// 24h volume measurement for one platform, or the error that replaced it.
///
/// Once a value of this type leaves a connector, errors are data: a failed
/// platform carries zero volume plus the error message and is still listed
/// in the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeVolumeInfo {
    pub platform: Platform,
    /// Symbol or scope label, e.g. "LINEAR_TOTAL" for an exchange-wide sum
    pub scope: String,
    pub volume_24h_usd: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExchangeVolumeInfo {
    pub fn ok(platform: Platform, scope: impl Into<String>, volume_24h_usd: f64) -> Self {
        Self {
            platform,
            scope: scope.into(),
            volume_24h_usd,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            platform,
            scope: platform.as_str().to_uppercase(),
            volume_24h_usd: 0.0,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Sum of 24h volume across platforms, with the per-platform breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedVolume {
    pub total_volume_24h_usd: f64,
    pub last_updated: DateTime<Utc>,
    pub platforms: Vec<ExchangeVolumeInfo>,
}

/// One day of volume summed across all platforms and symbols.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedHistoricalPoint {
    pub date: NaiveDate,
    pub total_volume_usd: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackfillStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "partial_success")]
    PartialSuccess,
    #[serde(rename = "error")]
    Error,
}

/// Outcome of a historical backfill run for one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillReport {
    pub platform: Platform,
    pub status: BackfillStatus,
    pub fetched: usize,
    pub stored: usize,
    pub errors: Vec<String>,
}
