use chrono::{NaiveDate, Utc};
use common::cache::Cache;
use common::credentials::CredentialProvider;
use common::models::{
    AggregatedHistoricalPoint, AggregatedVolume, BackfillReport, BackfillStatus, Credential,
    DailyVolumeRecord, ExchangeVolumeInfo, Platform,
};
use common::{Error, Result};
use connectors::ExchangeConnector;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use store::VolumeStore;
use tracing::{debug, error, info, warn};

const CURRENT_CACHE_KEY: &str = "volume:current";

/// Orchestrates concurrent connector calls and memoizes the results.
///
/// Holds one connector per platform behind the trait and never branches on
/// a concrete connector type. Per-platform failures are converted to data
/// at the fan-out boundary; only credential-provider and store failures
/// propagate, since those are infrastructure.
pub struct AggregationService {
    connectors: HashMap<Platform, Arc<dyn ExchangeConnector>>,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn VolumeStore>,
    cache: Arc<Cache>,
    symbols: HashMap<Platform, Vec<String>>,
    current_cache_ttl: Duration,
    historical_cache_ttl: Duration,
}

impl AggregationService {
    pub fn new(
        connectors: Vec<Arc<dyn ExchangeConnector>>,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn VolumeStore>,
        cache: Arc<Cache>,
        symbols: HashMap<Platform, Vec<String>>,
        current_cache_ttl: Duration,
        historical_cache_ttl: Duration,
    ) -> Self {
        let connectors = connectors
            .into_iter()
            .map(|connector| (connector.platform(), connector))
            .collect();
        Self {
            connectors,
            credentials,
            store,
            cache,
            symbols,
            current_cache_ttl,
            historical_cache_ttl,
        }
    }

    /// Aggregated 24h volume across every registered platform.
    ///
    /// Cache hit returns the memoized aggregate. On a miss all connectors
    /// are queried concurrently; one platform failing or stalling never
    /// aborts its siblings, it just shows up as an error-annotated entry
    /// contributing zero to the total.
    pub async fn current_aggregate(&self) -> Result<AggregatedVolume> {
        if let Some(cached) = self
            .cache
            .get_json::<AggregatedVolume>(CURRENT_CACHE_KEY)
            .await
        {
            debug!("current aggregate served from cache");
            return Ok(cached);
        }

        let mut tasks = Vec::with_capacity(self.connectors.len());
        for (platform, connector) in &self.connectors {
            let platform = *platform;
            let credential = self.credentials.get_credential(platform).await?;
            let connector = connector.clone();
            tasks.push(async move {
                match connector.fetch_latest_24h(credential.as_ref()).await {
                    Ok(info) => info,
                    Err(e) => {
                        error!("failed to fetch 24h volume for {}: {}", platform, e);
                        ExchangeVolumeInfo::failed(platform, e.to_string())
                    }
                }
            });
        }

        let mut platforms = join_all(tasks).await;
        platforms.sort_by_key(|info| info.platform.as_str());

        let total = platforms
            .iter()
            .filter(|info| info.is_ok())
            .map(|info| info.volume_24h_usd)
            .sum();

        let aggregate = AggregatedVolume {
            total_volume_24h_usd: total,
            last_updated: Utc::now(),
            platforms,
        };
        self.cache
            .set_json(CURRENT_CACHE_KEY, &aggregate, self.current_cache_ttl)
            .await;
        Ok(aggregate)
    }

    /// 24h volume for a single platform, with the same error-to-data
    /// conversion as the full fan-out.
    pub async fn current_for_platform(&self, platform: Platform) -> Result<ExchangeVolumeInfo> {
        let connector = self
            .connectors
            .get(&platform)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no connector for platform {}", platform)))?;
        let credential = self.credentials.get_credential(platform).await?;

        Ok(match connector.fetch_latest_24h(credential.as_ref()).await {
            Ok(info) => info,
            Err(e) => {
                error!("failed to fetch 24h volume for {}: {}", platform, e);
                ExchangeVolumeInfo::failed(platform, e.to_string())
            }
        })
    }

    /// Daily aggregate over the persisted records in [start, end], grouped
    /// by date and summed across platforms and symbols.
    pub async fn historical_aggregate(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AggregatedHistoricalPoint>> {
        if start > end {
            return Err(Error::Parameter("start date is after end date".into()));
        }

        let cache_key = format!("volume:historical:{}:{}", start, end);
        if let Some(cached) = self
            .cache
            .get_json::<Vec<AggregatedHistoricalPoint>>(&cache_key)
            .await
        {
            debug!("historical aggregate for {}..{} served from cache", start, end);
            return Ok(cached);
        }

        let records = self.store.query_range(start, end).await?;
        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for record in records {
            *daily.entry(record.date).or_insert(0.0) += record.volume_quote_usd;
        }
        let points: Vec<AggregatedHistoricalPoint> = daily
            .into_iter()
            .map(|(date, total_volume_usd)| AggregatedHistoricalPoint {
                date,
                total_volume_usd,
            })
            .collect();

        self.cache
            .set_json(&cache_key, &points, self.historical_cache_ttl)
            .await;
        Ok(points)
    }

    /// Backfill daily records for one platform, or all platforms
    /// concurrently, persisting with insert-or-ignore semantics so repeat
    /// runs over the same range are idempotent.
    pub async fn fetch_and_store_historical(
        &self,
        platform: Option<Platform>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BackfillReport>> {
        if start > end {
            return Err(Error::Parameter("start date is after end date".into()));
        }

        let targets: Vec<Platform> = match platform {
            Some(platform) => {
                if !self.connectors.contains_key(&platform) {
                    return Err(Error::NotFound(format!(
                        "no connector for platform {}",
                        platform
                    )));
                }
                vec![platform]
            }
            None => {
                let mut all: Vec<Platform> = self.connectors.keys().copied().collect();
                all.sort_by_key(|p| p.as_str());
                all
            }
        };

        let mut tasks = Vec::with_capacity(targets.len());
        for platform in targets {
            // Connector existence was checked above; a missing entry here
            // would be a programming error.
            let connector = match self.connectors.get(&platform) {
                Some(connector) => connector.clone(),
                None => continue,
            };
            let credential = self.credentials.get_credential(platform).await?;
            let symbols = self.symbols.get(&platform).cloned().unwrap_or_default();
            let store = self.store.clone();
            tasks.push(Self::backfill_platform(
                connector, platform, credential, symbols, store, start, end,
            ));
        }

        Ok(join_all(tasks).await)
    }

    async fn backfill_platform(
        connector: Arc<dyn ExchangeConnector>,
        platform: Platform,
        credential: Option<Credential>,
        symbols: Vec<String>,
        store: Arc<dyn VolumeStore>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BackfillReport {
        if symbols.is_empty() {
            info!("no symbols configured for {}; nothing to backfill", platform);
            return BackfillReport {
                platform,
                status: BackfillStatus::Success,
                fetched: 0,
                stored: 0,
                errors: Vec::new(),
            };
        }

        let mut fetched = 0;
        let mut stored = 0;
        let mut errors = Vec::new();

        for symbol in &symbols {
            info!(
                "backfilling {} {} from {} to {}",
                platform, symbol, start, end
            );
            let records: Vec<DailyVolumeRecord> = match connector
                .fetch_historical_daily(symbol, start, end, credential.as_ref())
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!("backfill fetch failed for {} {}: {}", platform, symbol, e);
                    errors.push(format!("{}: {}", symbol, e));
                    continue;
                }
            };
            fetched += records.len();
            if records.is_empty() {
                continue;
            }
            match store.insert_or_ignore(&records).await {
                Ok(written) => stored += written,
                Err(e) => {
                    warn!("backfill store failed for {} {}: {}", platform, symbol, e);
                    errors.push(format!("{}: store: {}", symbol, e));
                }
            }
        }

        let status = if errors.is_empty() {
            BackfillStatus::Success
        } else if fetched > 0 || stored > 0 {
            BackfillStatus::PartialSuccess
        } else {
            BackfillStatus::Error
        };
        BackfillReport {
            platform,
            status,
            fetched,
            stored,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Mock connector returning a preset outcome and counting calls.
    struct MockConnector {
        platform: Platform,
        volume: Option<f64>,
        requires_credential: bool,
        calls: AtomicUsize,
    }

    impl MockConnector {
        fn ok(platform: Platform, volume: f64) -> Arc<Self> {
            Arc::new(Self {
                platform,
                volume: Some(volume),
                requires_credential: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(platform: Platform) -> Arc<Self> {
            Arc::new(Self {
                platform,
                volume: None,
                requires_credential: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn authenticated(platform: Platform, volume: f64) -> Arc<Self> {
            Arc::new(Self {
                platform,
                volume: Some(volume),
                requires_credential: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExchangeConnector for MockConnector {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch_historical_daily(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
            credential: Option<&Credential>,
        ) -> Result<Vec<DailyVolumeRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.requires_credential && credential.is_none() {
                return Err(Error::Auth("credentials required".into()));
            }
            let volume = match self.volume {
                Some(volume) => volume,
                None => return Err(Error::Upstream { status: 503, message: "down".into() }),
            };
            // One record per day in range.
            let mut records = Vec::new();
            let mut date = start;
            while date <= end {
                records.push(DailyVolumeRecord {
                    platform: self.platform,
                    symbol: symbol.to_string(),
                    date,
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.5,
                    volume_quote_usd: volume,
                });
                date = match date.succ_opt() {
                    Some(next) => next,
                    None => break,
                };
            }
            Ok(records)
        }

        async fn fetch_latest_24h(
            &self,
            credential: Option<&Credential>,
        ) -> Result<ExchangeVolumeInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.requires_credential && credential.is_none() {
                return Ok(ExchangeVolumeInfo::failed(
                    self.platform,
                    "credentials required",
                ));
            }
            match self.volume {
                Some(volume) => Ok(ExchangeVolumeInfo::ok(self.platform, "TOTAL", volume)),
                None => Err(Error::Upstream { status: 503, message: "down".into() }),
            }
        }
    }

    /// In-memory store enforcing the (platform, symbol, date) uniqueness
    /// invariant the way the real collaborator does.
    #[derive(Default)]
    struct FakeStore {
        records: Mutex<HashMap<(Platform, String, NaiveDate), DailyVolumeRecord>>,
    }

    #[async_trait]
    impl VolumeStore for FakeStore {
        async fn insert_or_ignore(&self, records: &[DailyVolumeRecord]) -> Result<usize> {
            let mut existing = self.records.lock().await;
            let mut written = 0;
            for record in records {
                let key = (record.platform, record.symbol.clone(), record.date);
                if !existing.contains_key(&key) {
                    existing.insert(key, record.clone());
                    written += 1;
                }
            }
            Ok(written)
        }

        async fn query_range(
            &self,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<DailyVolumeRecord>> {
            let existing = self.records.lock().await;
            Ok(existing
                .values()
                .filter(|record| record.date >= start && record.date <= end)
                .cloned()
                .collect())
        }
    }

    struct NoCredentials;

    #[async_trait]
    impl CredentialProvider for NoCredentials {
        async fn get_credential(&self, _platform: Platform) -> Result<Option<Credential>> {
            Ok(None)
        }
    }

    struct AllCredentials;

    #[async_trait]
    impl CredentialProvider for AllCredentials {
        async fn get_credential(&self, platform: Platform) -> Result<Option<Credential>> {
            Ok(Some(Credential {
                platform,
                api_key: "key".into(),
                api_secret: Some("secret".into()),
                wallet_address: None,
                private_key: None,
            }))
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn service(
        connectors: Vec<Arc<dyn ExchangeConnector>>,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn VolumeStore>,
    ) -> AggregationService {
        let mut symbols = HashMap::new();
        symbols.insert(Platform::Bybit, vec!["BTCUSDT".to_string()]);
        symbols.insert(Platform::Woox, vec!["PERP_BTC_USDT".to_string()]);
        symbols.insert(Platform::Hyperliquid, vec!["BTC".to_string()]);
        AggregationService::new(
            connectors,
            credentials,
            store,
            Arc::new(Cache::new()),
            symbols,
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn total_sums_only_successful_platforms() {
        let bybit = MockConnector::ok(Platform::Bybit, 100.0);
        let woox = MockConnector::ok(Platform::Woox, 200.0);
        let paradex = MockConnector::failing(Platform::Paradex);
        let svc = service(
            vec![bybit.clone(), woox.clone(), paradex.clone()],
            Arc::new(NoCredentials),
            Arc::new(FakeStore::default()),
        );

        let aggregate = svc.current_aggregate().await.unwrap();
        assert_eq!(aggregate.total_volume_24h_usd, 300.0);
        assert_eq!(aggregate.platforms.len(), 3);

        let failed: Vec<_> = aggregate
            .platforms
            .iter()
            .filter(|info| !info.is_ok())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].platform, Platform::Paradex);
        assert_eq!(failed[0].volume_24h_usd, 0.0);
    }

    #[tokio::test]
    async fn current_aggregate_is_memoized() {
        let bybit = MockConnector::ok(Platform::Bybit, 100.0);
        let svc = service(
            vec![bybit.clone()],
            Arc::new(NoCredentials),
            Arc::new(FakeStore::default()),
        );

        let first = svc.current_aggregate().await.unwrap();
        let second = svc.current_aggregate().await.unwrap();
        assert_eq!(first.total_volume_24h_usd, second.total_volume_24h_usd);
        // Second call came from the cache, not the connector.
        assert_eq!(bybit.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_credential_is_a_per_platform_error() {
        let woox = MockConnector::authenticated(Platform::Woox, 500.0);
        let bybit = MockConnector::ok(Platform::Bybit, 100.0);
        let svc = service(
            vec![woox, bybit],
            Arc::new(NoCredentials),
            Arc::new(FakeStore::default()),
        );

        let aggregate = svc.current_aggregate().await.unwrap();
        // The authenticated platform degrades; the public one still counts.
        assert_eq!(aggregate.total_volume_24h_usd, 100.0);
        assert_eq!(aggregate.platforms.len(), 2);
    }

    #[tokio::test]
    async fn backfill_is_idempotent() {
        let store = Arc::new(FakeStore::default());
        let bybit = MockConnector::ok(Platform::Bybit, 1000.0);
        let svc = service(
            vec![bybit],
            Arc::new(AllCredentials),
            store.clone(),
        );

        let start = day("2024-03-01");
        let end = day("2024-03-03");

        let first = svc
            .fetch_and_store_historical(Some(Platform::Bybit), start, end)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, BackfillStatus::Success);
        assert_eq!(first[0].fetched, 3);
        assert_eq!(first[0].stored, 3);

        // Run the same range again: everything fetched, nothing stored.
        let second = svc
            .fetch_and_store_historical(Some(Platform::Bybit), start, end)
            .await
            .unwrap();
        assert_eq!(second[0].fetched, 3);
        assert_eq!(second[0].stored, 0);
        assert_eq!(store.records.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn backfill_reports_auth_failure_per_platform() {
        let woox = MockConnector::authenticated(Platform::Woox, 1000.0);
        let bybit = MockConnector::ok(Platform::Bybit, 1000.0);
        let svc = service(
            vec![woox, bybit],
            Arc::new(NoCredentials),
            Arc::new(FakeStore::default()),
        );

        let reports = svc
            .fetch_and_store_historical(None, day("2024-03-01"), day("2024-03-02"))
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);

        let by_platform: HashMap<Platform, &BackfillReport> =
            reports.iter().map(|r| (r.platform, r)).collect();
        assert_eq!(
            by_platform[&Platform::Bybit].status,
            BackfillStatus::Success
        );
        assert_eq!(by_platform[&Platform::Woox].status, BackfillStatus::Error);
        assert!(!by_platform[&Platform::Woox].errors.is_empty());
    }

    #[tokio::test]
    async fn unknown_platform_backfill_is_not_found() {
        let svc = service(
            vec![MockConnector::ok(Platform::Bybit, 1.0)],
            Arc::new(NoCredentials),
            Arc::new(FakeStore::default()),
        );
        let result = svc
            .fetch_and_store_historical(Some(Platform::Paradex), day("2024-03-01"), day("2024-03-02"))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn historical_aggregate_groups_by_date() {
        let store = Arc::new(FakeStore::default());
        store
            .insert_or_ignore(&[
                DailyVolumeRecord {
                    platform: Platform::Bybit,
                    symbol: "BTCUSDT".into(),
                    date: day("2024-03-01"),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume_quote_usd: 100.0,
                },
                DailyVolumeRecord {
                    platform: Platform::Woox,
                    symbol: "PERP_BTC_USDT".into(),
                    date: day("2024-03-01"),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume_quote_usd: 50.0,
                },
                DailyVolumeRecord {
                    platform: Platform::Bybit,
                    symbol: "BTCUSDT".into(),
                    date: day("2024-03-02"),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume_quote_usd: 70.0,
                },
            ])
            .await
            .unwrap();

        let svc = service(vec![], Arc::new(NoCredentials), store);
        let points = svc
            .historical_aggregate(day("2024-03-01"), day("2024-03-05"))
            .await
            .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, day("2024-03-01"));
        assert_eq!(points[0].total_volume_usd, 150.0);
        assert_eq!(points[1].date, day("2024-03-02"));
        assert_eq!(points[1].total_volume_usd, 70.0);
    }

    #[tokio::test]
    async fn reversed_range_is_a_parameter_error() {
        let svc = service(vec![], Arc::new(NoCredentials), Arc::new(FakeStore::default()));
        let result = svc
            .historical_aggregate(day("2024-03-05"), day("2024-03-01"))
            .await;
        assert!(matches!(result, Err(Error::Parameter(_))));
    }
}
