use crate::{StoreConfig, StoreError, VolumeStore};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use common::models::{DailyVolumeRecord, Platform};
use futures::stream;
use influxdb2::models::Query;
use influxdb2::{Client, FromDataPoint};
use tracing::{debug, warn};

const MEASUREMENT: &str = "daily_volume";

/// InfluxDB-backed volume store.
///
/// Each record becomes one point in the `daily_volume` measurement, tagged
/// by platform and symbol and timestamped at the date's midnight UTC. A
/// point with the same series and timestamp overwrites rather than
/// duplicates, which is what gives `insert_or_ignore` its idempotency.
pub struct InfluxVolumeStore {
    client: Client,
    config: StoreConfig,
}

impl InfluxVolumeStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::new(&config.url, &config.org, &config.token);

        Ok(Self { client, config })
    }
}

#[derive(Debug, FromDataPoint)]
struct VolumeRow {
    platform: String,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume_usd: f64,
    time: DateTime<FixedOffset>,
}

impl Default for VolumeRow {
    fn default() -> Self {
        Self {
            platform: String::new(),
            symbol: String::new(),
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume_usd: 0.0,
            time: DateTime::<Utc>::UNIX_EPOCH.fixed_offset(),
        }
    }
}

fn date_to_nanos(date: NaiveDate) -> Result<i64, StoreError> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp_nanos_opt()
        .ok_or_else(|| StoreError::ConversionError(format!("date out of range: {}", date)))
}

fn build_range_query(bucket: &str, start: NaiveDate, end: NaiveDate) -> String {
    // stop is exclusive in Flux, so advance one day past `end`.
    let start_ts = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
    let stop_ts = Utc.from_utc_datetime(&end.and_time(NaiveTime::MIN)) + chrono::Duration::days(1);
    format!(
        r#"from(bucket: "{}")
           |> range(start: {}, stop: {})
           |> filter(fn: (r) => r._measurement == "{}")
           |> pivot(rowKey:["_time"], columnKey: ["_field"], valueColumn: "_value")
           |> sort(columns: ["_time"])"#,
        bucket,
        start_ts.to_rfc3339(),
        stop_ts.to_rfc3339(),
        MEASUREMENT
    )
}

#[async_trait]
impl VolumeStore for InfluxVolumeStore {
    async fn insert_or_ignore(&self, records: &[DailyVolumeRecord]) -> common::Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        debug!("storing {} daily volume records", records.len());

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            let point = influxdb2::models::DataPoint::builder(MEASUREMENT)
                .tag("platform", record.platform.to_string())
                .tag("symbol", record.symbol.clone())
                .field("open", record.open)
                .field("high", record.high)
                .field("low", record.low)
                .field("close", record.close)
                .field("volume_usd", record.volume_quote_usd)
                .timestamp(date_to_nanos(record.date)?)
                .build()
                .map_err(StoreError::from)?;

            points.push(point);
        }

        let written = points.len();
        self.client
            .write(&self.config.bucket, stream::iter(points))
            .await
            .map_err(StoreError::from)?;

        Ok(written)
    }

    async fn query_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> common::Result<Vec<DailyVolumeRecord>> {
        let flux = build_range_query(&self.config.bucket, start, end);
        debug!("executing flux query: {}", flux);

        let rows: Vec<VolumeRow> = self
            .client
            .query::<VolumeRow>(Some(Query::new(flux)))
            .await
            .map_err(StoreError::from)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let platform: Platform = match row.platform.parse() {
                Ok(platform) => platform,
                Err(_) => {
                    warn!("skipping row with unknown platform tag '{}'", row.platform);
                    continue;
                }
            };
            records.push(DailyVolumeRecord {
                platform,
                symbol: row.symbol,
                date: row.time.date_naive(),
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume_quote_usd: row.volume_usd,
            });
        }
        Ok(records)
    }
}
