use chrono::{NaiveDate, TimeZone, Utc};
use common::models::{DailyVolumeRecord, Platform};
use std::collections::BTreeMap;
use tracing::warn;

/// A single executed trade, normalized to what the daily rollup needs.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub timestamp_ms: i64,
    pub price: f64,
    pub size: f64,
}

struct DayAggregate {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Aggregate account fills into one record per calendar day.
///
/// Fills must arrive time-sorted (the pagination engine guarantees this):
/// open is the first trade price of the day, close the last, high/low the
/// extrema, and volume the sum of price x size converted to USD with
/// `quote_usd` (1.0 for stablecoin-quoted symbols). Fills outside
/// [start, end] are discarded.
pub fn daily_records_from_fills(
    platform: Platform,
    symbol: &str,
    fills: &[Fill],
    start: NaiveDate,
    end: NaiveDate,
    quote_usd: f64,
) -> Vec<DailyVolumeRecord> {
    let mut days: BTreeMap<NaiveDate, DayAggregate> = BTreeMap::new();

    for fill in fills {
        let date = match Utc.timestamp_millis_opt(fill.timestamp_ms).single() {
            Some(ts) => ts.date_naive(),
            None => {
                warn!(
                    "{}: skipping fill with invalid timestamp {}",
                    platform, fill.timestamp_ms
                );
                continue;
            }
        };
        if date < start || date > end {
            continue;
        }

        let quote_volume = fill.price * fill.size * quote_usd;
        match days.get_mut(&date) {
            Some(day) => {
                day.high = day.high.max(fill.price);
                day.low = day.low.min(fill.price);
                day.close = fill.price;
                day.volume += quote_volume;
            }
            None => {
                days.insert(
                    date,
                    DayAggregate {
                        open: fill.price,
                        high: fill.price,
                        low: fill.price,
                        close: fill.price,
                        volume: quote_volume,
                    },
                );
            }
        }
    }

    days.into_iter()
        .map(|(date, day)| DailyVolumeRecord {
            platform,
            symbol: symbol.to_string(),
            date,
            open: day.open,
            high: day.high,
            low: day.low,
            close: day.close,
            volume_quote_usd: day.volume,
        })
        .collect()
}
