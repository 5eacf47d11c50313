mod config;
mod error;
mod volume_store;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::models::DailyVolumeRecord;

pub use config::StoreConfig;
pub use error::StoreError;
pub use volume_store::InfluxVolumeStore;

/// Persistence collaborator for daily volume records.
///
/// Implementations enforce the (platform, symbol, date) uniqueness
/// invariant so that repeated backfills over the same range are idempotent.
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Persist records, silently skipping ones whose (platform, symbol,
    /// date) key already exists. Returns the number of records written.
    async fn insert_or_ignore(&self, records: &[DailyVolumeRecord]) -> common::Result<usize>;

    /// All records with a date in [start, end], across platforms/symbols.
    async fn query_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> common::Result<Vec<DailyVolumeRecord>>;
}
