mod credential;
mod platform;
mod volume;

pub use credential::Credential;
pub use platform::Platform;
pub use volume::{
    AggregatedHistoricalPoint, AggregatedVolume, BackfillReport, BackfillStatus,
    DailyVolumeRecord, ExchangeVolumeInfo,
};
