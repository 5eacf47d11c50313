use crate::StoreError;

/// Connection settings for the InfluxDB volume store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    /// Bucket holding the `daily_volume` measurement
    pub bucket: String,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, StoreError> {
        Ok(Self {
            url: require("INFLUXDB_URL")?,
            token: require("INFLUXDB_TOKEN")?,
            org: require("INFLUXDB_ORG")?,
            bucket: require("INFLUXDB_BUCKET")?,
        })
    }
}

fn require(name: &str) -> Result<String, StoreError> {
    std::env::var(name)
        .map_err(|_| StoreError::ConfigError(format!("{} environment variable not set", name)))
}
