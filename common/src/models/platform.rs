use serde::{Deserialize, Serialize};

/// Exchange platform identifiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    #[serde(rename = "bybit")]
    Bybit,
    #[serde(rename = "woox")]
    Woox,
    #[serde(rename = "paradex")]
    Paradex,
    #[serde(rename = "hyperliquid")]
    Hyperliquid,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Bybit,
        Platform::Woox,
        Platform::Paradex,
        Platform::Hyperliquid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Bybit => "bybit",
            Platform::Woox => "woox",
            Platform::Paradex => "paradex",
            Platform::Hyperliquid => "hyperliquid",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bybit" => Ok(Platform::Bybit),
            "woox" => Ok(Platform::Woox),
            "paradex" => Ok(Platform::Paradex),
            "hyperliquid" => Ok(Platform::Hyperliquid),
            other => Err(crate::Error::NotFound(format!(
                "unknown platform: {}. Supported platforms: bybit, woox, paradex, hyperliquid",
                other
            ))),
        }
    }
}
