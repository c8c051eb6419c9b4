use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers used for routing, queues, and health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Alphavantage,
    Finnhub,
    Polygon,
    Coingecko,
    Fred,
    Sec,
    Newsapi,
    Stocktwits,
    Fixture,
}

impl ProviderId {
    /// The eight live providers, in registration order.
    pub const LIVE: [Self; 8] = [
        Self::Alphavantage,
        Self::Finnhub,
        Self::Polygon,
        Self::Coingecko,
        Self::Fred,
        Self::Sec,
        Self::Newsapi,
        Self::Stocktwits,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alphavantage => "alphavantage",
            Self::Finnhub => "finnhub",
            Self::Polygon => "polygon",
            Self::Coingecko => "coingecko",
            Self::Fred => "fred",
            Self::Sec => "sec",
            Self::Newsapi => "newsapi",
            Self::Stocktwits => "stocktwits",
            Self::Fixture => "fixture",
        }
    }

    /// Human readable provider name used as the `source` of normalized items.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Alphavantage => "Alpha Vantage",
            Self::Finnhub => "Finnhub",
            Self::Polygon => "Polygon",
            Self::Coingecko => "CoinGecko",
            Self::Fred => "FRED",
            Self::Sec => "SEC EDGAR",
            Self::Newsapi => "NewsAPI",
            Self::Stocktwits => "StockTwits",
            Self::Fixture => "Fixture",
        }
    }

    /// Environment variable suffix used for credentials (`MARKETLENS_<NAME>_API_KEY`).
    pub const fn env_name(self) -> &'static str {
        match self {
            Self::Alphavantage => "ALPHAVANTAGE",
            Self::Finnhub => "FINNHUB",
            Self::Polygon => "POLYGON",
            Self::Coingecko => "COINGECKO",
            Self::Fred => "FRED",
            Self::Sec => "SEC",
            Self::Newsapi => "NEWSAPI",
            Self::Stocktwits => "STOCKTWITS",
            Self::Fixture => "FIXTURE",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::LIVE
            .into_iter()
            .chain([Self::Fixture])
            .find(|provider| provider.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidSource {
                value: normalized,
                expected: Self::LIVE.map(Self::as_str).join(", "),
            })
    }
}
