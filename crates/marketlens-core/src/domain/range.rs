use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::ValidationError;

/// Look-back window requested for a price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "5y")]
    FiveYears,
}

/// Bar width a provider should be asked for when serving a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    FiveMinutes,
    OneHour,
    OneDay,
    OneWeek,
}

impl HistoryRange {
    pub const ALL: [Self; 6] = [
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::OneYear,
        Self::FiveYears,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1m",
            Self::ThreeMonths => "3m",
            Self::OneYear => "1y",
            Self::FiveYears => "5y",
        }
    }

    pub const fn days(self) -> u32 {
        match self {
            Self::OneDay => 1,
            Self::OneWeek => 7,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::OneYear => 365,
            Self::FiveYears => 1_825,
        }
    }

    pub fn lookback(self) -> Duration {
        Duration::days(i64::from(self.days()))
    }

    pub const fn resolution(self) -> Resolution {
        match self {
            Self::OneDay => Resolution::FiveMinutes,
            Self::OneWeek => Resolution::OneHour,
            Self::OneMonth | Self::ThreeMonths | Self::OneYear => Resolution::OneDay,
            Self::FiveYears => Resolution::OneWeek,
        }
    }

    /// Intraday ranges change minute to minute and are cached briefly.
    pub const fn is_intraday(self) -> bool {
        matches!(self, Self::OneDay | Self::OneWeek)
    }
}

impl Display for HistoryRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRange {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Self::OneDay),
            "1w" | "7d" => Ok(Self::OneWeek),
            "1m" | "1mo" | "30d" => Ok(Self::OneMonth),
            "3m" | "3mo" | "90d" => Ok(Self::ThreeMonths),
            "1y" | "12m" => Ok(Self::OneYear),
            "5y" => Ok(Self::FiveYears),
            other => Err(ValidationError::InvalidRange {
                value: other.to_owned(),
            }),
        }
    }
}
