use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{HistoryRange, ProviderId, Symbol, UtcDateTime, ValidationError};

/// Canonical asset class tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Stock,
    Crypto,
    Fund,
}

impl AssetClass {
    pub const ALL: [Self; 3] = [Self::Stock, Self::Crypto, Self::Fund];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Crypto => "crypto",
            Self::Fund => "fund",
        }
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stock" | "equity" => Ok(Self::Stock),
            "crypto" => Ok(Self::Crypto),
            "fund" | "etf" | "index" => Ok(Self::Fund),
            other => Err(ValidationError::InvalidAssetClass {
                value: other.to_owned(),
            }),
        }
    }
}

/// Canonical live view of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Canonical symbol; identical to `symbol` and used as the cross-source key.
    pub id: Symbol,
    pub symbol: Symbol,
    pub name: String,
    pub asset_class: AssetClass,
    pub price: f64,
    pub change_24h: f64,
    pub change_percent_24h: f64,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub logo: Option<String>,
    pub source: ProviderId,
    pub as_of: UtcDateTime,
}

impl Asset {
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        asset_class: AssetClass,
        price: f64,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;
        let name = name.into();
        let name = if name.trim().is_empty() {
            symbol.as_str().to_owned()
        } else {
            name
        };

        Ok(Self {
            id: symbol.clone(),
            symbol,
            name,
            asset_class,
            price,
            change_24h: 0.0,
            change_percent_24h: 0.0,
            market_cap: None,
            volume_24h: None,
            high_24h: None,
            low_24h: None,
            logo: None,
            source,
            as_of: UtcDateTime::now(),
        })
    }

    pub fn with_change(mut self, absolute: f64, percent: f64) -> Self {
        self.change_24h = absolute;
        self.change_percent_24h = percent;
        self
    }

    /// Derive the 24h change from the previous close.
    pub fn with_previous_close(self, previous_close: f64) -> Self {
        if previous_close <= 0.0 || !previous_close.is_finite() {
            return self;
        }
        let absolute = self.price - previous_close;
        let percent = absolute / previous_close * 100.0;
        self.with_change(absolute, percent)
    }

    pub fn with_range(mut self, high: Option<f64>, low: Option<f64>) -> Self {
        self.high_24h = high;
        self.low_24h = low;
        self
    }

    pub fn with_market_cap(mut self, market_cap: Option<f64>) -> Self {
        self.market_cap = market_cap;
        self
    }

    pub fn with_volume(mut self, volume: Option<f64>) -> Self {
        self.volume_24h = volume;
        self
    }

    pub fn with_logo(mut self, logo: Option<String>) -> Self {
        self.logo = logo.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_as_of(mut self, as_of: UtcDateTime) -> Self {
        self.as_of = as_of;
        self
    }

    /// Check every numeric field before the value is cached or returned.
    pub fn validated(self) -> Result<Self, ValidationError> {
        validate_non_negative("price", self.price)?;
        validate_finite("change_24h", self.change_24h)?;
        validate_finite("change_percent_24h", self.change_percent_24h)?;
        validate_optional_non_negative("market_cap", self.market_cap)?;
        validate_optional_non_negative("volume_24h", self.volume_24h)?;
        validate_optional_non_negative("high_24h", self.high_24h)?;
        validate_optional_non_negative("low_24h", self.low_24h)?;
        Ok(self)
    }
}

/// One observation in a price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    /// Epoch milliseconds, UTC.
    pub timestamp: i64,
    pub price: f64,
    pub volume: f64,
}

impl PriceHistoryPoint {
    pub fn new(timestamp: i64, price: f64, volume: Option<f64>) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;
        let volume = volume.unwrap_or(0.0);
        validate_non_negative("volume", volume)?;
        Ok(Self {
            timestamp,
            price,
            volume,
        })
    }
}

/// Ascending, timestamp-deduplicated price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: Symbol,
    pub range: HistoryRange,
    pub source: ProviderId,
    pub points: Vec<PriceHistoryPoint>,
}

impl PriceHistory {
    /// Sorts ascending and keeps the first point seen for each timestamp.
    pub fn new(
        symbol: Symbol,
        range: HistoryRange,
        source: ProviderId,
        mut points: Vec<PriceHistoryPoint>,
    ) -> Self {
        points.sort_by_key(|point| point.timestamp);
        points.dedup_by_key(|point| point.timestamp);
        Self {
            symbol,
            range,
            source,
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.points.last().map(|point| point.price)
    }
}

/// Sparse fundamentals snapshot. Most providers populate only a subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub asset_id: Symbol,
    pub source: Option<ProviderId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub profit_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub gross_margin: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub revenue_ttm: Option<f64>,
    pub beta: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
}

impl Fundamentals {
    pub fn new(asset_id: Symbol, source: ProviderId) -> Self {
        Self {
            asset_id,
            source: Some(source),
            ..Self::default()
        }
    }

    /// True when no ratio or descriptor was populated.
    pub fn is_empty(&self) -> bool {
        let ratios = [
            self.market_cap,
            self.pe_ratio,
            self.forward_pe,
            self.peg_ratio,
            self.price_to_book,
            self.eps,
            self.dividend_yield,
            self.profit_margin,
            self.operating_margin,
            self.gross_margin,
            self.return_on_equity,
            self.revenue_ttm,
            self.beta,
            self.week_52_high,
            self.week_52_low,
        ];
        ratios.iter().all(Option::is_none)
            && self.name.is_none()
            && self.description.is_none()
            && self.sector.is_none()
            && self.industry.is_none()
    }

    /// Drops non-finite ratios instead of rejecting the whole snapshot.
    pub fn sanitized(mut self) -> Self {
        for value in [
            &mut self.market_cap,
            &mut self.pe_ratio,
            &mut self.forward_pe,
            &mut self.peg_ratio,
            &mut self.price_to_book,
            &mut self.eps,
            &mut self.dividend_yield,
            &mut self.profit_margin,
            &mut self.operating_margin,
            &mut self.gross_margin,
            &mut self.return_on_equity,
            &mut self.revenue_ttm,
            &mut self.beta,
            &mut self.week_52_high,
            &mut self.week_52_low,
        ] {
            if value.is_some_and(|inner| !inner.is_finite()) {
                *value = None;
            }
        }
        self
    }
}

/// News tone classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Map a signed score (e.g. -1.0..=1.0) using a symmetric dead band.
    pub fn from_score(score: f64, dead_band: f64) -> Self {
        if !score.is_finite() {
            Self::Neutral
        } else if score > dead_band {
            Self::Positive
        } else if score < -dead_band {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

/// Canonical news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub published_at: UtcDateTime,
    pub sentiment: Sentiment,
    pub related_assets: Vec<Symbol>,
    pub provider: ProviderId,
}

/// Instrument returned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub name: String,
    pub asset_class: AssetClass,
    pub exchange: Option<String>,
    pub currency: String,
    pub source: ProviderId,
}

impl Instrument {
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        asset_class: AssetClass,
        exchange: Option<String>,
        currency: impl AsRef<str>,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            symbol,
            name: name.into(),
            asset_class,
            exchange: exchange.filter(|value| !value.trim().is_empty()),
            currency: validate_currency_code(currency.as_ref())?,
            source,
        })
    }
}

/// One regulatory filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
    pub symbol: Symbol,
    pub cik: String,
    pub form: String,
    pub filed_at: UtcDateTime,
    pub accession_number: String,
    pub url: String,
    pub description: Option<String>,
}

/// One dated value of a macroeconomic series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicObservation {
    pub date: UtcDateTime,
    pub value: f64,
}

/// Macroeconomic series with ascending observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicSeries {
    pub series_id: String,
    pub title: Option<String>,
    pub units: Option<String>,
    pub frequency: Option<String>,
    pub source: ProviderId,
    pub observations: Vec<EconomicObservation>,
}

impl EconomicSeries {
    pub fn new(
        series_id: impl Into<String>,
        source: ProviderId,
        mut observations: Vec<EconomicObservation>,
    ) -> Self {
        observations.retain(|observation| observation.value.is_finite());
        observations.sort_by_key(|observation| observation.date);
        observations.dedup_by_key(|observation| observation.date);
        Self {
            series_id: series_id.into().trim().to_ascii_uppercase(),
            title: None,
            units: None,
            frequency: None,
            source,
            observations,
        }
    }

    pub fn latest(&self) -> Option<EconomicObservation> {
        self.observations.last().copied()
    }
}

/// Validate and normalize currency to uppercase 3-letter code.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn validate_optional_non_negative(
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    if let Some(value) = value {
        validate_non_negative(field, value)?;
    }
    Ok(())
}
