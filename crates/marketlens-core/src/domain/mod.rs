//! # Domain Models
//!
//! Canonical, provider-agnostic types every adapter normalizes into.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Asset`] | Live view of an instrument (price, 24h change, range, cap) |
//! | [`PriceHistory`] | Ascending, timestamp-deduplicated [`PriceHistoryPoint`]s |
//! | [`Fundamentals`] | Sparse set of optional ratios and descriptors |
//! | [`NewsItem`] | Article with [`Sentiment`] and related assets |
//! | [`Instrument`] | Search result |
//! | [`Filing`] | Regulatory filing |
//! | [`EconomicSeries`] | Dated macroeconomic observations |
//! | [`Symbol`] | Canonical uppercase symbol, the cross-source key |
//! | [`HistoryRange`] | Look-back window (1d, 1w, 1m, 3m, 1y, 5y) |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Numeric fields are validated before a value is cached: prices, volumes and
//! market caps must be finite and non-negative.

mod models;
mod range;
mod symbol;
mod timestamp;

pub use models::{
    validate_currency_code, Asset, AssetClass, EconomicObservation, EconomicSeries, Filing,
    Fundamentals, Instrument, NewsItem, PriceHistory, PriceHistoryPoint, Sentiment,
};
pub use range::{HistoryRange, Resolution};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
