//! # Marketlens Core
//!
//! Provider aggregation for stocks, funds, crypto, news, macro series and
//! filings. Eight upstream APIs sit behind one [`UnifiedService`] that
//! classifies symbols, routes each request through an ordered candidate
//! chain, and falls back when a source fails.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Alpha Vantage, Finnhub, Polygon, CoinGecko, FRED, SEC EDGAR, NewsAPI, StockTwits, fixture |
//! | [`cache`] | TTL cache shared by every adapter |
//! | [`classifier`] | Symbol to asset class, crypto allow-list |
//! | [`config`] | Environment-driven service configuration |
//! | [`data_source`] | Adapter trait, request types and [`SourceError`] |
//! | [`domain`] | Canonical models ([`Asset`], [`PriceHistory`], [`NewsItem`], ...) |
//! | [`error`] | Validation and configuration errors |
//! | [`health`] | Per-source health tracking |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`news`] | Cross-source deduplication and sentiment |
//! | [`provider_policy`] | Per-provider spacing and quota |
//! | [`routing`] | Candidate chains per operation |
//! | [`service`] | Fallback orchestrator |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Per-source FIFO queue and long-window quota |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marketlens_core::{ServiceConfig, UnifiedService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = UnifiedService::from_config(ServiceConfig::from_env()?)?;
//!
//!     if let Some(asset) = service.get_asset("BTC").await {
//!         println!("{} {:.2} via {}", asset.symbol, asset.price, asset.source);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Model
//!
//! Adapters return [`SourceError`]. The service never surfaces it: a failed
//! candidate is logged, recorded by the health monitor and skipped, and an
//! operation with no successful candidate resolves to `None` or an empty list.
//!
//! ```rust
//! use marketlens_core::{SourceError, SourceErrorKind};
//!
//! fn describe(error: &SourceError) -> &'static str {
//!     match error.kind() {
//!         SourceErrorKind::QuotaExceeded | SourceErrorKind::Auth => "source disabled for now",
//!         SourceErrorKind::NotFound => "no data",
//!         _ => "try the next source",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys are read from the environment and never logged
//! - All HTTP requests use TLS via rustls

pub mod adapters;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod health;
pub mod http_client;
pub mod news;
pub mod provider_policy;
pub mod routing;
pub mod service;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{
    AdapterContext, AlphaVantageAdapter, CoinGeckoAdapter, FinnhubAdapter, FixtureSet,
    FixtureSource, FredAdapter, NewsApiAdapter, PolygonAdapter, SecAdapter, StockTwitsAdapter,
};

// Caching
pub use cache::{cache_key, CacheStore, CacheTtl};

// Classification
pub use classifier::{classify, crypto_listing, Classification, CryptoListing};

// Configuration
pub use config::{DataMode, ServiceConfig};

// Data source trait and types
pub use data_source::{
    Capability, CapabilitySet, DataSource, FilingsRequest, FundamentalsRequest, HistoryRequest,
    NewsRequest, NewsScope, QuoteRequest, SearchRequest, SeriesRequest, SourceError,
    SourceErrorKind, SourceFuture,
};

// Domain models
pub use domain::{
    Asset, AssetClass, EconomicObservation, EconomicSeries, Filing, Fundamentals, HistoryRange,
    Instrument, NewsItem, PriceHistory, PriceHistoryPoint, Resolution, Sentiment, Symbol,
    UtcDateTime,
};

// Error types
pub use error::{CoreError, ValidationError};

// Health
pub use health::{HealthMonitor, HealthStatus, SourceHealth};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};

// News
pub use news::{dedupe_news, keyword_sentiment};

// Provider policies
pub use provider_policy::{LongWindowQuota, ProviderPolicy, QuotaWindow};

// Routing
pub use routing::{Route, RoutingTable};

// Service
pub use service::{UnifiedService, UnifiedServiceBuilder};

// Source identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::{QuotaCounter, RequestQueue};
