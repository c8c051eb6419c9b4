//! Data source trait and request types.
//!
//! This module defines the adapter contract (`DataSource`) every provider
//! implements, the capability matrix used for routing, and the typed
//! [`SourceError`] adapters return to the orchestrator.
//!
//! # Capabilities
//!
//! | Capability | Request | Response |
//! |------------|---------|----------|
//! | Quote | [`QuoteRequest`] | `Option<Asset>` |
//! | History | [`HistoryRequest`] | `Option<PriceHistory>` |
//! | Fundamentals | [`FundamentalsRequest`] | `Option<Fundamentals>` |
//! | News | [`NewsRequest`] | `Vec<NewsItem>` |
//! | Search | [`SearchRequest`] | `Vec<Instrument>` |
//! | EconomicSeries | [`SeriesRequest`] | `Option<EconomicSeries>` |
//! | Filings | [`FilingsRequest`] | `Vec<Filing>` |
//!
//! `Ok(None)` and `Ok(vec![])` mean the provider answered but had nothing;
//! `Err` means the source failed and the orchestrator should fall back.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{
    Asset, AssetClass, EconomicSeries, Filing, Fundamentals, HistoryRange, Instrument, NewsItem,
    PriceHistory, ProviderId, Symbol,
};

/// Boxed future returned by every [`DataSource`] method.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Operation a source can serve; used for routing and capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Quote,
    History,
    Fundamentals,
    News,
    Search,
    EconomicSeries,
    Filings,
}

impl Capability {
    pub const ALL: [Self; 7] = [
        Self::Quote,
        Self::History,
        Self::Fundamentals,
        Self::News,
        Self::Search,
        Self::EconomicSeries,
        Self::Filings,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::History => "history",
            Self::Fundamentals => "fundamentals",
            Self::News => "news",
            Self::Search => "search",
            Self::EconomicSeries => "economic_series",
            Self::Filings => "filings",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported capability matrix for a data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub quote: bool,
    pub history: bool,
    pub fundamentals: bool,
    pub news: bool,
    pub search: bool,
    pub economic_series: bool,
    pub filings: bool,
}

impl CapabilitySet {
    pub const fn none() -> Self {
        Self {
            quote: false,
            history: false,
            fundamentals: false,
            news: false,
            search: false,
            economic_series: false,
            filings: false,
        }
    }

    pub const fn full() -> Self {
        Self {
            quote: true,
            history: true,
            fundamentals: true,
            news: true,
            search: true,
            economic_series: true,
            filings: true,
        }
    }

    pub const fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Quote => self.quote = true,
            Capability::History => self.history = true,
            Capability::Fundamentals => self.fundamentals = true,
            Capability::News => self.news = true,
            Capability::Search => self.search = true,
            Capability::EconomicSeries => self.economic_series = true,
            Capability::Filings => self.filings = true,
        }
        self
    }

    pub const fn supports(self, capability: Capability) -> bool {
        match capability {
            Capability::Quote => self.quote,
            Capability::History => self.history,
            Capability::Fundamentals => self.fundamentals,
            Capability::News => self.news,
            Capability::Search => self.search,
            Capability::EconomicSeries => self.economic_series,
            Capability::Filings => self.filings,
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Network failure, timeout, or unexpected HTTP status.
    Transport,
    /// Missing or rejected credential.
    Auth,
    /// Short- or long-window rate limit hit.
    QuotaExceeded,
    /// Payload did not match the expected schema.
    MalformedResponse,
    /// Symbol or series unknown to this provider.
    NotFound,
    Unsupported,
    InvalidRequest,
}

/// Structured source error used by orchestrator fallback and health tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Transport, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Auth, message)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::QuotaExceeded, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::MalformedResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NotFound, message)
    }

    pub fn unsupported(capability: Capability) -> Self {
        Self::new(
            SourceErrorKind::Unsupported,
            format!("capability '{capability}' is not supported by this source"),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message)
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this failure should move the source's health state.
    ///
    /// A provider that answered "not found" or was never asked is not failing.
    pub const fn counts_against_health(&self) -> bool {
        !matches!(
            self.kind,
            SourceErrorKind::NotFound | SourceErrorKind::Unsupported | SourceErrorKind::InvalidRequest
        )
    }

    /// Auth and quota failures make the source unusable until fixed or rolled over.
    pub const fn disables_source(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Auth | SourceErrorKind::QuotaExceeded
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Transport => "source.transport",
            SourceErrorKind::Auth => "source.auth",
            SourceErrorKind::QuotaExceeded => "source.quota_exceeded",
            SourceErrorKind::MalformedResponse => "source.malformed_response",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Unsupported => "source.unsupported",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Request payload for quote lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: Symbol,
    pub asset_class: AssetClass,
}

impl QuoteRequest {
    pub fn new(symbol: Symbol, asset_class: AssetClass) -> Result<Self, SourceError> {
        if symbol.is_empty() {
            return Err(SourceError::invalid_request(
                "quote request must include a symbol",
            ));
        }
        Ok(Self {
            symbol,
            asset_class,
        })
    }
}

/// Request payload for price history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub asset_class: AssetClass,
    pub range: HistoryRange,
}

impl HistoryRequest {
    pub fn new(
        symbol: Symbol,
        asset_class: AssetClass,
        range: HistoryRange,
    ) -> Result<Self, SourceError> {
        if symbol.is_empty() {
            return Err(SourceError::invalid_request(
                "history request must include a symbol",
            ));
        }
        Ok(Self {
            symbol,
            asset_class,
            range,
        })
    }
}

/// Request payload for fundamentals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundamentalsRequest {
    pub symbol: Symbol,
    pub asset_class: AssetClass,
}

impl FundamentalsRequest {
    pub fn new(symbol: Symbol, asset_class: AssetClass) -> Result<Self, SourceError> {
        if symbol.is_empty() {
            return Err(SourceError::invalid_request(
                "fundamentals request must include a symbol",
            ));
        }
        Ok(Self {
            symbol,
            asset_class,
        })
    }
}

/// Which slice of the news stream to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NewsScope {
    /// Broad market headlines.
    General,
    /// Articles about one company.
    Company(Symbol),
    /// Crypto market headlines.
    Crypto,
}

impl NewsScope {
    pub fn cache_part(&self) -> String {
        match self {
            Self::General => String::from("general"),
            Self::Company(symbol) => format!("company:{symbol}"),
            Self::Crypto => String::from("crypto"),
        }
    }
}

/// Request payload for news.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRequest {
    pub scope: NewsScope,
    pub limit: usize,
}

impl NewsRequest {
    pub fn new(scope: NewsScope, limit: usize) -> Result<Self, SourceError> {
        if limit == 0 {
            return Err(SourceError::invalid_request(
                "news request limit must be greater than zero",
            ));
        }
        if let NewsScope::Company(symbol) = &scope {
            if symbol.is_empty() {
                return Err(SourceError::invalid_request(
                    "company news request must include a symbol",
                ));
            }
        }
        Ok(Self { scope, limit })
    }
}

/// Request payload for search endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Result<Self, SourceError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(SourceError::invalid_request(
                "search query must not be empty",
            ));
        }
        if limit == 0 {
            return Err(SourceError::invalid_request(
                "search request limit must be greater than zero",
            ));
        }
        Ok(Self {
            query: query.trim().to_owned(),
            limit,
        })
    }
}

/// Request payload for a macroeconomic series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub series_id: String,
    pub limit: usize,
}

impl SeriesRequest {
    pub fn new(series_id: impl AsRef<str>, limit: usize) -> Result<Self, SourceError> {
        let series_id = series_id.as_ref().trim().to_ascii_uppercase();
        if series_id.is_empty() {
            return Err(SourceError::invalid_request("series id must not be empty"));
        }
        if !series_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(SourceError::invalid_request(format!(
                "series id '{series_id}' contains invalid characters"
            )));
        }
        if limit == 0 {
            return Err(SourceError::invalid_request(
                "series request limit must be greater than zero",
            ));
        }
        Ok(Self { series_id, limit })
    }
}

/// Request payload for regulatory filings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingsRequest {
    pub symbol: Symbol,
    pub limit: usize,
}

impl FilingsRequest {
    pub fn new(symbol: Symbol, limit: usize) -> Result<Self, SourceError> {
        if symbol.is_empty() {
            return Err(SourceError::invalid_request(
                "filings request must include a symbol",
            ));
        }
        if limit == 0 {
            return Err(SourceError::invalid_request(
                "filings request limit must be greater than zero",
            ));
        }
        Ok(Self { symbol, limit })
    }
}

/// Source adapter contract.
///
/// Every provider implements this trait so the orchestrator can call it
/// polymorphically. Capabilities a provider lacks keep the default body,
/// which reports [`SourceErrorKind::Unsupported`].
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// request path for the life of the service.
pub trait DataSource: Send + Sync {
    /// Returns the unique provider identifier.
    fn id(&self) -> ProviderId;

    /// Returns the set of supported capabilities.
    fn capabilities(&self) -> CapabilitySet;

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Option<Asset>> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported(Capability::Quote)) })
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Option<PriceHistory>> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported(Capability::History)) })
    }

    fn fundamentals<'a>(
        &'a self,
        req: FundamentalsRequest,
    ) -> SourceFuture<'a, Option<Fundamentals>> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported(Capability::Fundamentals)) })
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, Vec<NewsItem>> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported(Capability::News)) })
    }

    fn search<'a>(&'a self, req: SearchRequest) -> SourceFuture<'a, Vec<Instrument>> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported(Capability::Search)) })
    }

    fn economic_series<'a>(
        &'a self,
        req: SeriesRequest,
    ) -> SourceFuture<'a, Option<EconomicSeries>> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported(Capability::EconomicSeries)) })
    }

    fn filings<'a>(&'a self, req: FilingsRequest) -> SourceFuture<'a, Vec<Filing>> {
        let _ = req;
        Box::pin(async { Err(SourceError::unsupported(Capability::Filings)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_builder() {
        let set = CapabilitySet::none()
            .with(Capability::Quote)
            .with(Capability::News);
        assert!(set.supports(Capability::Quote));
        assert!(!set.supports(Capability::History));
    }

    #[test]
    fn not_found_does_not_count_against_health() {
        assert!(!SourceError::not_found("unknown").counts_against_health());
        assert!(!SourceError::unsupported(Capability::Filings).counts_against_health());
        assert!(SourceError::transport("reset").counts_against_health());
        assert!(SourceError::quota_exceeded("daily").disables_source());
        assert!(!SourceError::malformed("bad json").disables_source());
    }

    #[test]
    fn error_display_includes_code() {
        let err = SourceError::auth("invalid key");
        assert_eq!(err.to_string(), "invalid key (source.auth)");
    }

    #[test]
    fn request_validation() {
        assert!(SearchRequest::new("   ", 5).is_err());
        assert_eq!(
            SearchRequest::new(" apple ", 5).expect("valid").query,
            "apple"
        );
        assert!(NewsRequest::new(NewsScope::General, 0).is_err());
        assert!(NewsRequest::new(NewsScope::Company(Symbol::canonical("")), 5).is_err());
        assert_eq!(
            SeriesRequest::new("gdp", 10).expect("valid").series_id,
            "GDP"
        );
        assert!(SeriesRequest::new("GDP;DROP", 10).is_err());
        assert!(FilingsRequest::new(Symbol::canonical("AAPL"), 0).is_err());
    }

    struct Bare;

    impl DataSource for Bare {
        fn id(&self) -> ProviderId {
            ProviderId::Fixture
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::none()
        }
    }

    #[tokio::test]
    async fn default_methods_report_unsupported() {
        let req = QuoteRequest::new(Symbol::canonical("AAPL"), AssetClass::Stock).expect("valid");
        let err = Bare.quote(req).await.expect_err("must be unsupported");
        assert_eq!(err.kind(), SourceErrorKind::Unsupported);
    }
}
