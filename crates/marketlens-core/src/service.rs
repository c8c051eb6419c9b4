//! Unified service: classification, routing, fallback and health tracking
//! over every configured source.
//!
//! Every public operation resolves to a value or an explicit absence. Source
//! failures are logged and recorded by the [`HealthMonitor`]; they never
//! reach the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::adapters::{
    AdapterContext, AlphaVantageAdapter, CoinGeckoAdapter, FinnhubAdapter, FixtureSource,
    FredAdapter, NewsApiAdapter, PolygonAdapter, SecAdapter, StockTwitsAdapter,
};
use crate::cache::CacheStore;
use crate::classifier::{classify, Classification};
use crate::config::{DataMode, ServiceConfig};
use crate::data_source::{
    DataSource, FilingsRequest, FundamentalsRequest, HistoryRequest, NewsRequest, NewsScope,
    QuoteRequest, SearchRequest, SeriesRequest, SourceError, SourceFuture,
};
use crate::health::{HealthMonitor, SourceHealth};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::news::dedupe_news;
use crate::provider_policy::ProviderPolicy;
use crate::routing::{Route, RoutingTable};
use crate::{
    Asset, AssetClass, CoreError, EconomicSeries, Filing, Fundamentals, HistoryRange, Instrument,
    NewsItem, PriceHistory, ProviderId,
};

/// Provider-agnostic facade consumed by the CLI and any other front end.
pub struct UnifiedService {
    sources: HashMap<ProviderId, Arc<dyn DataSource>>,
    routes: RoutingTable,
    health: HealthMonitor,
    cache: CacheStore,
    enable_fallback: bool,
}

impl std::fmt::Debug for UnifiedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedService")
            .field("sources", &self.source_ids())
            .field("enable_fallback", &self.enable_fallback)
            .finish_non_exhaustive()
    }
}

impl UnifiedService {
    pub fn builder() -> UnifiedServiceBuilder {
        UnifiedServiceBuilder::new()
    }

    /// Live or fixture service as described by `config`, using the reqwest transport.
    pub fn from_config(config: ServiceConfig) -> Result<Self, CoreError> {
        Self::builder().with_config(config).build()
    }

    /// Registered sources, sorted by id.
    pub fn source_ids(&self) -> Vec<ProviderId> {
        let mut ids = self.sources.keys().copied().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn classify(&self, raw: &str) -> Classification {
        classify(raw)
    }

    /// Current health of every registered source, sorted by provider id.
    pub fn health(&self) -> Vec<SourceHealth> {
        self.health.snapshot()
    }

    pub async fn get_asset(&self, raw: &str) -> Option<Asset> {
        let classification = classify(raw);
        self.quote_classified(classification).await
    }

    /// Resolve many symbols. Symbols are partitioned by asset class so each
    /// group only reaches its own candidate chain; groups and symbols are
    /// fetched concurrently and the result keeps input order, skipping
    /// symbols no source could resolve. Inputs that classify identically
    /// share one lookup.
    pub async fn get_assets(&self, symbols: &[&str]) -> Vec<Asset> {
        let mut partitions: BTreeMap<AssetClass, HashMap<Classification, Vec<usize>>> =
            BTreeMap::new();
        for (index, raw) in symbols.iter().enumerate() {
            let classification = classify(raw);
            partitions
                .entry(classification.asset_class)
                .or_default()
                .entry(classification)
                .or_default()
                .push(index);
        }

        let groups = partitions.into_values().map(|group| async move {
            let lookups = group.into_iter().map(|(classification, indices)| async move {
                (indices, self.quote_classified(classification).await)
            });
            join_all(lookups).await
        });

        let mut slots: Vec<Option<Asset>> = vec![None; symbols.len()];
        for (indices, asset) in join_all(groups).await.into_iter().flatten() {
            for index in indices {
                slots[index] = asset.clone();
            }
        }
        slots.into_iter().flatten().collect()
    }

    pub async fn get_price_history(&self, raw: &str, range: HistoryRange) -> Option<PriceHistory> {
        let classification = classify(raw);
        let req = accept(HistoryRequest::new(
            classification.symbol,
            classification.asset_class,
            range,
        ))?;
        self.first_success(Route::History(req.asset_class), move |source| {
            source.history(req.clone())
        })
        .await
    }

    pub async fn get_fundamentals(&self, raw: &str) -> Option<Fundamentals> {
        let classification = classify(raw);
        let req = accept(FundamentalsRequest::new(
            classification.symbol,
            classification.asset_class,
        ))?;
        self.first_success(Route::Fundamentals(req.asset_class), move |source| {
            source.fundamentals(req.clone())
        })
        .await
    }

    pub async fn get_market_news(&self, limit: usize) -> Vec<NewsItem> {
        self.merged_news(Route::MarketNews, NewsScope::General, limit)
            .await
    }

    pub async fn get_company_news(&self, raw: &str, limit: usize) -> Vec<NewsItem> {
        let symbol = classify(raw).symbol;
        self.merged_news(Route::CompanyNews, NewsScope::Company(symbol), limit)
            .await
    }

    pub async fn get_crypto_news(&self, limit: usize) -> Vec<NewsItem> {
        self.merged_news(Route::CryptoNews, NewsScope::Crypto, limit)
            .await
    }

    /// Merge search results from every candidate, first hit per symbol wins.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Instrument> {
        let Some(req) = accept(SearchRequest::new(query, limit)) else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        let mut instruments = self
            .merge_all(Route::Search, move |source| source.search(req.clone()))
            .await;
        instruments.retain(|instrument| seen.insert(instrument.symbol.clone()));
        instruments.truncate(limit);
        instruments
    }

    pub async fn get_economic_series(
        &self,
        series_id: &str,
        limit: usize,
    ) -> Option<EconomicSeries> {
        let req = accept(SeriesRequest::new(series_id, limit))?;
        self.first_success(Route::EconomicSeries, move |source| {
            source.economic_series(req.clone())
        })
        .await
    }

    /// Recent filings, newest first.
    pub async fn get_filings(&self, raw: &str, limit: usize) -> Vec<Filing> {
        let Some(req) = accept(FilingsRequest::new(classify(raw).symbol, limit)) else {
            return Vec::new();
        };
        let mut filings = self
            .first_success(Route::Filings, move |source| {
                let req = req.clone();
                Box::pin(async move {
                    let filings = source.filings(req).await?;
                    Ok((!filings.is_empty()).then_some(filings))
                })
            })
            .await
            .unwrap_or_default();
        filings.sort_by(|left, right| right.filed_at.cmp(&left.filed_at));
        filings
    }

    async fn quote_classified(&self, classification: Classification) -> Option<Asset> {
        let req = accept(QuoteRequest::new(
            classification.symbol,
            classification.asset_class,
        ))?;
        self.first_success(Route::Quote(req.asset_class), move |source| {
            source.quote(req.clone())
        })
        .await
    }

    async fn merged_news(&self, route: Route, scope: NewsScope, limit: usize) -> Vec<NewsItem> {
        let Some(req) = accept(NewsRequest::new(scope, limit)) else {
            return Vec::new();
        };
        let merged = self
            .merge_all(route, move |source| source.news(req.clone()))
            .await;
        dedupe_news(merged, limit)
    }

    /// Registered sources on `route` that declare the route's capability, in
    /// chain order. Without fallback only the primary is kept.
    fn candidates(&self, route: Route) -> Vec<(ProviderId, &dyn DataSource)> {
        let capability = route.capability();
        let candidates = self
            .routes
            .chain(route)
            .iter()
            .filter_map(|provider| {
                let source = self.sources.get(provider)?;
                source
                    .capabilities()
                    .supports(capability)
                    .then_some((*provider, source.as_ref()))
            });

        if self.enable_fallback {
            candidates.collect()
        } else {
            candidates.take(1).collect()
        }
    }

    /// Try candidates in order; the first non-empty answer wins.
    async fn first_success<T, F>(&self, route: Route, mut invoke: F) -> Option<T>
    where
        F: for<'a> FnMut(&'a dyn DataSource) -> SourceFuture<'a, Option<T>>,
    {
        let candidates = self.candidates(route);
        if candidates.is_empty() {
            debug!(?route, "no candidate sources");
            return None;
        }

        for (attempt, (provider, source)) in candidates.into_iter().enumerate() {
            match self.health.track(provider, invoke(source)).await {
                Ok(Some(value)) => {
                    if attempt > 0 {
                        info!(?route, %provider, attempt, "served by fallback source");
                    }
                    return Some(value);
                }
                Ok(None) => debug!(?route, %provider, "source returned no data"),
                Err(error) => log_source_error(route, provider, &error),
            }
        }

        debug!(?route, "every candidate came back empty");
        None
    }

    /// Call every candidate concurrently and concatenate results in chain order.
    async fn merge_all<T, F>(&self, route: Route, invoke: F) -> Vec<T>
    where
        F: for<'a> Fn(&'a dyn DataSource) -> SourceFuture<'a, Vec<T>>,
    {
        let candidates = self.candidates(route);
        let calls = candidates
            .iter()
            .map(|(provider, source)| self.health.track(*provider, invoke(*source)));
        let results = join_all(calls).await;

        candidates
            .iter()
            .zip(results)
            .flat_map(|((provider, _), result)| match result {
                Ok(values) => values,
                Err(error) => {
                    log_source_error(route, *provider, &error);
                    Vec::new()
                }
            })
            .collect()
    }
}

fn log_source_error(route: Route, provider: ProviderId, error: &SourceError) {
    if error.disables_source() {
        warn!(
            ?route,
            %provider,
            code = error.code(),
            %error,
            "source unusable until its credential or rate window recovers"
        );
    } else if error.counts_against_health() {
        warn!(?route, %provider, code = error.code(), %error, "source failed; trying next candidate");
    } else {
        debug!(?route, %provider, code = error.code(), %error, "source has no answer");
    }
}

/// Invalid caller input resolves to "no data" like any other miss.
fn accept<T>(request: Result<T, SourceError>) -> Option<T> {
    request
        .map_err(|error| debug!(%error, "request rejected before routing"))
        .ok()
}

/// Builder for [`UnifiedService`].
///
/// Live adapters are created for every provider with a credential (CoinGecko,
/// SEC and StockTwits need none). Transport, cache, per-provider rate
/// policies and routing can be overridden; sources added with
/// [`with_source`](Self::with_source) replace any adapter with the same id.
pub struct UnifiedServiceBuilder {
    config: ServiceConfig,
    http: Option<Arc<dyn HttpClient>>,
    cache: Option<CacheStore>,
    policies: HashMap<ProviderId, ProviderPolicy>,
    routes: Option<RoutingTable>,
    extra_sources: Vec<Arc<dyn DataSource>>,
}

impl Default for UnifiedServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UnifiedServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            http: None,
            cache: None,
            policies: HashMap::new(),
            routes: None,
            extra_sources: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policies.insert(policy.provider_id, policy);
        self
    }

    /// Apply `policy_for` to every live provider.
    pub fn with_policies(mut self, policy_for: impl Fn(ProviderId) -> ProviderPolicy) -> Self {
        for provider in ProviderId::LIVE {
            self.policies.insert(provider, policy_for(provider));
        }
        self
    }

    pub fn with_routes(mut self, routes: RoutingTable) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.extra_sources.push(source);
        self
    }

    pub fn build(self) -> Result<UnifiedService, CoreError> {
        let cache = self.cache.clone().unwrap_or_default();
        let mut sources: HashMap<ProviderId, Arc<dyn DataSource>> = HashMap::new();

        let default_routes = match self.config.mode {
            DataMode::Live => {
                for source in self.live_sources(&cache) {
                    sources.insert(source.id(), source);
                }
                RoutingTable::standard()
            }
            DataMode::Fixture => {
                let fixture = FixtureSource::from_path(self.config.fixture_path.as_deref())?;
                sources.insert(ProviderId::Fixture, Arc::new(fixture));
                RoutingTable::fixture()
            }
        };

        for source in self.extra_sources {
            sources.insert(source.id(), source);
        }

        let service = UnifiedService {
            health: HealthMonitor::new(sources.keys().copied()),
            sources,
            routes: self.routes.unwrap_or(default_routes),
            cache,
            enable_fallback: self.config.enable_fallback,
        };

        info!(
            mode = ?self.config.mode,
            sources = ?service.source_ids(),
            enable_fallback = service.enable_fallback,
            "unified service ready"
        );
        Ok(service)
    }

    fn live_sources(&self, cache: &CacheStore) -> Vec<Arc<dyn DataSource>> {
        let http = self
            .http
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let context = AdapterContext::new(http, cache.clone())
            .with_timeout_ms(self.config.http_timeout_ms);
        let config = &self.config;
        let policy = |provider: ProviderId| {
            self.policies
                .get(&provider)
                .cloned()
                .unwrap_or_else(|| ProviderPolicy::default_for(provider))
        };

        let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();
        if let Some(key) = config.api_key(ProviderId::Alphavantage) {
            sources.push(Arc::new(AlphaVantageAdapter::with_policy(
                &context,
                key,
                &policy(ProviderId::Alphavantage),
            )));
        }
        if let Some(key) = config.api_key(ProviderId::Finnhub) {
            sources.push(Arc::new(FinnhubAdapter::with_policy(
                &context,
                key,
                &policy(ProviderId::Finnhub),
            )));
        }
        if let Some(key) = config.api_key(ProviderId::Polygon) {
            sources.push(Arc::new(PolygonAdapter::with_policy(
                &context,
                key,
                &policy(ProviderId::Polygon),
            )));
        }
        sources.push(Arc::new(CoinGeckoAdapter::with_policy(
            &context,
            config.api_key(ProviderId::Coingecko).map(str::to_owned),
            &policy(ProviderId::Coingecko),
        )));
        if let Some(key) = config.api_key(ProviderId::Fred) {
            sources.push(Arc::new(FredAdapter::with_policy(
                &context,
                key,
                &policy(ProviderId::Fred),
            )));
        }
        sources.push(Arc::new(SecAdapter::with_policy(
            &context,
            config.sec_user_agent.as_str(),
            &policy(ProviderId::Sec),
        )));
        if let Some(key) = config.api_key(ProviderId::Newsapi) {
            sources.push(Arc::new(NewsApiAdapter::with_policy(
                &context,
                key,
                &policy(ProviderId::Newsapi),
            )));
        }
        sources.push(Arc::new(StockTwitsAdapter::with_policy(
            &context,
            &policy(ProviderId::Stocktwits),
        )));

        for provider in ProviderId::LIVE {
            if !sources.iter().any(|source| source.id() == provider) {
                debug!(%provider, "no credential configured; adapter disabled");
            }
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::data_source::{CapabilitySet, SourceErrorKind};
    use crate::health::HealthStatus;
    use crate::{Sentiment, UtcDateTime};

    /// Quote/news source with a scripted outcome and a call counter.
    struct StubSource {
        id: ProviderId,
        quote: Mutex<Result<Option<f64>, SourceErrorKind>>,
        news: Vec<NewsItem>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn quoting(id: ProviderId, price: f64) -> Self {
            Self {
                id,
                quote: Mutex::new(Ok(Some(price))),
                news: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(id: ProviderId, kind: SourceErrorKind) -> Self {
            Self {
                quote: Mutex::new(Err(kind)),
                ..Self::quoting(id, 0.0)
            }
        }

        fn with_news(mut self, news: Vec<NewsItem>) -> Self {
            self.news = news;
            self
        }

        fn set_quote(&self, outcome: Result<Option<f64>, SourceErrorKind>) {
            *self.quote.lock().expect("stub lock") = outcome;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataSource for StubSource {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet {
                quote: true,
                news: true,
                ..CapabilitySet::none()
            }
        }

        fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Option<Asset>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.quote.lock().expect("stub lock").clone();
            Box::pin(async move {
                match outcome {
                    Ok(Some(price)) => Ok(Some(
                        Asset::new(req.symbol, "Stub", req.asset_class, price, self.id)
                            .expect("asset"),
                    )),
                    Ok(None) => Ok(None),
                    Err(kind) => Err(SourceError::new(kind, "scripted failure")),
                }
            })
        }

        fn news<'a>(&'a self, _req: NewsRequest) -> SourceFuture<'a, Vec<NewsItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let news = self.news.clone();
            Box::pin(async move { Ok(news) })
        }
    }

    fn article(id: &str, title: &str, published_at: &str, provider: ProviderId) -> NewsItem {
        NewsItem {
            id: id.to_owned(),
            title: title.to_owned(),
            summary: String::new(),
            source: String::from("Wire"),
            url: format!("https://news.test/{id}"),
            published_at: UtcDateTime::parse(published_at).expect("timestamp"),
            sentiment: Sentiment::Neutral,
            related_assets: Vec::new(),
            provider,
        }
    }

    fn service(
        sources: Vec<Arc<StubSource>>,
        routes: RoutingTable,
        enable_fallback: bool,
    ) -> UnifiedService {
        let mut builder = UnifiedService::builder()
            .with_config(
                ServiceConfig::default()
                    .with_mode(DataMode::Fixture)
                    .with_fallback(enable_fallback),
            )
            .with_routes(routes);
        for source in sources {
            builder = builder.with_source(source);
        }
        builder.build().expect("service")
    }

    fn equity_routes() -> RoutingTable {
        RoutingTable::empty()
            .with_chain(
                Route::Quote(AssetClass::Stock),
                [ProviderId::Finnhub, ProviderId::Alphavantage],
            )
            .with_chain(Route::Quote(AssetClass::Crypto), [ProviderId::Coingecko])
    }

    #[tokio::test]
    async fn primary_failure_falls_back_in_chain_order() {
        let primary = Arc::new(StubSource::failing(ProviderId::Finnhub, SourceErrorKind::Transport));
        let fallback = Arc::new(StubSource::quoting(ProviderId::Alphavantage, 101.0));
        let service = service(vec![primary.clone(), fallback.clone()], equity_routes(), true);

        let asset = service.get_asset("aapl").await.expect("fallback answer");
        assert_eq!(asset.source, ProviderId::Alphavantage);
        assert_eq!(asset.symbol.as_str(), "AAPL");
        assert_eq!((primary.calls(), fallback.calls()), (1, 1));
    }

    #[tokio::test]
    async fn disabled_fallback_stops_after_primary() {
        let primary = Arc::new(StubSource::failing(ProviderId::Finnhub, SourceErrorKind::Transport));
        let fallback = Arc::new(StubSource::quoting(ProviderId::Alphavantage, 101.0));
        let service = service(vec![primary, fallback.clone()], equity_routes(), false);

        assert!(service.get_asset("AAPL").await.is_none());
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn every_candidate_failing_is_absence_not_error() {
        let primary = Arc::new(StubSource::failing(ProviderId::Finnhub, SourceErrorKind::Auth));
        let fallback = Arc::new(StubSource::quoting(ProviderId::Alphavantage, 1.0));
        fallback.set_quote(Ok(None));
        let service = service(vec![primary, fallback], equity_routes(), true);

        assert!(service.get_asset("MSFT").await.is_none());
        let finnhub = service
            .health()
            .into_iter()
            .find(|health| health.source == ProviderId::Finnhub)
            .expect("tracked");
        assert_eq!(finnhub.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_routes_by_class() {
        let equity = Arc::new(StubSource::quoting(ProviderId::Finnhub, 200.0));
        let crypto = Arc::new(StubSource::quoting(ProviderId::Coingecko, 65_000.0));
        let service = service(vec![equity.clone(), crypto.clone()], equity_routes(), true);

        let assets = service.get_assets(&["BTC", "AAPL", "eth-usd", "MSFT"]).await;
        let symbols = assets.iter().map(|a| a.symbol.as_str()).collect::<Vec<_>>();
        assert_eq!(symbols, vec!["BTC", "AAPL", "ETH", "MSFT"]);
        assert_eq!(assets[0].source, ProviderId::Coingecko);
        assert_eq!(assets[1].source, ProviderId::Finnhub);
        assert_eq!((equity.calls(), crypto.calls()), (2, 2));
    }

    #[tokio::test]
    async fn merged_news_is_deduplicated_across_sources() {
        let first = Arc::new(StubSource::quoting(ProviderId::Newsapi, 1.0).with_news(vec![
            article("a", "Fed holds rates steady", "2026-04-17T10:00:00Z", ProviderId::Newsapi),
        ]));
        let second = Arc::new(StubSource::quoting(ProviderId::Finnhub, 1.0).with_news(vec![
            article("b", "FED HOLDS RATES STEADY!", "2026-04-17T11:00:00Z", ProviderId::Finnhub),
            article("c", "Oil slips", "2026-04-17T12:00:00Z", ProviderId::Finnhub),
        ]));
        let routes =
            RoutingTable::empty().with_chain(Route::MarketNews, [ProviderId::Newsapi, ProviderId::Finnhub]);
        let service = service(vec![first, second], routes, true);

        let ids = service
            .get_market_news(10)
            .await
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn sources_without_the_capability_are_skipped() {
        let stub = Arc::new(StubSource::quoting(ProviderId::Fred, 1.0));
        let routes = RoutingTable::empty().with_chain(Route::Filings, [ProviderId::Fred]);
        let service = service(vec![stub.clone()], routes, true);

        assert!(service.get_filings("AAPL", 5).await.is_empty());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_input_resolves_to_no_data() {
        let service = service(Vec::new(), RoutingTable::standard(), true);
        assert!(service.get_asset("   ").await.is_none());
        assert!(service.search("", 10).await.is_empty());
        assert!(service.get_economic_series("bad id!", 5).await.is_none());
    }

    #[tokio::test]
    async fn fixture_mode_without_file_registers_empty_fixture_source() {
        let service = UnifiedService::builder()
            .with_config(ServiceConfig::default().with_mode(DataMode::Fixture))
            .build()
            .expect("service");

        assert_eq!(service.source_ids(), vec![ProviderId::Fixture]);
        assert!(service.get_asset("AAPL").await.is_none());
        assert!(service.get_crypto_news(5).await.is_empty());
    }
}
