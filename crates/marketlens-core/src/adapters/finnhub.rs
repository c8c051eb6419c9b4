use serde::Deserialize;
use tracing::debug;

use crate::adapters::common::{
    invalid_payload, lenient_f64, AdapterContext, AdapterCore, RawArticle,
};
use crate::cache::{cache_key, CacheTtl};
use crate::data_source::{
    CapabilitySet, DataSource, FundamentalsRequest, NewsRequest, NewsScope, QuoteRequest,
    SearchRequest, SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{
    Asset, AssetClass, Fundamentals, Instrument, NewsItem, ProviderId, Symbol, UtcDateTime,
};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const COMPANY_NEWS_LOOKBACK_DAYS: i64 = 7;

/// Finnhub adapter: equity quotes enriched with the company profile, basic
/// financials, company/general/crypto news and symbol search.
pub struct FinnhubAdapter {
    core: AdapterCore,
    auth: HttpAuth,
    base_url: String,
}

impl FinnhubAdapter {
    pub fn new(context: &AdapterContext, api_key: impl Into<String>) -> Self {
        Self::with_policy(
            context,
            api_key,
            &ProviderPolicy::default_for(ProviderId::Finnhub),
        )
    }

    pub fn with_policy(
        context: &AdapterContext,
        api_key: impl Into<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderId::Finnhub, context, policy),
            auth: HttpAuth::Header {
                name: String::from("X-Finnhub-Token"),
                value: api_key.into(),
            },
            base_url: String::from(BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{path}", self.base_url)).with_auth(&self.auth)
    }

    /// Company profile, cached for a day. Used to enrich quotes and fundamentals.
    async fn profile(&self, symbol: &Symbol) -> Result<FinnhubProfile, SourceError> {
        let key = cache_key(ProviderId::Finnhub, "profile", &[symbol.as_str()]);
        self.core
            .cached(key, CacheTtl::PROFILE, || async {
                let profile: FinnhubProfile = self
                    .core
                    .fetch_json(self.request(&format!(
                        "/stock/profile2?symbol={}",
                        urlencoding::encode(symbol.as_str())
                    )))
                    .await?;
                if profile.name.is_none() && profile.ticker.is_none() {
                    return Err(SourceError::not_found(format!(
                        "finnhub has no profile for {symbol}"
                    )));
                }
                Ok(profile)
            })
            .await
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Asset, SourceError> {
        let quote: FinnhubQuote = self
            .core
            .fetch_json(self.request(&format!(
                "/quote?symbol={}",
                urlencoding::encode(req.symbol.as_str())
            )))
            .await?;

        // Unknown symbols come back as an all-zero quote.
        let price = quote.current.filter(|price| *price > 0.0).ok_or_else(|| {
            SourceError::not_found(format!("finnhub has no quote for {}", req.symbol))
        })?;

        let profile = match self.profile(&req.symbol).await {
            Ok(profile) => Some(profile),
            Err(error) => {
                debug!(symbol = %req.symbol, %error, "finnhub profile unavailable; quote left unenriched");
                None
            }
        };

        let name = profile
            .as_ref()
            .and_then(|profile| profile.name.clone())
            .unwrap_or_else(|| req.symbol.as_str().to_owned());

        let mut asset = Asset::new(
            req.symbol.clone(),
            name,
            req.asset_class,
            price,
            ProviderId::Finnhub,
        )
        .map_err(invalid_payload(ProviderId::Finnhub))?
        .with_range(quote.high, quote.low);

        asset = match (quote.change, quote.change_percent, quote.previous_close) {
            (Some(change), Some(percent), _) => asset.with_change(change, percent),
            (_, _, Some(previous_close)) => asset.with_previous_close(previous_close),
            _ => asset,
        };

        if let Some(profile) = profile {
            asset = asset
                .with_logo(profile.logo)
                .with_market_cap(profile.market_cap_millions.map(|cap| cap * 1_000_000.0));
        }

        if let Some(seconds) = quote.timestamp.filter(|seconds| *seconds > 0) {
            if let Ok(as_of) = UtcDateTime::from_unix_seconds(seconds) {
                asset = asset.with_as_of(as_of);
            }
        }

        asset.validated().map_err(invalid_payload(ProviderId::Finnhub))
    }

    async fn fetch_fundamentals(
        &self,
        req: &FundamentalsRequest,
    ) -> Result<Fundamentals, SourceError> {
        let response: FinnhubMetricResponse = self
            .core
            .fetch_json(self.request(&format!(
                "/stock/metric?symbol={}&metric=all",
                urlencoding::encode(req.symbol.as_str())
            )))
            .await?;
        let metric = response.metric.unwrap_or_default();
        let profile = self.profile(&req.symbol).await.ok();

        // Finnhub reports margins and yields in percent.
        let percent = |value: Option<f64>| value.map(|value| value / 100.0);
        let fundamentals = Fundamentals {
            name: profile.as_ref().and_then(|profile| profile.name.clone()),
            industry: profile
                .as_ref()
                .and_then(|profile| profile.industry.clone()),
            market_cap: metric
                .market_cap_millions
                .or_else(|| profile.as_ref().and_then(|p| p.market_cap_millions))
                .map(|cap| cap * 1_000_000.0),
            pe_ratio: metric.pe_ttm,
            price_to_book: metric.pb_annual,
            eps: metric.eps_ttm,
            dividend_yield: percent(metric.dividend_yield),
            profit_margin: percent(metric.net_margin),
            operating_margin: percent(metric.operating_margin),
            gross_margin: percent(metric.gross_margin),
            return_on_equity: percent(metric.roe),
            beta: metric.beta,
            week_52_high: metric.week_52_high,
            week_52_low: metric.week_52_low,
            ..Fundamentals::new(req.symbol.clone(), ProviderId::Finnhub)
        }
        .sanitized();

        if fundamentals.is_empty() {
            return Err(SourceError::not_found(format!(
                "finnhub has no financials for {}",
                req.symbol
            )));
        }
        Ok(fundamentals)
    }

    async fn fetch_news(&self, req: &NewsRequest) -> Result<Vec<NewsItem>, SourceError> {
        let (path, related) = match &req.scope {
            NewsScope::General => (String::from("/news?category=general"), Vec::new()),
            NewsScope::Crypto => (String::from("/news?category=crypto"), Vec::new()),
            NewsScope::Company(symbol) => {
                let to = UtcDateTime::now();
                let from = UtcDateTime::from_offset_datetime(
                    to.into_inner() - time::Duration::days(COMPANY_NEWS_LOOKBACK_DAYS),
                )
                .unwrap_or(to);
                (
                    format!(
                        "/company-news?symbol={}&from={}&to={}",
                        urlencoding::encode(symbol.as_str()),
                        from.date_string(),
                        to.date_string()
                    ),
                    vec![symbol.clone()],
                )
            }
        };

        let articles: Vec<FinnhubArticle> = self.core.fetch_json(self.request(&path)).await?;

        Ok(articles
            .into_iter()
            .filter_map(|article| {
                let published_at = UtcDateTime::from_unix_seconds(article.datetime).ok()?;
                let mut related_assets = related.clone();
                if related_assets.is_empty() {
                    related_assets = article
                        .related
                        .split(',')
                        .filter_map(|raw| Symbol::parse(raw).ok())
                        .collect();
                }
                RawArticle {
                    title: article.headline,
                    summary: article.summary,
                    source: article.source,
                    url: article.url,
                    published_at,
                    sentiment: None,
                    related_assets,
                }
                .into_item(ProviderId::Finnhub)
            })
            .take(req.limit)
            .collect())
    }

    async fn fetch_search(&self, req: &SearchRequest) -> Result<Vec<Instrument>, SourceError> {
        let response: FinnhubSearchResponse = self
            .core
            .fetch_json(self.request(&format!(
                "/search?q={}",
                urlencoding::encode(&req.query)
            )))
            .await?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|item| {
                let symbol = Symbol::parse(&item.symbol).ok()?;
                let asset_class = match item.kind.as_str() {
                    "ETP" | "ETF" | "Mutual Fund" => AssetClass::Fund,
                    _ => AssetClass::Stock,
                };
                Instrument::new(
                    symbol,
                    item.description,
                    asset_class,
                    None,
                    "USD",
                    ProviderId::Finnhub,
                )
                .ok()
            })
            .take(req.limit)
            .collect())
    }
}

impl DataSource for FinnhubAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            quote: true,
            fundamentals: true,
            news: true,
            search: true,
            ..CapabilitySet::none()
        }
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Option<Asset>> {
        Box::pin(async move {
            let key = cache_key(ProviderId::Finnhub, "quote", &[req.symbol.as_str()]);
            self.core
                .cached(key, CacheTtl::QUOTE, || self.fetch_quote(&req))
                .await
                .map(Some)
        })
    }

    fn fundamentals<'a>(
        &'a self,
        req: FundamentalsRequest,
    ) -> SourceFuture<'a, Option<Fundamentals>> {
        Box::pin(async move {
            let key = cache_key(ProviderId::Finnhub, "fundamentals", &[req.symbol.as_str()]);
            self.core
                .cached(key, CacheTtl::FUNDAMENTALS, || self.fetch_fundamentals(&req))
                .await
                .map(Some)
        })
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, Vec<NewsItem>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Finnhub,
                "news",
                &[&req.scope.cache_part(), &req.limit.to_string()],
            );
            self.core
                .cached_list(key, CacheTtl::NEWS, || self.fetch_news(&req))
                .await
        })
    }

    fn search<'a>(&'a self, req: SearchRequest) -> SourceFuture<'a, Vec<Instrument>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Finnhub,
                "search",
                &[&req.query, &req.limit.to_string()],
            );
            self.core
                .cached_list(key, CacheTtl::SEARCH, || self.fetch_search(&req))
                .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(rename = "c", default, deserialize_with = "lenient_f64")]
    current: Option<f64>,
    #[serde(rename = "d", default, deserialize_with = "lenient_f64")]
    change: Option<f64>,
    #[serde(rename = "dp", default, deserialize_with = "lenient_f64")]
    change_percent: Option<f64>,
    #[serde(rename = "h", default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(rename = "l", default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(rename = "pc", default, deserialize_with = "lenient_f64")]
    previous_close: Option<f64>,
    #[serde(rename = "t")]
    timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct FinnhubProfile {
    name: Option<String>,
    ticker: Option<String>,
    logo: Option<String>,
    #[serde(rename = "finnhubIndustry")]
    industry: Option<String>,
    #[serde(rename = "marketCapitalization")]
    market_cap_millions: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubMetricResponse {
    metric: Option<FinnhubMetric>,
}

#[derive(Debug, Default, Deserialize)]
struct FinnhubMetric {
    #[serde(rename = "peTTM")]
    pe_ttm: Option<f64>,
    #[serde(rename = "pbAnnual")]
    pb_annual: Option<f64>,
    #[serde(rename = "epsTTM")]
    eps_ttm: Option<f64>,
    #[serde(rename = "dividendYieldIndicatedAnnual")]
    dividend_yield: Option<f64>,
    #[serde(rename = "netProfitMarginTTM")]
    net_margin: Option<f64>,
    #[serde(rename = "operatingMarginTTM")]
    operating_margin: Option<f64>,
    #[serde(rename = "grossMarginTTM")]
    gross_margin: Option<f64>,
    #[serde(rename = "roeTTM")]
    roe: Option<f64>,
    beta: Option<f64>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<f64>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<f64>,
    #[serde(rename = "marketCapitalization")]
    market_cap_millions: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    related: String,
}

#[derive(Debug, Deserialize)]
struct FinnhubSearchResponse {
    #[serde(default)]
    result: Vec<FinnhubSearchItem>,
}

#[derive(Debug, Deserialize)]
struct FinnhubSearchItem {
    description: String,
    symbol: String,
    #[serde(rename = "type", default)]
    kind: String,
}
