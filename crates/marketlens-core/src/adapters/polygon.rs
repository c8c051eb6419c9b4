use serde::Deserialize;

use crate::adapters::common::{invalid_payload, AdapterContext, AdapterCore, RawArticle};
use crate::cache::{cache_key, CacheTtl};
use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, NewsRequest, NewsScope, QuoteRequest, SourceError,
    SourceFuture,
};
use crate::http_client::{HttpAuth, HttpRequest};
use crate::news::sentiment_from_label;
use crate::provider_policy::ProviderPolicy;
use crate::{
    Asset, AssetClass, NewsItem, PriceHistory, PriceHistoryPoint, ProviderId, Resolution, Symbol,
    UtcDateTime,
};

const BASE_URL: &str = "https://api.polygon.io";
const AGGREGATES_LIMIT: u32 = 50_000;

/// Polygon.io adapter: previous-session quotes, aggregate bars for stocks,
/// funds and crypto pairs, and the reference news feed.
pub struct PolygonAdapter {
    core: AdapterCore,
    auth: HttpAuth,
    base_url: String,
}

impl PolygonAdapter {
    pub fn new(context: &AdapterContext, api_key: impl Into<String>) -> Self {
        Self::with_policy(
            context,
            api_key,
            &ProviderPolicy::default_for(ProviderId::Polygon),
        )
    }

    pub fn with_policy(
        context: &AdapterContext,
        api_key: impl Into<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderId::Polygon, context, policy),
            auth: HttpAuth::BearerToken(api_key.into()),
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

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Asset, SourceError> {
        let ticker = polygon_ticker(&req.symbol, req.asset_class);
        let response: PolygonAggregatesResponse = self
            .core
            .fetch_json(self.request(&format!(
                "/v2/aggs/ticker/{}/prev?adjusted=true",
                urlencoding::encode(&ticker)
            )))
            .await?;

        let bar = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| {
                SourceError::not_found(format!("polygon has no previous session for {ticker}"))
            })?;

        let mut asset = Asset::new(
            req.symbol.clone(),
            req.symbol.as_str(),
            req.asset_class,
            bar.close,
            ProviderId::Polygon,
        )
        .map_err(invalid_payload(ProviderId::Polygon))?
        .with_range(bar.high, bar.low)
        .with_volume(bar.volume);

        // Session change: close against open of the same bar.
        if let Some(open) = bar.open {
            asset = asset.with_previous_close(open);
        }
        if let Ok(as_of) = UtcDateTime::from_unix_millis(bar.timestamp) {
            asset = asset.with_as_of(as_of);
        }

        asset.validated().map_err(invalid_payload(ProviderId::Polygon))
    }

    async fn fetch_history(&self, req: &HistoryRequest) -> Result<PriceHistory, SourceError> {
        let ticker = polygon_ticker(&req.symbol, req.asset_class);
        let (multiplier, timespan) = match req.range.resolution() {
            Resolution::FiveMinutes => (5, "minute"),
            Resolution::OneHour => (1, "hour"),
            Resolution::OneDay => (1, "day"),
            Resolution::OneWeek => (1, "week"),
        };
        let to = UtcDateTime::now();
        let from = UtcDateTime::from_offset_datetime(to.into_inner() - req.range.lookback())
            .unwrap_or(to);

        let response: PolygonAggregatesResponse = self
            .core
            .fetch_json(self.request(&format!(
                "/v2/aggs/ticker/{}/range/{multiplier}/{timespan}/{}/{}?adjusted=true&sort=asc&limit={AGGREGATES_LIMIT}",
                urlencoding::encode(&ticker),
                from.date_string(),
                to.date_string()
            )))
            .await?;

        let points = response
            .results
            .into_iter()
            .filter_map(|bar| PriceHistoryPoint::new(bar.timestamp, bar.close, bar.volume).ok())
            .collect::<Vec<_>>();

        if points.is_empty() {
            return Err(SourceError::not_found(format!(
                "polygon returned no bars for {ticker}"
            )));
        }

        Ok(PriceHistory::new(
            req.symbol.clone(),
            req.range,
            ProviderId::Polygon,
            points,
        ))
    }

    async fn fetch_news(&self, req: &NewsRequest) -> Result<Vec<NewsItem>, SourceError> {
        let limit = req.limit.clamp(1, 1_000);
        let ticker = match &req.scope {
            NewsScope::General => None,
            NewsScope::Company(symbol) => Some(symbol.as_str().to_owned()),
            NewsScope::Crypto => Some(String::from("X:BTCUSD")),
        };

        let mut path = format!("/v2/reference/news?order=desc&sort=published_utc&limit={limit}");
        if let Some(ticker) = ticker.as_deref() {
            path.push_str("&ticker=");
            path.push_str(&urlencoding::encode(ticker));
        }

        let response: PolygonNewsResponse = self.core.fetch_json(self.request(&path)).await?;

        Ok(response
            .results
            .into_iter()
            .filter_map(|article| {
                let published_at = UtcDateTime::parse(&article.published_utc).ok()?;
                let sentiment = article
                    .insights
                    .iter()
                    .find(|insight| Some(insight.ticker.as_str()) == ticker.as_deref())
                    .or_else(|| article.insights.first())
                    .and_then(|insight| sentiment_from_label(&insight.sentiment));
                RawArticle {
                    title: article.title,
                    summary: article.description.unwrap_or_default(),
                    source: article.publisher.map(|p| p.name).unwrap_or_default(),
                    url: article.article_url,
                    published_at,
                    sentiment,
                    related_assets: article
                        .tickers
                        .iter()
                        .filter_map(|raw| Symbol::parse(symbol_from_ticker(raw)).ok())
                        .collect(),
                }
                .into_item(ProviderId::Polygon)
            })
            .take(req.limit)
            .collect())
    }
}

impl DataSource for PolygonAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Polygon
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            quote: true,
            history: true,
            news: true,
            ..CapabilitySet::none()
        }
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Option<Asset>> {
        Box::pin(async move {
            let key = cache_key(ProviderId::Polygon, "quote", &[req.symbol.as_str()]);
            self.core
                .cached(key, CacheTtl::QUOTE, || self.fetch_quote(&req))
                .await
                .map(Some)
        })
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Option<PriceHistory>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Polygon,
                "history",
                &[req.symbol.as_str(), req.range.as_str()],
            );
            self.core
                .cached(key, CacheTtl::history(req.range), || self.fetch_history(&req))
                .await
                .map(Some)
        })
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, Vec<NewsItem>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Polygon,
                "news",
                &[&req.scope.cache_part(), &req.limit.to_string()],
            );
            self.core
                .cached_list(key, CacheTtl::NEWS, || self.fetch_news(&req))
                .await
        })
    }
}

/// Caret-style index names whose Polygon ticker differs from the bare name.
const INDEX_ALIASES: &[(&str, &str)] = &[
    ("GSPC", "SPX"),
    ("IXIC", "COMP"),
    ("DJI", "DJI"),
    ("NDX", "NDX"),
    ("RUT", "RUT"),
    ("VIX", "VIX"),
];

/// Polygon names crypto pairs `X:<BASE>USD` and indices `I:<NAME>`;
/// everything else uses the plain ticker.
fn polygon_ticker(symbol: &Symbol, asset_class: AssetClass) -> String {
    match asset_class {
        AssetClass::Crypto => format!("X:{symbol}USD"),
        AssetClass::Stock | AssetClass::Fund => match symbol.as_str().strip_prefix('^') {
            Some(index) => {
                let name = INDEX_ALIASES
                    .iter()
                    .find(|(caret, _)| *caret == index)
                    .map_or(index, |(_, polygon)| *polygon);
                format!("I:{name}")
            }
            None => symbol.as_str().to_owned(),
        },
    }
}

fn symbol_from_ticker(ticker: &str) -> &str {
    ticker
        .strip_prefix("X:")
        .and_then(|pair| pair.strip_suffix("USD"))
        .unwrap_or(ticker)
}

#[derive(Debug, Deserialize)]
struct PolygonAggregatesResponse {
    #[serde(default)]
    results: Vec<PolygonBar>,
}

#[derive(Debug, Deserialize)]
struct PolygonBar {
    #[serde(rename = "o")]
    open: Option<f64>,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "h")]
    high: Option<f64>,
    #[serde(rename = "l")]
    low: Option<f64>,
    #[serde(rename = "v")]
    volume: Option<f64>,
    #[serde(rename = "t")]
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct PolygonNewsResponse {
    #[serde(default)]
    results: Vec<PolygonArticle>,
}

#[derive(Debug, Deserialize)]
struct PolygonArticle {
    title: String,
    article_url: String,
    published_utc: String,
    description: Option<String>,
    publisher: Option<PolygonPublisher>,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    insights: Vec<PolygonInsight>,
}

#[derive(Debug, Deserialize)]
struct PolygonPublisher {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PolygonInsight {
    ticker: String,
    sentiment: String,
}
