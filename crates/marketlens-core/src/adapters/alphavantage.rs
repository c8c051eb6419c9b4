use std::collections::BTreeMap;

use serde::Deserialize;

use crate::adapters::common::{
    invalid_payload, lenient_f64, trim_to_range, AdapterContext, AdapterCore, RawArticle,
};
use crate::cache::{cache_key, CacheTtl};
use crate::data_source::{
    CapabilitySet, DataSource, FundamentalsRequest, HistoryRequest, NewsRequest, NewsScope,
    QuoteRequest, SearchRequest, SourceError, SourceFuture,
};
use crate::http_client::HttpRequest;
use crate::news::sentiment_from_label;
use crate::provider_policy::ProviderPolicy;
use crate::{
    Asset, AssetClass, Fundamentals, HistoryRange, Instrument, NewsItem, PriceHistory,
    PriceHistoryPoint, ProviderId, Symbol, UtcDateTime,
};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage adapter: equity and fund quotes, history, company overview,
/// symbol search and the news sentiment feed.
pub struct AlphaVantageAdapter {
    core: AdapterCore,
    api_key: String,
    base_url: String,
}

impl AlphaVantageAdapter {
    pub fn new(context: &AdapterContext, api_key: impl Into<String>) -> Self {
        Self::with_policy(
            context,
            api_key,
            &ProviderPolicy::default_for(ProviderId::Alphavantage),
        )
    }

    pub fn with_policy(
        context: &AdapterContext,
        api_key: impl Into<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderId::Alphavantage, context, policy),
            api_key: api_key.into(),
            base_url: String::from(BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, function: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!("{}?function={function}", self.base_url);
        for (name, value) in params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url.push_str("&apikey=");
        url.push_str(&urlencoding::encode(&self.api_key));
        url
    }

    /// Alpha Vantage answers 200 for throttling and unknown symbols; the
    /// real outcome is in the body.
    async fn fetch<T>(&self, function: &str, params: &[(&str, &str)]) -> Result<T, SourceError>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self
            .core
            .fetch_body(HttpRequest::get(self.url(function, params)))
            .await?;

        if let Ok(notice) = serde_json::from_str::<AlphaVantageNotice>(&body) {
            if let Some(message) = notice.note.or(notice.information) {
                self.core.queue().mark_rate_limited(None);
                return Err(SourceError::quota_exceeded(format!(
                    "alphavantage throttled the request: {message}"
                )));
            }
            if let Some(message) = notice.error_message {
                return Err(SourceError::not_found(format!(
                    "alphavantage rejected {function}: {message}"
                )));
            }
        }

        serde_json::from_str(&body).map_err(|error| {
            SourceError::malformed(format!("alphavantage {function} payload: {error}"))
        })
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Asset, SourceError> {
        let response: AlphaVantageQuoteResponse = self
            .fetch("GLOBAL_QUOTE", &[("symbol", req.symbol.as_str())])
            .await?;

        let quote = response.quote.filter(|quote| quote.price.is_some()).ok_or_else(|| {
            SourceError::not_found(format!("alphavantage has no quote for {}", req.symbol))
        })?;
        let price = quote.price.unwrap_or_default();

        let mut asset = Asset::new(
            req.symbol.clone(),
            req.symbol.as_str(),
            req.asset_class,
            price,
            ProviderId::Alphavantage,
        )
        .map_err(invalid_payload(ProviderId::Alphavantage))?
        .with_range(quote.high, quote.low)
        .with_volume(quote.volume);

        asset = match (quote.change, quote.change_percent, quote.previous_close) {
            (Some(change), Some(percent), _) => asset.with_change(change, percent),
            (_, _, Some(previous_close)) => asset.with_previous_close(previous_close),
            _ => asset,
        };

        if let Some(day) = quote.latest_trading_day.as_deref() {
            if let Ok(as_of) = UtcDateTime::parse_date(day) {
                asset = asset.with_as_of(as_of);
            }
        }

        asset
            .validated()
            .map_err(invalid_payload(ProviderId::Alphavantage))
    }

    async fn fetch_history(&self, req: &HistoryRequest) -> Result<PriceHistory, SourceError> {
        let (function, interval, outputsize) = match req.range {
            HistoryRange::OneDay => ("TIME_SERIES_INTRADAY", Some("5min"), "compact"),
            HistoryRange::OneWeek => ("TIME_SERIES_INTRADAY", Some("60min"), "full"),
            HistoryRange::OneMonth | HistoryRange::ThreeMonths => {
                ("TIME_SERIES_DAILY", None, "compact")
            }
            HistoryRange::OneYear => ("TIME_SERIES_DAILY", None, "full"),
            HistoryRange::FiveYears => ("TIME_SERIES_WEEKLY", None, "full"),
        };

        let mut params = vec![("symbol", req.symbol.as_str()), ("outputsize", outputsize)];
        if let Some(interval) = interval {
            params.push(("interval", interval));
        }

        let response: BTreeMap<String, serde_json::Value> = self.fetch(function, &params).await?;
        let series = response
            .into_iter()
            .find(|(key, _)| key.contains("Time Series"))
            .map(|(_, value)| value)
            .ok_or_else(|| {
                SourceError::not_found(format!("alphavantage has no history for {}", req.symbol))
            })?;
        let series: BTreeMap<String, AlphaVantageBar> = serde_json::from_value(series)
            .map_err(|error| SourceError::malformed(format!("alphavantage series: {error}")))?;

        // Intraday keys are exchange-local wall time; they are stored as UTC.
        let points = series
            .into_iter()
            .filter_map(|(timestamp, bar)| {
                let timestamp = UtcDateTime::parse_naive(&timestamp)
                    .or_else(|_| UtcDateTime::parse_date(&timestamp))
                    .ok()?;
                PriceHistoryPoint::new(timestamp.unix_millis(), bar.close?, bar.volume).ok()
            })
            .collect::<Vec<_>>();

        let points = trim_to_range(points, req.range);
        if points.is_empty() {
            return Err(SourceError::not_found(format!(
                "alphavantage returned an empty series for {}",
                req.symbol
            )));
        }

        Ok(PriceHistory::new(
            req.symbol.clone(),
            req.range,
            ProviderId::Alphavantage,
            points,
        ))
    }

    async fn fetch_fundamentals(
        &self,
        req: &FundamentalsRequest,
    ) -> Result<Fundamentals, SourceError> {
        let overview: AlphaVantageOverview = self
            .fetch("OVERVIEW", &[("symbol", req.symbol.as_str())])
            .await?;

        if overview.symbol.is_none() {
            return Err(SourceError::not_found(format!(
                "alphavantage has no overview for {}",
                req.symbol
            )));
        }

        let revenue = overview.revenue_ttm;
        let fundamentals = Fundamentals {
            name: overview.name.filter(|value| !value.is_empty()),
            description: overview.description.filter(|value| !value.is_empty()),
            sector: overview.sector.filter(|value| !value.is_empty()),
            industry: overview.industry.filter(|value| !value.is_empty()),
            market_cap: overview.market_cap,
            pe_ratio: overview.pe_ratio,
            forward_pe: overview.forward_pe,
            peg_ratio: overview.peg_ratio,
            price_to_book: overview.price_to_book,
            eps: overview.eps,
            dividend_yield: overview.dividend_yield,
            profit_margin: overview.profit_margin,
            operating_margin: overview.operating_margin,
            gross_margin: match (overview.gross_profit_ttm, revenue) {
                (Some(gross), Some(revenue)) if revenue > 0.0 => Some(gross / revenue),
                _ => None,
            },
            return_on_equity: overview.return_on_equity,
            revenue_ttm: revenue,
            beta: overview.beta,
            week_52_high: overview.week_52_high,
            week_52_low: overview.week_52_low,
            ..Fundamentals::new(req.symbol.clone(), ProviderId::Alphavantage)
        }
        .sanitized();

        Ok(fundamentals)
    }

    async fn fetch_search(&self, req: &SearchRequest) -> Result<Vec<Instrument>, SourceError> {
        let response: AlphaVantageSearchResponse = self
            .fetch("SYMBOL_SEARCH", &[("keywords", req.query.as_str())])
            .await?;

        Ok(response
            .best_matches
            .into_iter()
            .filter_map(|item| {
                let symbol = Symbol::parse(&item.symbol).ok()?;
                let asset_class = match item.kind.as_str() {
                    "ETF" | "Mutual Fund" => AssetClass::Fund,
                    _ => AssetClass::Stock,
                };
                Instrument::new(
                    symbol,
                    item.name,
                    asset_class,
                    item.region,
                    item.currency.as_deref().unwrap_or("USD"),
                    ProviderId::Alphavantage,
                )
                .ok()
            })
            .take(req.limit)
            .collect())
    }

    async fn fetch_news(&self, req: &NewsRequest) -> Result<Vec<NewsItem>, SourceError> {
        let limit = req.limit.clamp(1, 1_000).to_string();
        let mut params = vec![("limit", limit.as_str()), ("sort", "LATEST")];
        match &req.scope {
            NewsScope::General => params.push(("topics", "financial_markets")),
            NewsScope::Crypto => params.push(("topics", "blockchain")),
            NewsScope::Company(symbol) => params.push(("tickers", symbol.as_str())),
        }

        let response: AlphaVantageNewsResponse = self.fetch("NEWS_SENTIMENT", &params).await?;

        Ok(response
            .feed
            .into_iter()
            .filter_map(|article| {
                let published_at = UtcDateTime::parse_compact(&article.time_published).ok()?;
                RawArticle {
                    title: article.title,
                    summary: article.summary.unwrap_or_default(),
                    source: article.source.unwrap_or_default(),
                    url: article.url,
                    published_at,
                    sentiment: article
                        .overall_sentiment_label
                        .as_deref()
                        .and_then(sentiment_from_label),
                    related_assets: article
                        .ticker_sentiment
                        .into_iter()
                        .filter_map(|ticker| {
                            let raw = ticker.ticker;
                            let raw = raw.strip_prefix("CRYPTO:").unwrap_or(&raw);
                            Symbol::parse(raw).ok()
                        })
                        .collect(),
                }
                .into_item(ProviderId::Alphavantage)
            })
            .take(req.limit)
            .collect())
    }
}

impl DataSource for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            quote: true,
            history: true,
            fundamentals: true,
            news: true,
            search: true,
            ..CapabilitySet::none()
        }
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Option<Asset>> {
        Box::pin(async move {
            let key = cache_key(ProviderId::Alphavantage, "quote", &[req.symbol.as_str()]);
            self.core
                .cached(key, CacheTtl::QUOTE, || self.fetch_quote(&req))
                .await
                .map(Some)
        })
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Option<PriceHistory>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Alphavantage,
                "history",
                &[req.symbol.as_str(), req.range.as_str()],
            );
            self.core
                .cached(key, CacheTtl::history(req.range), || self.fetch_history(&req))
                .await
                .map(Some)
        })
    }

    fn fundamentals<'a>(
        &'a self,
        req: FundamentalsRequest,
    ) -> SourceFuture<'a, Option<Fundamentals>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Alphavantage,
                "fundamentals",
                &[req.symbol.as_str()],
            );
            self.core
                .cached(key, CacheTtl::FUNDAMENTALS, || self.fetch_fundamentals(&req))
                .await
                .map(Some)
        })
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, Vec<NewsItem>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Alphavantage,
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
                ProviderId::Alphavantage,
                "search",
                &[&req.query, &req.limit.to_string()],
            );
            self.core
                .cached_list(key, CacheTtl::SEARCH, || self.fetch_search(&req))
                .await
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct AlphaVantageNotice {
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageQuoteResponse {
    #[serde(rename = "Global Quote")]
    quote: Option<AlphaVantageQuote>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageQuote {
    #[serde(rename = "03. high", default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(rename = "04. low", default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(rename = "05. price", default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
    #[serde(rename = "06. volume", default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close", default, deserialize_with = "lenient_f64")]
    previous_close: Option<f64>,
    #[serde(rename = "09. change", default, deserialize_with = "lenient_f64")]
    change: Option<f64>,
    #[serde(rename = "10. change percent", default, deserialize_with = "lenient_f64")]
    change_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageBar {
    #[serde(rename = "4. close", default, deserialize_with = "lenient_f64")]
    close: Option<f64>,
    #[serde(rename = "5. volume", default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AlphaVantageOverview {
    symbol: Option<String>,
    name: Option<String>,
    description: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    #[serde(rename = "MarketCapitalization", default, deserialize_with = "lenient_f64")]
    market_cap: Option<f64>,
    #[serde(rename = "PERatio", default, deserialize_with = "lenient_f64")]
    pe_ratio: Option<f64>,
    #[serde(rename = "ForwardPE", default, deserialize_with = "lenient_f64")]
    forward_pe: Option<f64>,
    #[serde(rename = "PEGRatio", default, deserialize_with = "lenient_f64")]
    peg_ratio: Option<f64>,
    #[serde(rename = "PriceToBookRatio", default, deserialize_with = "lenient_f64")]
    price_to_book: Option<f64>,
    #[serde(rename = "EPS", default, deserialize_with = "lenient_f64")]
    eps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    dividend_yield: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    profit_margin: Option<f64>,
    #[serde(rename = "OperatingMarginTTM", default, deserialize_with = "lenient_f64")]
    operating_margin: Option<f64>,
    #[serde(rename = "GrossProfitTTM", default, deserialize_with = "lenient_f64")]
    gross_profit_ttm: Option<f64>,
    #[serde(rename = "ReturnOnEquityTTM", default, deserialize_with = "lenient_f64")]
    return_on_equity: Option<f64>,
    #[serde(rename = "RevenueTTM", default, deserialize_with = "lenient_f64")]
    revenue_ttm: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    beta: Option<f64>,
    #[serde(rename = "52WeekHigh", default, deserialize_with = "lenient_f64")]
    week_52_high: Option<f64>,
    #[serde(rename = "52WeekLow", default, deserialize_with = "lenient_f64")]
    week_52_low: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageSearchResponse {
    #[serde(rename = "bestMatches", default)]
    best_matches: Vec<AlphaVantageSearchMatch>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageSearchMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
    #[serde(rename = "3. type", default)]
    kind: String,
    #[serde(rename = "4. region")]
    region: Option<String>,
    #[serde(rename = "8. currency")]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageNewsResponse {
    #[serde(default)]
    feed: Vec<AlphaVantageArticle>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageArticle {
    title: String,
    url: String,
    time_published: String,
    summary: Option<String>,
    source: Option<String>,
    overall_sentiment_label: Option<String>,
    #[serde(default)]
    ticker_sentiment: Vec<AlphaVantageTicker>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageTicker {
    ticker: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::CacheStore;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::ScriptedHttpClient;
    use crate::provider_policy::LongWindowQuota;
    use crate::Sentiment;

    const GLOBAL_QUOTE: &str = r#"{
        "Global Quote": {
            "01. symbol": "IBM",
            "03. high": "171.00",
            "04. low": "168.10",
            "05. price": "170.50",
            "06. volume": "3500000",
            "07. latest trading day": "2026-04-17",
            "08. previous close": "169.00",
            "09. change": "1.50",
            "10. change percent": "0.8876%"
        }
    }"#;

    fn adapter(client: ScriptedHttpClient) -> (Arc<ScriptedHttpClient>, AlphaVantageAdapter) {
        let client = Arc::new(client);
        let context = AdapterContext::new(client.clone(), CacheStore::with_default_ttl());
        let adapter = AlphaVantageAdapter::with_policy(
            &context,
            "key-123",
            &ProviderPolicy::unthrottled(ProviderId::Alphavantage),
        );
        (client, adapter)
    }

    #[tokio::test]
    async fn quote_normalizes_global_quote() {
        let (client, adapter) =
            adapter(ScriptedHttpClient::new().with_json("function=GLOBAL_QUOTE", GLOBAL_QUOTE));
        let req = QuoteRequest::new(Symbol::canonical("ibm"), AssetClass::Stock).expect("req");

        let asset = adapter.quote(req).await.expect("quote").expect("present");
        assert_eq!(asset.symbol.as_str(), "IBM");
        assert_eq!(asset.price, 170.50);
        assert_eq!(asset.change_24h, 1.50);
        assert_eq!(asset.high_24h, Some(171.0));
        assert_eq!(asset.source, ProviderId::Alphavantage);

        let url = &client.recorded_requests()[0].url;
        assert!(url.contains("symbol=IBM"));
        assert!(url.contains("apikey=key-123"));
    }

    #[tokio::test]
    async fn throttle_note_maps_to_quota_exceeded_and_spends_the_day() {
        let client = Arc::new(ScriptedHttpClient::new().with_json(
            "function=GLOBAL_QUOTE",
            r#"{"Note":"Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."}"#,
        ));
        let context = AdapterContext::new(client.clone(), CacheStore::with_default_ttl());
        let adapter = AlphaVantageAdapter::with_policy(
            &context,
            "key-123",
            &ProviderPolicy::unthrottled(ProviderId::Alphavantage)
                .with_quota(Some(LongWindowQuota::daily(25))),
        );
        let req = QuoteRequest::new(Symbol::canonical("IBM"), AssetClass::Stock).expect("req");

        let err = adapter.quote(req.clone()).await.expect_err("throttled");
        assert_eq!(err.kind(), SourceErrorKind::QuotaExceeded);
        assert_eq!(adapter.core.queue().quota_remaining(), Some(0));

        let err = adapter.quote(req).await.expect_err("still throttled");
        assert_eq!(err.kind(), SourceErrorKind::QuotaExceeded);
        assert_eq!(client.request_count("GLOBAL_QUOTE"), 1);
    }

    #[tokio::test]
    async fn empty_quote_is_not_found() {
        let (_, adapter) = adapter(
            ScriptedHttpClient::new().with_json("function=GLOBAL_QUOTE", r#"{"Global Quote":{}}"#),
        );
        let req = QuoteRequest::new(Symbol::canonical("NOPE"), AssetClass::Stock).expect("req");

        let err = adapter.quote(req).await.expect_err("unknown");
        assert_eq!(err.kind(), SourceErrorKind::NotFound);
    }

    #[tokio::test]
    async fn daily_history_is_ascending_and_cached() {
        let body = r#"{
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (Daily)": {
                "2026-04-16": {"1. open":"1","2. high":"1","3. low":"1","4. close":"168.0","5. volume":"10"},
                "2026-04-17": {"1. open":"1","2. high":"1","3. low":"1","4. close":"170.5","5. volume":"12"},
                "2026-04-15": {"1. open":"1","2. high":"1","3. low":"1","4. close":"166.0","5. volume":"9"}
            }
        }"#;
        let (client, adapter) =
            adapter(ScriptedHttpClient::new().with_json("function=TIME_SERIES_DAILY", body));
        let req = HistoryRequest::new(
            Symbol::canonical("IBM"),
            AssetClass::Stock,
            HistoryRange::OneMonth,
        )
        .expect("req");

        let history = adapter
            .history(req.clone())
            .await
            .expect("history")
            .expect("present");
        let prices = history.points.iter().map(|p| p.price).collect::<Vec<_>>();
        assert_eq!(prices, vec![166.0, 168.0, 170.5]);

        adapter.history(req).await.expect("cached").expect("present");
        assert_eq!(client.request_count("TIME_SERIES_DAILY"), 1);
    }

    #[tokio::test]
    async fn news_feed_uses_provider_labels() {
        let body = r#"{
            "feed": [{
                "title": "IBM expands quantum program",
                "url": "https://news.test/ibm",
                "time_published": "20260417T133000",
                "summary": "Details inside.",
                "source": "Wire",
                "overall_sentiment_label": "Somewhat-Bullish",
                "ticker_sentiment": [{"ticker": "IBM"}, {"ticker": "CRYPTO:BTC"}]
            }]
        }"#;
        let (_, adapter) =
            adapter(ScriptedHttpClient::new().with_json("function=NEWS_SENTIMENT", body));
        let req = NewsRequest::new(NewsScope::Company(Symbol::canonical("IBM")), 5).expect("req");

        let items = adapter.news(req).await.expect("news");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sentiment, Sentiment::Positive);
        assert_eq!(
            items[0].related_assets,
            vec![Symbol::canonical("IBM"), Symbol::canonical("BTC")]
        );
    }
}
