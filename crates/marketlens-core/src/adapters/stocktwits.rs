use serde::Deserialize;

use crate::adapters::common::{AdapterContext, AdapterCore, RawArticle};
use crate::cache::{cache_key, CacheTtl};
use crate::classifier::crypto_listing;
use crate::data_source::{CapabilitySet, DataSource, NewsRequest, NewsScope, SourceError, SourceFuture};
use crate::http_client::HttpRequest;
use crate::news::sentiment_from_label;
use crate::provider_policy::ProviderPolicy;
use crate::{NewsItem, ProviderId, Sentiment, Symbol, UtcDateTime};

const BASE_URL: &str = "https://api.stocktwits.com/api/2";
const WEB_URL: &str = "https://stocktwits.com";
const TITLE_CHARS: usize = 120;

/// StockTwits adapter: social message streams surfaced as news items with
/// the poster's Bullish/Bearish tag as sentiment.
pub struct StockTwitsAdapter {
    core: AdapterCore,
    base_url: String,
}

impl StockTwitsAdapter {
    pub fn new(context: &AdapterContext) -> Self {
        Self::with_policy(context, &ProviderPolicy::default_for(ProviderId::Stocktwits))
    }

    pub fn with_policy(context: &AdapterContext, policy: &ProviderPolicy) -> Self {
        Self {
            core: AdapterCore::new(ProviderId::Stocktwits, context, policy),
            base_url: String::from(BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_stream(&self, req: &NewsRequest) -> Result<Vec<NewsItem>, SourceError> {
        let path = match &req.scope {
            NewsScope::General => String::from("/streams/trending.json"),
            NewsScope::Crypto => String::from("/streams/symbol/BTC.X.json"),
            NewsScope::Company(symbol) => format!(
                "/streams/symbol/{}.json",
                urlencoding::encode(&stream_symbol(symbol))
            ),
        };

        let stream: StockTwitsStream = self
            .core
            .fetch_json(HttpRequest::get(format!("{}{path}", self.base_url)))
            .await?;

        Ok(stream
            .messages
            .into_iter()
            .filter_map(|message| {
                let published_at = UtcDateTime::parse(&message.created_at).ok()?;
                let body = message.body.trim().to_owned();
                let sentiment = message
                    .entities
                    .and_then(|entities| entities.sentiment)
                    .and_then(|sentiment| sentiment.basic)
                    .and_then(|label| sentiment_from_label(&label))
                    .unwrap_or(Sentiment::Neutral);
                let username = message
                    .user
                    .map(|user| user.username)
                    .unwrap_or_default();

                RawArticle {
                    title: body.chars().take(TITLE_CHARS).collect(),
                    summary: body,
                    source: format!("StockTwits @{username}"),
                    url: format!("{WEB_URL}/{username}/message/{}", message.id),
                    published_at,
                    sentiment: Some(sentiment),
                    related_assets: message
                        .symbols
                        .iter()
                        .filter_map(|tagged| {
                            let raw = tagged.symbol.strip_suffix(".X").unwrap_or(&tagged.symbol);
                            Symbol::parse(raw).ok()
                        })
                        .collect(),
                }
                .into_item(ProviderId::Stocktwits)
            })
            .take(req.limit)
            .collect())
    }
}

impl DataSource for StockTwitsAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Stocktwits
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            news: true,
            ..CapabilitySet::none()
        }
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, Vec<NewsItem>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Stocktwits,
                "news",
                &[&req.scope.cache_part(), &req.limit.to_string()],
            );
            self.core
                .cached_list(key, CacheTtl::NEWS, || self.fetch_stream(&req))
                .await
        })
    }
}

/// StockTwits tags crypto streams with a `.X` suffix (`BTC.X`).
fn stream_symbol(symbol: &Symbol) -> String {
    match crypto_listing(symbol.as_str()) {
        Some(listing) => format!("{}.X", listing.symbol),
        None => symbol.as_str().to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct StockTwitsStream {
    #[serde(default)]
    messages: Vec<StockTwitsMessage>,
}

#[derive(Debug, Deserialize)]
struct StockTwitsMessage {
    id: u64,
    #[serde(default)]
    body: String,
    created_at: String,
    user: Option<StockTwitsUser>,
    entities: Option<StockTwitsEntities>,
    #[serde(default)]
    symbols: Vec<StockTwitsSymbol>,
}

#[derive(Debug, Deserialize)]
struct StockTwitsUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct StockTwitsEntities {
    sentiment: Option<StockTwitsSentiment>,
}

#[derive(Debug, Deserialize)]
struct StockTwitsSentiment {
    basic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockTwitsSymbol {
    symbol: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::CacheStore;
    use crate::http_client::ScriptedHttpClient;

    const STREAM: &str = r#"{
        "symbol": {"symbol": "BTC.X", "title": "Bitcoin"},
        "messages": [
            {"id": 101, "body": "$BTC.X breaking out", "created_at": "2026-04-17T12:00:00Z",
             "user": {"username": "trader1"},
             "entities": {"sentiment": {"basic": "Bullish"}},
             "symbols": [{"symbol": "BTC.X"}]},
            {"id": 102, "body": "watching the range", "created_at": "2026-04-17T11:00:00Z",
             "user": {"username": "trader2"},
             "entities": {"sentiment": null},
             "symbols": [{"symbol": "BTC.X"}]}
        ]
    }"#;

    fn adapter(client: ScriptedHttpClient) -> (Arc<ScriptedHttpClient>, StockTwitsAdapter) {
        let client = Arc::new(client);
        let context = AdapterContext::new(client.clone(), CacheStore::with_default_ttl());
        let adapter = StockTwitsAdapter::with_policy(
            &context,
            &ProviderPolicy::unthrottled(ProviderId::Stocktwits),
        );
        (client, adapter)
    }

    #[tokio::test]
    async fn crypto_symbol_stream_uses_x_suffix_and_poster_sentiment() {
        let (client, adapter) =
            adapter(ScriptedHttpClient::new().with_json("/streams/symbol/BTC.X.json", STREAM));
        let req = NewsRequest::new(NewsScope::Company(Symbol::canonical("BTC")), 10).expect("req");

        let items = adapter.news(req).await.expect("stream");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sentiment, Sentiment::Positive);
        assert_eq!(items[1].sentiment, Sentiment::Neutral);
        assert_eq!(items[0].url, "https://stocktwits.com/trader1/message/101");
        assert_eq!(items[0].related_assets, vec![Symbol::canonical("BTC")]);
        assert_eq!(client.request_count("BTC.X.json"), 1);
    }

    #[test]
    fn equities_keep_plain_ticker() {
        assert_eq!(stream_symbol(&Symbol::canonical("AAPL")), "AAPL");
        assert_eq!(stream_symbol(&Symbol::canonical("eth")), "ETH.X");
    }
}
