use serde::Deserialize;

use crate::adapters::common::{invalid_payload, AdapterContext, AdapterCore};
use crate::cache::{cache_key, CacheTtl};
use crate::classifier::{crypto_listing, CryptoListing};
use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, QuoteRequest, SearchRequest, SourceError,
    SourceFuture,
};
use crate::http_client::{HttpAuth, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{
    Asset, AssetClass, Instrument, PriceHistory, PriceHistoryPoint, ProviderId, Symbol,
    UtcDateTime,
};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko adapter for allow-listed crypto assets: market quotes, market
/// charts and coin search. Works without a key; a demo key raises the limits.
pub struct CoinGeckoAdapter {
    core: AdapterCore,
    auth: HttpAuth,
    base_url: String,
}

impl CoinGeckoAdapter {
    pub fn new(context: &AdapterContext, api_key: Option<String>) -> Self {
        Self::with_policy(
            context,
            api_key,
            &ProviderPolicy::default_for(ProviderId::Coingecko),
        )
    }

    pub fn with_policy(
        context: &AdapterContext,
        api_key: Option<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        let auth = match api_key {
            Some(value) => HttpAuth::Header {
                name: String::from("x-cg-demo-api-key"),
                value,
            },
            None => HttpAuth::None,
        };
        Self {
            core: AdapterCore::new(ProviderId::Coingecko, context, policy),
            auth,
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

    fn listing(symbol: &Symbol) -> Result<&'static CryptoListing, SourceError> {
        crypto_listing(symbol.as_str()).ok_or_else(|| {
            SourceError::not_found(format!("{symbol} is not a listed crypto asset"))
        })
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Asset, SourceError> {
        let listing = Self::listing(&req.symbol)?;
        let markets: Vec<CoinGeckoMarket> = self
            .core
            .fetch_json(self.request(&format!(
                "/coins/markets?vs_currency=usd&ids={}",
                urlencoding::encode(listing.coin_id)
            )))
            .await?;

        let market = markets
            .into_iter()
            .find(|market| market.id == listing.coin_id)
            .ok_or_else(|| {
                SourceError::not_found(format!("coingecko has no market for {}", listing.coin_id))
            })?;
        let price = market.current_price.ok_or_else(|| {
            SourceError::not_found(format!("coingecko has no price for {}", listing.coin_id))
        })?;

        let mut asset = Asset::new(
            req.symbol.clone(),
            market.name.unwrap_or_else(|| listing.name.to_owned()),
            AssetClass::Crypto,
            price,
            ProviderId::Coingecko,
        )
        .map_err(invalid_payload(ProviderId::Coingecko))?
        .with_change(
            market.price_change_24h.unwrap_or_default(),
            market.price_change_percentage_24h.unwrap_or_default(),
        )
        .with_range(market.high_24h, market.low_24h)
        .with_market_cap(market.market_cap)
        .with_volume(market.total_volume)
        .with_logo(market.image);

        if let Some(updated) = market.last_updated.as_deref() {
            if let Ok(as_of) = UtcDateTime::parse(updated) {
                asset = asset.with_as_of(as_of);
            }
        }

        asset
            .validated()
            .map_err(invalid_payload(ProviderId::Coingecko))
    }

    async fn fetch_history(&self, req: &HistoryRequest) -> Result<PriceHistory, SourceError> {
        let listing = Self::listing(&req.symbol)?;
        let chart: CoinGeckoChart = self
            .core
            .fetch_json(self.request(&format!(
                "/coins/{}/market_chart?vs_currency=usd&days={}",
                urlencoding::encode(listing.coin_id),
                req.range.days()
            )))
            .await?;

        let points = chart
            .prices
            .iter()
            .filter_map(|&(timestamp, price)| {
                let timestamp = timestamp as i64;
                let volume = chart
                    .total_volumes
                    .iter()
                    .find(|(at, _)| *at as i64 == timestamp)
                    .map(|(_, volume)| *volume);
                PriceHistoryPoint::new(timestamp, price, volume).ok()
            })
            .collect::<Vec<_>>();

        if points.is_empty() {
            return Err(SourceError::not_found(format!(
                "coingecko returned an empty chart for {}",
                listing.coin_id
            )));
        }

        Ok(PriceHistory::new(
            req.symbol.clone(),
            req.range,
            ProviderId::Coingecko,
            points,
        ))
    }

    async fn fetch_search(&self, req: &SearchRequest) -> Result<Vec<Instrument>, SourceError> {
        let response: CoinGeckoSearch = self
            .core
            .fetch_json(self.request(&format!(
                "/search?query={}",
                urlencoding::encode(&req.query)
            )))
            .await?;

        Ok(response
            .coins
            .into_iter()
            .filter_map(|coin| {
                Instrument::new(
                    Symbol::parse(&coin.symbol).ok()?,
                    coin.name,
                    AssetClass::Crypto,
                    None,
                    "USD",
                    ProviderId::Coingecko,
                )
                .ok()
            })
            .take(req.limit)
            .collect())
    }
}

impl DataSource for CoinGeckoAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Coingecko
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            quote: true,
            history: true,
            search: true,
            ..CapabilitySet::none()
        }
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Option<Asset>> {
        Box::pin(async move {
            let key = cache_key(ProviderId::Coingecko, "quote", &[req.symbol.as_str()]);
            self.core
                .cached(key, CacheTtl::QUOTE, || self.fetch_quote(&req))
                .await
                .map(Some)
        })
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Option<PriceHistory>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Coingecko,
                "history",
                &[req.symbol.as_str(), req.range.as_str()],
            );
            self.core
                .cached(key, CacheTtl::history(req.range), || self.fetch_history(&req))
                .await
                .map(Some)
        })
    }

    fn search<'a>(&'a self, req: SearchRequest) -> SourceFuture<'a, Vec<Instrument>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Coingecko,
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
struct CoinGeckoMarket {
    id: String,
    name: Option<String>,
    image: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    high_24h: Option<f64>,
    low_24h: Option<f64>,
    price_change_24h: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoChart {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
    #[serde(default)]
    total_volumes: Vec<(f64, f64)>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoSearch {
    #[serde(default)]
    coins: Vec<CoinGeckoCoin>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoCoin {
    name: String,
    symbol: String,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::CacheStore;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::ScriptedHttpClient;
    use crate::HistoryRange;

    fn adapter(
        client: ScriptedHttpClient,
        api_key: Option<&str>,
    ) -> (Arc<ScriptedHttpClient>, CoinGeckoAdapter) {
        let client = Arc::new(client);
        let context = AdapterContext::new(client.clone(), CacheStore::with_default_ttl());
        let adapter = CoinGeckoAdapter::with_policy(
            &context,
            api_key.map(str::to_owned),
            &ProviderPolicy::unthrottled(ProviderId::Coingecko),
        );
        (client, adapter)
    }

    #[tokio::test]
    async fn quote_resolves_coin_id_from_listing() {
        let (client, adapter) = adapter(
            ScriptedHttpClient::new().with_json(
                "/coins/markets",
                r#"[{"id":"bitcoin","symbol":"btc","name":"Bitcoin","image":"https://img.test/btc.png",
                    "current_price":65000.5,"market_cap":1.28e12,"total_volume":3.1e10,
                    "high_24h":66000,"low_24h":64000,"price_change_24h":-500.25,
                    "price_change_percentage_24h":-0.76,"last_updated":"2026-04-17T12:00:00.000Z"}]"#,
            ),
            Some("demo-key"),
        );
        let req = QuoteRequest::new(Symbol::canonical("BTC"), AssetClass::Crypto).expect("req");

        let asset = adapter.quote(req).await.expect("ok").expect("present");
        assert_eq!(asset.name, "Bitcoin");
        assert_eq!(asset.asset_class, AssetClass::Crypto);
        assert_eq!(asset.change_24h, -500.25);
        assert_eq!(asset.market_cap, Some(1.28e12));

        let request = &client.recorded_requests()[0];
        assert!(request.url.contains("ids=bitcoin"));
        assert_eq!(
            request.headers.get("x-cg-demo-api-key").map(String::as_str),
            Some("demo-key")
        );
    }

    #[tokio::test]
    async fn unlisted_symbol_is_not_found_without_a_request() {
        let (client, adapter) = adapter(ScriptedHttpClient::new(), None);
        let req = QuoteRequest::new(Symbol::canonical("NOTACOIN"), AssetClass::Crypto).expect("req");

        let err = adapter.quote(req).await.expect_err("unlisted");
        assert_eq!(err.kind(), SourceErrorKind::NotFound);
        assert!(client.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn market_chart_pairs_prices_with_volumes() {
        let (client, adapter) = adapter(
            ScriptedHttpClient::new().with_json(
                "/coins/ethereum/market_chart",
                r#"{"prices":[[1760000000000,3000.0],[1760086400000,3100.0]],
                    "market_caps":[],
                    "total_volumes":[[1760000000000,1.5e9],[1760086400000,1.7e9]]}"#,
            ),
            None,
        );
        let req = HistoryRequest::new(
            Symbol::canonical("ETH"),
            AssetClass::Crypto,
            HistoryRange::OneMonth,
        )
        .expect("req");

        let history = adapter.history(req).await.expect("ok").expect("present");
        assert_eq!(history.points.len(), 2);
        assert_eq!(history.points[1].volume, 1.7e9);
        assert!(client.recorded_requests()[0].url.contains("days=30"));
        assert!(client.recorded_requests()[0].headers.is_empty());
    }
}
