mod alphavantage;
mod coingecko;
pub mod common;
mod finnhub;
pub mod fixture;
mod fred;
mod newsapi;
mod polygon;
mod sec;
mod stocktwits;

pub use alphavantage::AlphaVantageAdapter;
pub use coingecko::CoinGeckoAdapter;
pub use common::{AdapterContext, AdapterCore};
pub use finnhub::FinnhubAdapter;
pub use fixture::{FixtureSet, FixtureSource};
pub use fred::FredAdapter;
pub use newsapi::NewsApiAdapter;
pub use polygon::PolygonAdapter;
pub use sec::SecAdapter;
pub use stocktwits::StockTwitsAdapter;
