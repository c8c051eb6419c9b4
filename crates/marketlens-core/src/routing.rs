//! Candidate chains per operation and asset class.

use std::collections::{HashMap, HashSet};

use crate::data_source::Capability;
use crate::{AssetClass, ProviderId};

/// One orchestrated operation, keyed by asset class where routing depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Route {
    Quote(AssetClass),
    History(AssetClass),
    Fundamentals(AssetClass),
    MarketNews,
    CompanyNews,
    CryptoNews,
    Search,
    EconomicSeries,
    Filings,
}

impl Route {
    pub const fn capability(self) -> Capability {
        match self {
            Self::Quote(_) => Capability::Quote,
            Self::History(_) => Capability::History,
            Self::Fundamentals(_) => Capability::Fundamentals,
            Self::MarketNews | Self::CompanyNews | Self::CryptoNews => Capability::News,
            Self::Search => Capability::Search,
            Self::EconomicSeries => Capability::EconomicSeries,
            Self::Filings => Capability::Filings,
        }
    }

    /// Every route, class-keyed routes expanded for each asset class.
    pub fn all() -> Vec<Self> {
        let mut routes = Vec::new();
        for class in AssetClass::ALL {
            routes.extend([Self::Quote(class), Self::History(class), Self::Fundamentals(class)]);
        }
        routes.extend([
            Self::MarketNews,
            Self::CompanyNews,
            Self::CryptoNews,
            Self::Search,
            Self::EconomicSeries,
            Self::Filings,
        ]);
        routes
    }
}

/// Ordered candidate sources for every [`Route`].
///
/// Chains are deduplicated on insert. A route without a chain has no
/// candidates and always resolves to "no data".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    chains: HashMap<Route, Vec<ProviderId>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }

    /// Production chains for the eight live providers.
    pub fn standard() -> Self {
        use ProviderId::{
            Alphavantage, Coingecko, Finnhub, Fred, Newsapi, Polygon, Sec, Stocktwits,
        };

        let mut table = Self::empty();
        for class in [AssetClass::Stock, AssetClass::Fund] {
            table = table
                .with_chain(Route::Quote(class), [Finnhub, Alphavantage, Polygon])
                .with_chain(Route::History(class), [Polygon, Alphavantage])
                .with_chain(Route::Fundamentals(class), [Alphavantage, Finnhub]);
        }

        // Crypto never reaches equity-only sources.
        table
            .with_chain(Route::Quote(AssetClass::Crypto), [Coingecko, Polygon])
            .with_chain(Route::History(AssetClass::Crypto), [Coingecko, Polygon])
            .with_chain(Route::MarketNews, [Newsapi, Finnhub, Alphavantage, Polygon])
            .with_chain(
                Route::CompanyNews,
                [Finnhub, Polygon, Alphavantage, Newsapi, Stocktwits],
            )
            .with_chain(Route::CryptoNews, [Newsapi, Finnhub, Alphavantage, Stocktwits])
            .with_chain(Route::Search, [Finnhub, Alphavantage, Coingecko, Sec])
            .with_chain(Route::EconomicSeries, [Fred])
            .with_chain(Route::Filings, [Sec])
    }

    /// Every route served by the single fixture source.
    pub fn fixture() -> Self {
        Route::all()
            .into_iter()
            .fold(Self::empty(), |table, route| {
                table.with_chain(route, [ProviderId::Fixture])
            })
    }

    /// Replace the chain for `route`, dropping repeated providers.
    pub fn with_chain(
        mut self,
        route: Route,
        chain: impl IntoIterator<Item = ProviderId>,
    ) -> Self {
        let mut seen = HashSet::new();
        let chain = chain
            .into_iter()
            .filter(|provider| seen.insert(*provider))
            .collect();
        self.chains.insert(route, chain);
        self
    }

    pub fn chain(&self, route: Route) -> &[ProviderId] {
        self.chains.get(&route).map(Vec::as_slice).unwrap_or_default()
    }
}
