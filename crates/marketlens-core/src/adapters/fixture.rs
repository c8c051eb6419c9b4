//! Offline source backed by a JSON fixture file.
//!
//! The file holds already-canonical values, so serving them is a lookup. A
//! missing entry is a `NotFound`, which the orchestrator treats as "no data"
//! without touching health.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::classify;
use crate::data_source::{
    CapabilitySet, DataSource, FilingsRequest, FundamentalsRequest, HistoryRequest, NewsRequest,
    NewsScope, QuoteRequest, SearchRequest, SeriesRequest, SourceError, SourceFuture,
};
use crate::{
    Asset, AssetClass, CoreError, EconomicSeries, Filing, Fundamentals, Instrument, NewsItem,
    PriceHistory, ProviderId,
};

/// Contents of a fixture file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureSet {
    pub assets: Vec<Asset>,
    pub histories: Vec<PriceHistory>,
    pub fundamentals: Vec<Fundamentals>,
    pub news: Vec<NewsItem>,
    pub instruments: Vec<Instrument>,
    pub series: Vec<EconomicSeries>,
    pub filings: Vec<Filing>,
}

impl FixtureSet {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = fs::read_to_string(path).map_err(|source| CoreError::FixtureIo {
            path: path.display().to_string(),
            source,
        })?;
        let set: Self = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            assets = set.assets.len(),
            histories = set.histories.len(),
            news = set.news.len(),
            "loaded fixture set"
        );
        Ok(set)
    }
}

/// Serves every capability from a [`FixtureSet`].
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    set: FixtureSet,
}

impl FixtureSource {
    pub fn new(set: FixtureSet) -> Self {
        Self { set }
    }

    /// Load from `path`, or start empty when no path is configured.
    pub fn from_path(path: Option<&Path>) -> Result<Self, CoreError> {
        match path {
            Some(path) => FixtureSet::load(path).map(Self::new),
            None => Ok(Self::default()),
        }
    }

    fn missing(what: &str, key: impl std::fmt::Display) -> SourceError {
        SourceError::not_found(format!("fixture has no {what} for {key}"))
    }

    fn news_for(&self, req: &NewsRequest) -> Vec<NewsItem> {
        self.set
            .news
            .iter()
            .filter(|item| match &req.scope {
                NewsScope::General => true,
                NewsScope::Company(symbol) => item.related_assets.contains(symbol),
                NewsScope::Crypto => item
                    .related_assets
                    .iter()
                    .any(|symbol| classify(symbol.as_str()).asset_class == AssetClass::Crypto),
            })
            .take(req.limit)
            .cloned()
            .collect()
    }
}

impl DataSource for FixtureSource {
    fn id(&self) -> ProviderId {
        ProviderId::Fixture
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Option<Asset>> {
        Box::pin(async move {
            self.set
                .assets
                .iter()
                .find(|asset| asset.symbol == req.symbol)
                .cloned()
                .map(Some)
                .ok_or_else(|| Self::missing("quote", &req.symbol))
        })
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Option<PriceHistory>> {
        Box::pin(async move {
            self.set
                .histories
                .iter()
                .find(|history| history.symbol == req.symbol && history.range == req.range)
                .cloned()
                .map(Some)
                .ok_or_else(|| Self::missing("history", &req.symbol))
        })
    }

    fn fundamentals<'a>(
        &'a self,
        req: FundamentalsRequest,
    ) -> SourceFuture<'a, Option<Fundamentals>> {
        Box::pin(async move {
            self.set
                .fundamentals
                .iter()
                .find(|fundamentals| fundamentals.asset_id == req.symbol)
                .cloned()
                .map(Some)
                .ok_or_else(|| Self::missing("fundamentals", &req.symbol))
        })
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, Vec<NewsItem>> {
        Box::pin(async move { Ok(self.news_for(&req)) })
    }

    fn search<'a>(&'a self, req: SearchRequest) -> SourceFuture<'a, Vec<Instrument>> {
        Box::pin(async move {
            let needle = req.query.to_ascii_lowercase();
            Ok(self
                .set
                .instruments
                .iter()
                .filter(|instrument| {
                    instrument.symbol.as_str().to_ascii_lowercase().contains(&needle)
                        || instrument.name.to_ascii_lowercase().contains(&needle)
                })
                .take(req.limit)
                .cloned()
                .collect())
        })
    }

    fn economic_series<'a>(
        &'a self,
        req: SeriesRequest,
    ) -> SourceFuture<'a, Option<EconomicSeries>> {
        Box::pin(async move {
            let series = self
                .set
                .series
                .iter()
                .find(|series| series.series_id == req.series_id)
                .ok_or_else(|| Self::missing("series", &req.series_id))?;

            let mut series = series.clone();
            let keep_from = series.observations.len().saturating_sub(req.limit);
            series.observations.drain(..keep_from);
            Ok(Some(series))
        })
    }

    fn filings<'a>(&'a self, req: FilingsRequest) -> SourceFuture<'a, Vec<Filing>> {
        Box::pin(async move {
            let mut filings = self
                .set
                .filings
                .iter()
                .filter(|filing| filing.symbol == req.symbol)
                .cloned()
                .collect::<Vec<_>>();
            filings.sort_by(|left, right| right.filed_at.cmp(&left.filed_at));
            filings.truncate(req.limit);
            Ok(filings)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::{HistoryRange, Symbol};

    const FIXTURE: &str = r#"{
        "assets": [{
            "id": "AAPL", "symbol": "AAPL", "name": "Apple Inc", "asset_class": "stock",
            "price": 190.0, "change_24h": 1.0, "change_percent_24h": 0.5,
            "market_cap": null, "volume_24h": null, "high_24h": null, "low_24h": null,
            "logo": null, "source": "fixture", "as_of": "2026-04-17T20:00:00Z"
        }],
        "series": [{
            "series_id": "UNRATE", "title": null, "units": null, "frequency": null,
            "source": "fixture",
            "observations": [
                {"date": "2026-01-01T00:00:00Z", "value": 4.0},
                {"date": "2026-02-01T00:00:00Z", "value": 4.1},
                {"date": "2026-03-01T00:00:00Z", "value": 4.2}
            ]
        }]
    }"#;

    #[tokio::test]
    async fn serves_loaded_file_and_reports_gaps_as_not_found() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(FIXTURE.as_bytes()).expect("write fixture");

        let source = FixtureSource::from_path(Some(file.path())).expect("load");

        let req = QuoteRequest::new(Symbol::canonical("aapl"), AssetClass::Stock).expect("req");
        let asset = source.quote(req).await.expect("ok").expect("present");
        assert_eq!(asset.name, "Apple Inc");

        let req = HistoryRequest::new(
            Symbol::canonical("AAPL"),
            AssetClass::Stock,
            HistoryRange::OneDay,
        )
        .expect("req");
        let err = source.history(req).await.expect_err("no history");
        assert_eq!(err.kind(), SourceErrorKind::NotFound);
        assert!(!err.counts_against_health());

        let series = source
            .economic_series(SeriesRequest::new("UNRATE", 2).expect("req"))
            .await
            .expect("ok")
            .expect("present");
        let values = series.observations.iter().map(|o| o.value).collect::<Vec<_>>();
        assert_eq!(values, vec![4.1, 4.2]);
    }

    #[tokio::test]
    async fn no_path_means_empty_source() {
        let source = FixtureSource::from_path(None).expect("empty");
        let news = source
            .news(NewsRequest::new(NewsScope::General, 10).expect("req"))
            .await
            .expect("ok");
        assert!(news.is_empty());
    }

    #[test]
    fn unreadable_file_is_fixture_io_error() {
        let err = FixtureSource::from_path(Some(Path::new("/nonexistent/marketlens.json")))
            .expect_err("missing file");
        assert!(matches!(err, CoreError::FixtureIo { .. }));
    }
}
