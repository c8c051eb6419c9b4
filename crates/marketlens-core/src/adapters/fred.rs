use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::common::{parse_number, AdapterContext, AdapterCore};
use crate::cache::{cache_key, CacheTtl};
use crate::data_source::{CapabilitySet, DataSource, SeriesRequest, SourceError, SourceFuture};
use crate::http_client::HttpRequest;
use crate::provider_policy::ProviderPolicy;
use crate::{EconomicObservation, EconomicSeries, ProviderId, UtcDateTime};

const BASE_URL: &str = "https://api.stlouisfed.org/fred";

/// Placeholder FRED uses for a missing observation.
const MISSING_VALUE: &str = ".";

/// Federal Reserve Economic Data adapter.
pub struct FredAdapter {
    core: AdapterCore,
    api_key: String,
    base_url: String,
}

impl FredAdapter {
    pub fn new(context: &AdapterContext, api_key: impl Into<String>) -> Self {
        Self::with_policy(context, api_key, &ProviderPolicy::default_for(ProviderId::Fred))
    }

    pub fn with_policy(
        context: &AdapterContext,
        api_key: impl Into<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderId::Fred, context, policy),
            api_key: api_key.into(),
            base_url: String::from(BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, path: &str, series_id: &str) -> HttpRequest {
        HttpRequest::get(format!(
            "{}{path}?series_id={}&api_key={}&file_type=json",
            self.base_url,
            urlencoding::encode(series_id),
            urlencoding::encode(&self.api_key)
        ))
    }

    /// Title, units and frequency; cached as reference data.
    async fn metadata(&self, series_id: &str) -> Result<FredSeriesInfo, SourceError> {
        let key = cache_key(ProviderId::Fred, "series-info", &[series_id]);
        self.core
            .cached(key, CacheTtl::REFERENCE_DATA, || async {
                let response: FredSeriesResponse = self
                    .core
                    .fetch_json(self.request("/series", series_id))
                    .await?;
                response.seriess.into_iter().next().ok_or_else(|| {
                    SourceError::not_found(format!("fred has no series {series_id}"))
                })
            })
            .await
    }

    async fn fetch_series(&self, req: &SeriesRequest) -> Result<EconomicSeries, SourceError> {
        let request = self.request("/series/observations", &req.series_id);
        let request = HttpRequest {
            url: format!("{}&sort_order=desc&limit={}", request.url, req.limit),
            ..request
        };
        let response: FredObservationsResponse = self.core.fetch_json(request).await?;

        let observations = response
            .observations
            .into_iter()
            .filter(|observation| observation.value != MISSING_VALUE)
            .filter_map(|observation| {
                Some(EconomicObservation {
                    date: UtcDateTime::parse_date(&observation.date).ok()?,
                    value: parse_number(&observation.value)?,
                })
            })
            .collect::<Vec<_>>();

        if observations.is_empty() {
            return Err(SourceError::not_found(format!(
                "fred returned no observations for {}",
                req.series_id
            )));
        }

        let mut series = EconomicSeries::new(&req.series_id, ProviderId::Fred, observations);
        match self.metadata(&req.series_id).await {
            Ok(info) => {
                series.title = info.title;
                series.units = info.units;
                series.frequency = info.frequency;
            }
            Err(error) => {
                debug!(series_id = %req.series_id, %error, "fred series metadata unavailable");
            }
        }
        Ok(series)
    }
}

impl DataSource for FredAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Fred
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            economic_series: true,
            ..CapabilitySet::none()
        }
    }

    fn economic_series<'a>(
        &'a self,
        req: SeriesRequest,
    ) -> SourceFuture<'a, Option<EconomicSeries>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Fred,
                "series",
                &[&req.series_id, &req.limit.to_string()],
            );
            self.core
                .cached(key, CacheTtl::ECONOMIC_SERIES, || self.fetch_series(&req))
                .await
                .map(Some)
        })
    }
}

#[derive(Debug, Deserialize)]
struct FredObservationsResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct FredSeriesResponse {
    #[serde(default)]
    seriess: Vec<FredSeriesInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct FredSeriesInfo {
    title: Option<String>,
    units: Option<String>,
    frequency: Option<String>,
}
