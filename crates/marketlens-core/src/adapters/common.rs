//! Fetch/normalize skeleton shared by every live adapter.
//!
//! An adapter call goes: cache lookup, then the source's [`RequestQueue`],
//! then the transport, then status mapping and JSON decoding. Only values the
//! adapter has validated are written back to the cache.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::data_source::SourceError;
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::news::article_sentiment;
use crate::provider_policy::ProviderPolicy;
use crate::throttling::RequestQueue;
use crate::{
    HistoryRange, NewsItem, PriceHistoryPoint, ProviderId, Sentiment, Symbol, UtcDateTime,
    ValidationError,
};

/// Shared collaborators handed to every adapter at construction.
#[derive(Clone)]
pub struct AdapterContext {
    pub http: Arc<dyn HttpClient>,
    pub cache: CacheStore,
    pub timeout_ms: u64,
}

impl AdapterContext {
    pub fn new(http: Arc<dyn HttpClient>, cache: CacheStore) -> Self {
        Self {
            http,
            cache,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Per-adapter state: transport, queue, cache and the auth latch.
pub struct AdapterCore {
    provider: ProviderId,
    http: Arc<dyn HttpClient>,
    queue: Arc<RequestQueue>,
    cache: CacheStore,
    auth_rejected: AtomicBool,
    timeout_ms: u64,
}

impl AdapterCore {
    pub fn new(provider: ProviderId, context: &AdapterContext, policy: &ProviderPolicy) -> Self {
        Self {
            provider,
            http: Arc::clone(&context.http),
            queue: Arc::new(RequestQueue::from_policy(policy)),
            cache: context.cache.clone(),
            auth_rejected: AtomicBool::new(false),
            timeout_ms: context.timeout_ms,
        }
    }

    pub const fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// True once the provider has rejected our credential.
    pub fn auth_rejected(&self) -> bool {
        self.auth_rejected.load(Ordering::Relaxed)
    }

    /// Send `request` through the queue and decode a successful JSON body.
    pub async fn fetch_json<T>(&self, request: HttpRequest) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
    {
        let body = self.fetch_body(request).await?;
        serde_json::from_str(&body).map_err(|error| {
            SourceError::malformed(format!(
                "{} returned an unexpected payload: {error}",
                self.provider
            ))
        })
    }

    /// Send `request` through the queue and return the raw body of a 2xx response.
    pub async fn fetch_body(&self, request: HttpRequest) -> Result<String, SourceError> {
        if self.auth_rejected() {
            return Err(SourceError::auth(format!(
                "{} credential was rejected earlier; source disabled",
                self.provider
            )));
        }

        let endpoint = endpoint_path(&request.url).to_owned();
        let request = request.with_timeout_ms(self.timeout_ms);
        let http = Arc::clone(&self.http);
        let provider = self.provider;

        let response = self
            .queue
            .enqueue(async move {
                http.execute(request).await.map_err(|error| {
                    SourceError::transport(format!("{provider} transport error: {error}"))
                })
            })
            .await?;

        debug!(provider = %self.provider, %endpoint, status = response.status, "upstream response");

        match response.status {
            200..=299 => Ok(response.body),
            401 | 403 => {
                self.auth_rejected.store(true, Ordering::Relaxed);
                warn!(provider = %self.provider, status = response.status, "credential rejected");
                Err(SourceError::auth(format!(
                    "{} rejected the credential (status {})",
                    self.provider, response.status
                )))
            }
            429 => {
                self.queue
                    .mark_rate_limited(response.retry_after_secs.map(Duration::from_secs));
                Err(SourceError::quota_exceeded(format!(
                    "{} rate limit hit (status 429)",
                    self.provider
                )))
            }
            400 => Err(SourceError::invalid_request(format!(
                "{} rejected the request parameters (status 400)",
                self.provider
            ))),
            404 => Err(SourceError::not_found(format!(
                "{} has no data at {endpoint}",
                self.provider
            ))),
            status => Err(SourceError::transport(format!(
                "{} returned status {status}",
                self.provider
            ))),
        }
    }

    /// Serve from cache, or run `fetch` and cache its successful value.
    pub async fn cached<T, F, Fut>(
        &self,
        key: String,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, SourceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        if let Some(hit) = self.cache.get_json::<T>(&key).await {
            return Ok(hit);
        }

        let value = fetch().await?;
        self.cache.put_json(key, &value, ttl).await;
        Ok(value)
    }

    /// Like [`cached`](Self::cached) for lists; empty results are not cached.
    pub async fn cached_list<T, F, Fut>(
        &self,
        key: String,
        ttl: Duration,
        fetch: F,
    ) -> Result<Vec<T>, SourceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, SourceError>>,
    {
        if let Some(hit) = self.cache.get_json::<Vec<T>>(&key).await {
            return Ok(hit);
        }

        let values = fetch().await?;
        if !values.is_empty() {
            self.cache.put_json(key, &values, ttl).await;
        }
        Ok(values)
    }
}

/// Provider article before normalization into a [`NewsItem`].
pub(crate) struct RawArticle {
    pub title: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub published_at: UtcDateTime,
    pub sentiment: Option<Sentiment>,
    pub related_assets: Vec<Symbol>,
}

impl RawArticle {
    /// Articles without a title or link are dropped. Missing sentiment labels
    /// fall back to keyword scoring.
    pub fn into_item(self, provider: ProviderId) -> Option<NewsItem> {
        let title = self.title.trim().to_owned();
        let url = self.url.trim().to_owned();
        if title.is_empty() || url.is_empty() {
            return None;
        }

        let summary = self.summary.trim().to_owned();
        let sentiment = self
            .sentiment
            .unwrap_or_else(|| article_sentiment(&title, &summary));
        let source = if self.source.trim().is_empty() {
            provider.display_name().to_owned()
        } else {
            self.source.trim().to_owned()
        };

        Some(NewsItem {
            id: format!("{provider}:{url}"),
            title,
            summary,
            source,
            url,
            published_at: self.published_at,
            sentiment,
            related_assets: self.related_assets,
            provider,
        })
    }
}

/// Keep points inside the range's look-back, measured back from the latest
/// point so closed markets still yield a full window.
pub(crate) fn trim_to_range(
    points: Vec<PriceHistoryPoint>,
    range: HistoryRange,
) -> Vec<PriceHistoryPoint> {
    let Some(latest) = points.iter().map(|point| point.timestamp).max() else {
        return points;
    };
    let lookback_ms = i64::from(range.days()) * 86_400_000;
    let cutoff = latest.saturating_sub(lookback_ms);
    points
        .into_iter()
        .filter(|point| point.timestamp >= cutoff)
        .collect()
}

/// URL path without the query string, safe to log (keys live in queries).
fn endpoint_path(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

pub(crate) fn invalid_payload(provider: ProviderId) -> impl Fn(ValidationError) -> SourceError {
    move |error| SourceError::malformed(format!("{provider} payload failed validation: {error}"))
}

/// Numeric field that providers send either as a number or a string
/// (`"123.45"`, `"None"`, `"-"`).
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null,
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(value)) => Some(value),
        Some(Raw::Text(text)) => parse_number(&text),
        Some(Raw::Null) | None => None,
    })
}

/// Parse a provider number string, tolerating `%` suffixes and placeholders.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim().trim_end_matches('%');
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[serde(default, deserialize_with = "lenient_f64")]
        value: Option<f64>,
    }

    fn core(client: ScriptedHttpClient) -> (Arc<ScriptedHttpClient>, AdapterCore) {
        let client = Arc::new(client);
        let context = AdapterContext::new(client.clone(), CacheStore::with_default_ttl());
        let core = AdapterCore::new(
            ProviderId::Finnhub,
            &context,
            &ProviderPolicy::unthrottled(ProviderId::Finnhub),
        );
        (client, core)
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let (_, core) = core(
            ScriptedHttpClient::new()
                .with_status("/missing", 404, "")
                .with_status("/boom", 502, "")
                .with_json("/garbage", "not json"),
        );

        let err = core
            .fetch_json::<Payload>(HttpRequest::get("https://p.test/missing"))
            .await
            .expect_err("404");
        assert_eq!(err.kind(), SourceErrorKind::NotFound);

        let err = core
            .fetch_json::<Payload>(HttpRequest::get("https://p.test/boom"))
            .await
            .expect_err("502");
        assert_eq!(err.kind(), SourceErrorKind::Transport);

        let err = core
            .fetch_json::<Payload>(HttpRequest::get("https://p.test/garbage"))
            .await
            .expect_err("bad body");
        assert_eq!(err.kind(), SourceErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn rejected_credential_disables_further_calls() {
        let (client, core) = core(ScriptedHttpClient::new().with_status("/quote", 401, ""));

        let err = core
            .fetch_body(HttpRequest::get("https://p.test/quote"))
            .await
            .expect_err("401");
        assert_eq!(err.kind(), SourceErrorKind::Auth);
        assert!(core.auth_rejected());

        let err = core
            .fetch_body(HttpRequest::get("https://p.test/quote"))
            .await
            .expect_err("latched");
        assert_eq!(err.kind(), SourceErrorKind::Auth);
        assert_eq!(client.request_count("/quote"), 1);
    }

    #[tokio::test]
    async fn rate_limit_cooldown_follows_retry_after() {
        let (client, core) = core(
            ScriptedHttpClient::new()
                .with_response(
                    "/short",
                    Ok(HttpResponse::with_status(429, "").with_retry_after_secs(0)),
                )
                .with_status("/long", 429, ""),
        );

        // zero seconds: the next call goes out again
        for _ in 0..2 {
            let err = core
                .fetch_body(HttpRequest::get("https://p.test/short"))
                .await
                .expect_err("429");
            assert_eq!(err.kind(), SourceErrorKind::QuotaExceeded);
        }
        assert_eq!(client.request_count("/short"), 2);

        // no header: default cooldown, later calls stay local
        for _ in 0..2 {
            let err = core
                .fetch_body(HttpRequest::get("https://p.test/long"))
                .await
                .expect_err("429");
            assert_eq!(err.kind(), SourceErrorKind::QuotaExceeded);
        }
        assert_eq!(client.request_count("/long"), 1);
        assert!(core.queue().is_cooling_down());
    }

    #[tokio::test]
    async fn cached_only_stores_successes() {
        let (_, core) = core(ScriptedHttpClient::new());

        let err = core
            .cached::<u32, _, _>(String::from("k"), Duration::from_secs(5), || async {
                Err(SourceError::transport("down"))
            })
            .await
            .expect_err("propagated");
        assert_eq!(err.kind(), SourceErrorKind::Transport);

        let value = core
            .cached(String::from("k"), Duration::from_secs(5), || async { Ok(7_u32) })
            .await
            .expect("fetched");
        assert_eq!(value, 7);

        let value = core
            .cached(String::from("k"), Duration::from_secs(5), || async {
                Ok::<u32, SourceError>(99)
            })
            .await
            .expect("cached");
        assert_eq!(value, 7);
    }

    #[test]
    fn lenient_numbers() {
        let parsed: Payload = serde_json::from_str(r#"{"value":"12.5%"}"#).expect("json");
        assert_eq!(parsed.value, Some(12.5));
        let parsed: Payload = serde_json::from_str(r#"{"value":"None"}"#).expect("json");
        assert_eq!(parsed.value, None);
        let parsed: Payload = serde_json::from_str(r#"{"value":3}"#).expect("json");
        assert_eq!(parsed.value, Some(3.0));
        let parsed: Payload = serde_json::from_str(r#"{}"#).expect("json");
        assert_eq!(parsed.value, None);
    }

    #[test]
    fn articles_without_links_are_dropped_and_unlabeled_ones_are_scored() {
        let article = |url: &str, sentiment| RawArticle {
            title: String::from("Chipmaker shares surge"),
            summary: String::new(),
            source: String::new(),
            url: url.to_owned(),
            published_at: UtcDateTime::now(),
            sentiment,
            related_assets: Vec::new(),
        };

        assert!(article("", None).into_item(ProviderId::Polygon).is_none());

        let item = article("https://n.test/a", None)
            .into_item(ProviderId::Polygon)
            .expect("kept");
        assert_eq!(item.sentiment, Sentiment::Positive);
        assert_eq!(item.source, "Polygon");
        assert_eq!(item.id, "polygon:https://n.test/a");

        let item = article("https://n.test/b", Some(Sentiment::Negative))
            .into_item(ProviderId::Polygon)
            .expect("kept");
        assert_eq!(item.sentiment, Sentiment::Negative);
    }

    #[test]
    fn trim_keeps_window_behind_latest_point() {
        let day = 86_400_000;
        let points = (0..10)
            .map(|i| PriceHistoryPoint::new(i * day, 1.0, None).expect("point"))
            .collect::<Vec<_>>();

        let trimmed = trim_to_range(points, HistoryRange::OneWeek);
        assert_eq!(trimmed.first().map(|p| p.timestamp), Some(2 * day));
        assert_eq!(trimmed.len(), 8);
    }

    #[test]
    fn endpoint_path_drops_query() {
        assert_eq!(
            endpoint_path("https://p.test/query?apikey=secret"),
            "https://p.test/query"
        );
    }
}
