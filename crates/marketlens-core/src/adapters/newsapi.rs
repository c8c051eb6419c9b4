use serde::Deserialize;

use crate::adapters::common::{AdapterContext, AdapterCore, RawArticle};
use crate::cache::{cache_key, CacheTtl};
use crate::classifier::crypto_listing;
use crate::data_source::{CapabilitySet, DataSource, NewsRequest, NewsScope, SourceError, SourceFuture};
use crate::http_client::{HttpAuth, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::{NewsItem, ProviderId, UtcDateTime};

const BASE_URL: &str = "https://newsapi.org/v2";
const MAX_PAGE_SIZE: usize = 100;
const CRYPTO_QUERY: &str = "cryptocurrency OR bitcoin OR ethereum";
/// Placeholder title NewsAPI leaves on retracted articles.
const REMOVED_TITLE: &str = "[Removed]";

/// NewsAPI adapter: business headlines, crypto coverage and keyword search
/// for company news.
pub struct NewsApiAdapter {
    core: AdapterCore,
    auth: HttpAuth,
    base_url: String,
}

impl NewsApiAdapter {
    pub fn new(context: &AdapterContext, api_key: impl Into<String>) -> Self {
        Self::with_policy(
            context,
            api_key,
            &ProviderPolicy::default_for(ProviderId::Newsapi),
        )
    }

    pub fn with_policy(
        context: &AdapterContext,
        api_key: impl Into<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderId::Newsapi, context, policy),
            auth: HttpAuth::Header {
                name: String::from("X-Api-Key"),
                value: api_key.into(),
            },
            base_url: String::from(BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_news(&self, req: &NewsRequest) -> Result<Vec<NewsItem>, SourceError> {
        let page_size = req.limit.clamp(1, MAX_PAGE_SIZE);
        let path = match &req.scope {
            NewsScope::General => {
                format!("/top-headlines?category=business&language=en&pageSize={page_size}")
            }
            NewsScope::Crypto => everything_path(CRYPTO_QUERY, page_size),
            NewsScope::Company(symbol) => {
                // Crypto tickers alone match too much noise; search the coin name.
                let query = match crypto_listing(symbol.as_str()) {
                    Some(listing) => format!("\"{}\" OR {symbol}", listing.name),
                    None => symbol.as_str().to_owned(),
                };
                everything_path(&query, page_size)
            }
        };

        let response: NewsApiResponse = self
            .core
            .fetch_json(HttpRequest::get(format!("{}{path}", self.base_url)).with_auth(&self.auth))
            .await?;

        if response.status != "ok" {
            return Err(SourceError::malformed(format!(
                "newsapi answered status '{}': {}",
                response.status,
                response.message.unwrap_or_default()
            )));
        }

        let related = match &req.scope {
            NewsScope::Company(symbol) => vec![symbol.clone()],
            NewsScope::General | NewsScope::Crypto => Vec::new(),
        };

        Ok(response
            .articles
            .into_iter()
            .filter(|article| article.title.as_deref() != Some(REMOVED_TITLE))
            .filter_map(|article| {
                let published_at = UtcDateTime::parse(article.published_at.as_deref()?).ok()?;
                RawArticle {
                    title: article.title.unwrap_or_default(),
                    summary: article.description.unwrap_or_default(),
                    source: article.source.and_then(|source| source.name).unwrap_or_default(),
                    url: article.url.unwrap_or_default(),
                    published_at,
                    sentiment: None,
                    related_assets: related.clone(),
                }
                .into_item(ProviderId::Newsapi)
            })
            .take(req.limit)
            .collect())
    }
}

impl DataSource for NewsApiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Newsapi
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
                ProviderId::Newsapi,
                "news",
                &[&req.scope.cache_part(), &req.limit.to_string()],
            );
            self.core
                .cached_list(key, CacheTtl::NEWS, || self.fetch_news(&req))
                .await
        })
    }
}

fn everything_path(query: &str, page_size: usize) -> String {
    format!(
        "/everything?q={}&language=en&sortBy=publishedAt&pageSize={page_size}",
        urlencoding::encode(query)
    )
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    source: Option<NewsApiSource>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}
