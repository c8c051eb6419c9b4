use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::adapters::common::{AdapterContext, AdapterCore};
use crate::cache::{cache_key, CacheTtl};
use crate::config::DEFAULT_SEC_USER_AGENT;
use crate::data_source::{
    CapabilitySet, DataSource, FilingsRequest, SearchRequest, SourceError, SourceFuture,
};
use crate::http_client::HttpRequest;
use crate::provider_policy::ProviderPolicy;
use crate::{AssetClass, Filing, Instrument, ProviderId, Symbol, UtcDateTime};

const WWW_BASE_URL: &str = "https://www.sec.gov";
const DATA_BASE_URL: &str = "https://data.sec.gov";

/// SEC EDGAR adapter: recent filings per company and ticker search over the
/// public company ticker list. EDGAR rejects clients without a contact
/// User-Agent.
pub struct SecAdapter {
    core: AdapterCore,
    user_agent: String,
    www_base_url: String,
    data_base_url: String,
}

impl SecAdapter {
    pub fn new(context: &AdapterContext, user_agent: impl Into<String>) -> Self {
        Self::with_policy(
            context,
            user_agent,
            &ProviderPolicy::default_for(ProviderId::Sec),
        )
    }

    pub fn with_policy(
        context: &AdapterContext,
        user_agent: impl Into<String>,
        policy: &ProviderPolicy,
    ) -> Self {
        let user_agent = user_agent.into();
        let user_agent = if user_agent.trim().is_empty() {
            String::from(DEFAULT_SEC_USER_AGENT)
        } else {
            user_agent
        };
        Self {
            core: AdapterCore::new(ProviderId::Sec, context, policy),
            user_agent,
            www_base_url: String::from(WWW_BASE_URL),
            data_base_url: String::from(DATA_BASE_URL),
        }
    }

    /// Point both EDGAR hosts at one base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.www_base_url = base_url.clone();
        self.data_base_url = base_url;
        self
    }

    fn request(&self, url: String) -> HttpRequest {
        HttpRequest::get(url).with_header("User-Agent", self.user_agent.as_str())
    }

    /// Ticker to CIK table, refreshed daily.
    async fn company_tickers(&self) -> Result<Vec<SecCompany>, SourceError> {
        let key = cache_key(ProviderId::Sec, "company-tickers", &[]);
        self.core
            .cached(key, CacheTtl::REFERENCE_DATA, || async {
                let table: BTreeMap<String, SecCompany> = self
                    .core
                    .fetch_json(self.request(format!(
                        "{}/files/company_tickers.json",
                        self.www_base_url
                    )))
                    .await?;
                Ok(table.into_values().collect::<Vec<_>>())
            })
            .await
    }

    async fn fetch_filings(&self, req: &FilingsRequest) -> Result<Vec<Filing>, SourceError> {
        let companies = self.company_tickers().await?;
        let company = companies
            .iter()
            .find(|company| company.ticker.eq_ignore_ascii_case(req.symbol.as_str()))
            .ok_or_else(|| {
                SourceError::not_found(format!("no SEC registrant for {}", req.symbol))
            })?;

        let padded_cik = format!("{:010}", company.cik);
        let submissions: SecSubmissions = self
            .core
            .fetch_json(self.request(format!(
                "{}/submissions/CIK{padded_cik}.json",
                self.data_base_url
            )))
            .await?;

        let recent = submissions.filings.recent;
        let filings = recent
            .accession_number
            .iter()
            .enumerate()
            .filter_map(|(index, accession)| {
                let form = recent.form.get(index)?;
                let filed_at = UtcDateTime::parse_date(recent.filing_date.get(index)?).ok()?;
                let document = recent.primary_document.get(index).map(String::as_str);
                let description = recent
                    .primary_doc_description
                    .get(index)
                    .filter(|value| !value.trim().is_empty())
                    .cloned();

                Some(Filing {
                    symbol: req.symbol.clone(),
                    cik: padded_cik.clone(),
                    form: form.clone(),
                    filed_at,
                    accession_number: accession.clone(),
                    url: archive_url(&self.www_base_url, company.cik, accession, document),
                    description,
                })
            })
            .take(req.limit)
            .collect();

        Ok(filings)
    }

    async fn fetch_search(&self, req: &SearchRequest) -> Result<Vec<Instrument>, SourceError> {
        let companies = self.company_tickers().await?;
        let needle = req.query.to_ascii_lowercase();

        // Exact ticker hits first, then title matches in table order.
        let mut matches = companies
            .iter()
            .filter(|company| {
                company.ticker.to_ascii_lowercase() == needle
                    || company.title.to_ascii_lowercase().contains(&needle)
            })
            .collect::<Vec<_>>();
        matches.sort_by_key(|company| company.ticker.to_ascii_lowercase() != needle);

        Ok(matches
            .into_iter()
            .filter_map(|company| {
                Instrument::new(
                    Symbol::parse(&company.ticker).ok()?,
                    company.title.clone(),
                    AssetClass::Stock,
                    None,
                    "USD",
                    ProviderId::Sec,
                )
                .ok()
            })
            .take(req.limit)
            .collect())
    }
}

impl DataSource for SecAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Sec
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            filings: true,
            search: true,
            ..CapabilitySet::none()
        }
    }

    fn filings<'a>(&'a self, req: FilingsRequest) -> SourceFuture<'a, Vec<Filing>> {
        Box::pin(async move {
            let key = cache_key(
                ProviderId::Sec,
                "filings",
                &[req.symbol.as_str(), &req.limit.to_string()],
            );
            self.core
                .cached_list(key, CacheTtl::FILINGS, || self.fetch_filings(&req))
                .await
        })
    }

    fn search<'a>(&'a self, req: SearchRequest) -> SourceFuture<'a, Vec<Instrument>> {
        Box::pin(async move { self.fetch_search(&req).await })
    }
}

/// `https://www.sec.gov/Archives/edgar/data/<cik>/<accession without dashes>/<document>`
fn archive_url(base: &str, cik: u64, accession: &str, document: Option<&str>) -> String {
    let folder = accession.replace('-', "");
    match document.filter(|value| !value.is_empty()) {
        Some(document) => format!("{base}/Archives/edgar/data/{cik}/{folder}/{document}"),
        None => format!("{base}/Archives/edgar/data/{cik}/{folder}/{accession}-index.htm"),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SecCompany {
    #[serde(rename = "cik_str")]
    cik: u64,
    ticker: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct SecSubmissions {
    filings: SecFilings,
}

#[derive(Debug, Deserialize)]
struct SecFilings {
    recent: SecRecentFilings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecRecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
    #[serde(default)]
    primary_doc_description: Vec<String>,
}
