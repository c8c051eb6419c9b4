use std::sync::Arc;

use marketlens_core::{
    AdapterContext, AlphaVantageAdapter, AssetClass, CacheStore, Capability, CoinGeckoAdapter,
    DataSource, FilingsRequest, FinnhubAdapter, FixtureSource, FredAdapter, FundamentalsRequest,
    HistoryRange, HistoryRequest, NewsApiAdapter, NewsRequest, NewsScope, PolygonAdapter,
    ProviderId, ProviderPolicy, QuoteRequest, ScriptedHttpClient, SearchRequest, SecAdapter,
    SeriesRequest, SourceError, SourceErrorKind, StockTwitsAdapter, Symbol,
};

struct ProviderCase {
    id: ProviderId,
    source: Arc<dyn DataSource>,
    capabilities: &'static [Capability],
}

fn provider_cases(http: Arc<ScriptedHttpClient>) -> Vec<ProviderCase> {
    let context = AdapterContext::new(http, CacheStore::with_default_ttl());
    let policy = ProviderPolicy::unthrottled;

    vec![
        ProviderCase {
            id: ProviderId::Alphavantage,
            source: Arc::new(AlphaVantageAdapter::with_policy(
                &context,
                "av-key",
                &policy(ProviderId::Alphavantage),
            )),
            capabilities: &[
                Capability::Quote,
                Capability::History,
                Capability::Fundamentals,
                Capability::News,
                Capability::Search,
            ],
        },
        ProviderCase {
            id: ProviderId::Finnhub,
            source: Arc::new(FinnhubAdapter::with_policy(
                &context,
                "fh-key",
                &policy(ProviderId::Finnhub),
            )),
            capabilities: &[
                Capability::Quote,
                Capability::Fundamentals,
                Capability::News,
                Capability::Search,
            ],
        },
        ProviderCase {
            id: ProviderId::Polygon,
            source: Arc::new(PolygonAdapter::with_policy(
                &context,
                "pg-key",
                &policy(ProviderId::Polygon),
            )),
            capabilities: &[Capability::Quote, Capability::History, Capability::News],
        },
        ProviderCase {
            id: ProviderId::Coingecko,
            source: Arc::new(CoinGeckoAdapter::with_policy(
                &context,
                None,
                &policy(ProviderId::Coingecko),
            )),
            capabilities: &[Capability::Quote, Capability::History, Capability::Search],
        },
        ProviderCase {
            id: ProviderId::Fred,
            source: Arc::new(FredAdapter::with_policy(
                &context,
                "fred-key",
                &policy(ProviderId::Fred),
            )),
            capabilities: &[Capability::EconomicSeries],
        },
        ProviderCase {
            id: ProviderId::Sec,
            source: Arc::new(SecAdapter::with_policy(
                &context,
                "marketlens-tests ops@example.test",
                &policy(ProviderId::Sec),
            )),
            capabilities: &[Capability::Filings, Capability::Search],
        },
        ProviderCase {
            id: ProviderId::Newsapi,
            source: Arc::new(NewsApiAdapter::with_policy(
                &context,
                "na-key",
                &policy(ProviderId::Newsapi),
            )),
            capabilities: &[Capability::News],
        },
        ProviderCase {
            id: ProviderId::Stocktwits,
            source: Arc::new(StockTwitsAdapter::with_policy(
                &context,
                &policy(ProviderId::Stocktwits),
            )),
            capabilities: &[Capability::News],
        },
    ]
}

/// Run one operation and report how many items came back.
async fn invoke(
    source: &dyn DataSource,
    capability: Capability,
    asset_class: AssetClass,
) -> Result<usize, SourceError> {
    let symbol = match asset_class {
        AssetClass::Crypto => Symbol::canonical("BTC"),
        _ => Symbol::canonical("AAPL"),
    };
    match capability {
        Capability::Quote => source
            .quote(QuoteRequest::new(symbol, asset_class).expect("quote request"))
            .await
            .map(|asset| usize::from(asset.is_some())),
        Capability::History => source
            .history(
                HistoryRequest::new(symbol, asset_class, HistoryRange::OneMonth)
                    .expect("history request"),
            )
            .await
            .map(|history| history.map_or(0, |history| history.len())),
        Capability::Fundamentals => source
            .fundamentals(FundamentalsRequest::new(symbol, asset_class).expect("request"))
            .await
            .map(|fundamentals| usize::from(fundamentals.is_some())),
        Capability::News => source
            .news(NewsRequest::new(NewsScope::Company(symbol), 5).expect("news request"))
            .await
            .map(|items| items.len()),
        Capability::Search => source
            .search(SearchRequest::new("apple", 5).expect("search request"))
            .await
            .map(|items| items.len()),
        Capability::EconomicSeries => source
            .economic_series(SeriesRequest::new("GDP", 5).expect("series request"))
            .await
            .map(|series| series.map_or(0, |series| series.observations.len())),
        Capability::Filings => source
            .filings(FilingsRequest::new(symbol, 5).expect("filings request"))
            .await
            .map(|filings| filings.len()),
    }
}

fn sample_class(id: ProviderId) -> AssetClass {
    if id == ProviderId::Coingecko {
        AssetClass::Crypto
    } else {
        AssetClass::Stock
    }
}

#[tokio::test]
async fn declared_capabilities_match_for_all_providers() {
    let http = Arc::new(ScriptedHttpClient::new());
    for case in provider_cases(http) {
        assert_eq!(case.source.id(), case.id);
        for capability in Capability::ALL {
            assert_eq!(
                case.source.capabilities().supports(capability),
                case.capabilities.contains(&capability),
                "provider '{}': capability {}",
                case.id,
                capability.as_str()
            );
        }
    }
}

#[tokio::test]
async fn unsupported_operations_fail_without_network() {
    let http = Arc::new(ScriptedHttpClient::new());
    for case in provider_cases(Arc::clone(&http)) {
        for capability in Capability::ALL {
            if case.capabilities.contains(&capability) {
                continue;
            }
            let error = invoke(case.source.as_ref(), capability, sample_class(case.id))
                .await
                .expect_err("unsupported");
            assert_eq!(
                error.kind(),
                SourceErrorKind::Unsupported,
                "provider '{}': {}",
                case.id,
                capability.as_str()
            );
            assert!(!error.counts_against_health());
        }
    }
    assert!(http.recorded_requests().is_empty());
}

#[tokio::test]
async fn rejected_credential_latches_the_source_off() {
    for case in provider_cases(Arc::new(ScriptedHttpClient::new())) {
        let http = Arc::new(ScriptedHttpClient::new().with_status("", 401, "{}"));
        let source = provider_cases(Arc::clone(&http))
            .into_iter()
            .find(|candidate| candidate.id == case.id)
            .expect("same provider")
            .source;
        let capability = case.capabilities[0];

        let first = invoke(source.as_ref(), capability, sample_class(case.id))
            .await
            .expect_err("401");
        assert_eq!(first.kind(), SourceErrorKind::Auth, "provider '{}'", case.id);
        assert!(first.disables_source());
        let sent = http.recorded_requests().len();
        assert!(sent >= 1, "provider '{}' made no request", case.id);

        let second = invoke(source.as_ref(), capability, sample_class(case.id))
            .await
            .expect_err("latched");
        assert_eq!(second.kind(), SourceErrorKind::Auth);
        assert_eq!(http.recorded_requests().len(), sent, "provider '{}'", case.id);
    }
}

#[tokio::test]
async fn upstream_429_is_quota_exceeded_for_all_providers() {
    let http = Arc::new(ScriptedHttpClient::new().with_status("", 429, "{}"));
    for case in provider_cases(Arc::clone(&http)) {
        let error = invoke(
            case.source.as_ref(),
            case.capabilities[0],
            sample_class(case.id),
        )
        .await
        .expect_err("429");
        assert_eq!(
            error.kind(),
            SourceErrorKind::QuotaExceeded,
            "provider '{}'",
            case.id
        );
        assert!(error.counts_against_health());
    }
}

#[tokio::test]
async fn server_errors_are_transport_failures() {
    let http = Arc::new(ScriptedHttpClient::new().with_status("", 503, ""));
    for case in provider_cases(Arc::clone(&http)) {
        let error = invoke(
            case.source.as_ref(),
            case.capabilities[0],
            sample_class(case.id),
        )
        .await
        .expect_err("503");
        assert_eq!(error.kind(), SourceErrorKind::Transport, "provider '{}'", case.id);
    }
}

#[tokio::test]
async fn fixture_source_supports_everything_and_misses_cleanly() {
    let source = FixtureSource::from_path(None).expect("empty fixture");
    assert_eq!(source.id(), ProviderId::Fixture);
    for capability in Capability::ALL {
        assert!(source.capabilities().supports(capability));
        match invoke(&source, capability, AssetClass::Stock).await {
            Ok(count) => assert_eq!(count, 0, "{}", capability.as_str()),
            Err(error) => assert_eq!(error.kind(), SourceErrorKind::NotFound),
        }
    }
}
