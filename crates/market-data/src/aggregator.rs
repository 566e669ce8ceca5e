//! Polling cycle: classify the watchlist, fetch every (symbol, category)
//! through the failover executor, merge per symbol.
//!
//! The aggregator owns no credential state itself; that lives in the
//! executor's [`KeyRotator`] and survives across cycles.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheEntry, CacheKey, CacheTtl, FetchCache};
use crate::classifier::SymbolClassifier;
use crate::config::EngineConfig;
use crate::errors::MarketDataError;
use crate::merger::{MergeConfig, ResultMerger};
use crate::models::{
    DataCategory, FetchOutcome, FetchRequest, FetchResult, NormalizedRecord, ProviderId, Quote,
    Symbol,
};
use crate::provider::{
    CoinGeckoProvider, CoindeskProvider, ExaProvider, FinnhubProvider, MarketDataProvider,
    MassiveProvider, YahooProvider,
};
use crate::registry::{ApiKey, FailoverExecutor, KeyRotator, ProviderDescriptor, ProviderRegistry};
use crate::scope::{MarketIndex, MarketScopeFilter};

/// Latest quote of one broad-market index.
#[derive(Clone, Debug, Serialize)]
pub struct MarketSnapshot {
    pub index: MarketIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MarketSnapshot {
    fn from_result(index: MarketIndex, result: FetchResult) -> Self {
        let error = result.error_detail();
        let provider = result.provider;
        let quote = match result.outcome {
            FetchOutcome::Success(payload) => payload.as_quote().cloned(),
            _ => None,
        };
        Self {
            index,
            quote,
            provider,
            error,
        }
    }
}

/// Output of one polling cycle.
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One record per watchlist symbol, in watchlist order
    pub records: Vec<NormalizedRecord>,
    pub market_overview: Vec<MarketSnapshot>,
    /// The cycle was cut short; some entries may be absent as cancelled
    pub cancelled: bool,
}

impl CycleReport {
    /// Number of (symbol, category) entries holding a payload.
    pub fn present_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.entries.values().filter(|e| e.is_present()).count())
            .sum()
    }

    /// Number of (symbol, category) entries marked absent.
    pub fn absent_count(&self) -> usize {
        self.records.iter().map(|r| r.absences().count()).sum()
    }

    pub fn summary(&self) -> String {
        let elapsed = self.finished_at - self.started_at;
        format!(
            "{} symbols, {} entries present, {} absent, {} indices in {}ms{}",
            self.records.len(),
            self.present_count(),
            self.absent_count(),
            self.market_overview.len(),
            elapsed.num_milliseconds(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Runs polling cycles over a watchlist.
pub struct Aggregator {
    classifier: SymbolClassifier,
    executor: Arc<FailoverExecutor>,
    merger: ResultMerger,
    cache: Option<Arc<dyn FetchCache>>,
    cache_ttl: CacheTtl,
    categories: Vec<DataCategory>,
    market_overview: bool,
}

impl Aggregator {
    pub fn new(
        classifier: SymbolClassifier,
        executor: FailoverExecutor,
        categories: Vec<DataCategory>,
    ) -> Self {
        let merger = ResultMerger::new(executor.registry().clone());
        Self {
            classifier,
            executor: Arc::new(executor),
            merger,
            cache: None,
            cache_ttl: CacheTtl::default(),
            categories,
            market_overview: false,
        }
    }

    /// Build the full engine from configuration: adapters, credential pools,
    /// chains, executor and merger.
    ///
    /// Fails when a configured order names an unknown provider or a required
    /// category ends up without any provider. Known providers left
    /// unregistered for lack of keys are dropped from configured orders.
    pub fn from_config(config: &EngineConfig) -> Result<Self, MarketDataError> {
        let (registry, rotator) = build_registry(config)?;

        let executor = FailoverExecutor::new(registry, rotator, config.max_concurrency);
        let classifier = SymbolClassifier::with_extensions(
            config.crypto_symbols.iter().cloned(),
            config.equity_denylist.iter().cloned(),
        );
        let merge_config = MergeConfig {
            max_article_age: chrono::Duration::from_std(config.max_article_age).ok(),
            near_duplicate: None,
        };

        Ok(Self::new(classifier, executor, config.categories.clone())
            .with_merge_config(merge_config)
            .with_cache_ttl(config.cache_ttl)
            .with_market_overview(config.market_overview))
    }

    pub fn with_cache(mut self, cache: Arc<dyn FetchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: CacheTtl) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_market_overview(mut self, enabled: bool) -> Self {
        self.market_overview = enabled;
        self
    }

    pub fn with_merge_config(mut self, config: MergeConfig) -> Self {
        self.merger = ResultMerger::with_config(self.executor.registry().clone(), config);
        self
    }

    pub fn executor(&self) -> &Arc<FailoverExecutor> {
        &self.executor
    }

    pub fn classifier(&self) -> &SymbolClassifier {
        &self.classifier
    }

    /// Run one cycle over `watchlist`.
    ///
    /// Never fails: provider problems end up as absence markers in the
    /// records. Cancellation stops outstanding fetches and still returns a
    /// report with whatever completed.
    pub async fn run_cycle<S: AsRef<str>>(
        &self,
        watchlist: &[S],
        cancel: &CancellationToken,
    ) -> CycleReport {
        let started_at = Utc::now();
        let symbols = dedup_symbols(self.classifier.classify_all(watchlist));
        info!(
            "Starting cycle: {} symbols x {} categories",
            symbols.len(),
            self.categories.len()
        );

        let (known, unknown): (Vec<Symbol>, Vec<Symbol>) =
            symbols.iter().cloned().partition(|s| s.kind.is_known());
        for symbol in &unknown {
            warn!("Unclassified symbol '{}', not fetching it", symbol.raw);
        }

        let requests: Vec<FetchRequest> = known
            .iter()
            .flat_map(|symbol| {
                self.categories
                    .iter()
                    .map(move |category| FetchRequest::new(symbol.clone(), *category))
            })
            .collect();

        let results = join_all(
            requests
                .into_iter()
                .map(|request| self.fetch_with_cache(request, cancel)),
        )
        .await;

        // Results come back in request order: `categories.len()` per known symbol
        let mut results = results.into_iter();
        let mut records = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if symbol.kind.is_known() {
                let batch: Vec<FetchResult> = results.by_ref().take(self.categories.len()).collect();
                records.push(self.merger.merge(symbol, batch));
            } else {
                records.push(self.merger.unclassified(symbol, &self.categories));
            }
        }

        let market_overview = if self.market_overview && !cancel.is_cancelled() {
            let kinds = MarketScopeFilter::relevant_markets(&known);
            self.executor
                .fetch_market_overview(&kinds, cancel)
                .await
                .into_iter()
                .map(|(index, result)| MarketSnapshot::from_result(index, result))
                .collect()
        } else {
            Vec::new()
        };

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            records,
            market_overview,
            cancelled: cancel.is_cancelled(),
        };
        info!("Cycle finished: {}", report.summary());
        report
    }

    /// Serve a fresh cached payload when possible, otherwise fetch and fill
    /// the cache.
    async fn fetch_with_cache(&self, request: FetchRequest, cancel: &CancellationToken) -> FetchResult {
        let Some(cache) = &self.cache else {
            return self.executor.fetch(request, cancel).await;
        };

        let now = Utc::now();
        let key = CacheKey::new(&request.symbol, request.category, now);
        if let Some(entry) = cache.get(&key).await {
            if entry.is_fresh(self.cache_ttl.for_category(request.category), now) {
                debug!(
                    "Cache hit for {} {} (from '{}')",
                    request.symbol, request.category, entry.provider
                );
                return FetchResult::cached(entry.provider, request, entry.payload, entry.fetched_at);
            }
            debug!(
                "Cached {} {} from {} is stale, refetching",
                request.symbol, request.category, entry.fetched_at
            );
        }

        let result = self.executor.fetch(request, cancel).await;
        if let (Some(provider), Some(payload)) = (&result.provider, result.payload()) {
            cache
                .put(
                    key,
                    CacheEntry {
                        provider: provider.clone(),
                        payload: payload.clone(),
                        fetched_at: result.fetched_at,
                    },
                )
                .await;
        }
        result
    }
}

/// Drop repeated watchlist entries that classify to the same instrument.
fn dedup_symbols(symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter(|s| {
            let fresh = seen.insert((s.code.clone(), s.kind));
            if !fresh {
                debug!("Ignoring duplicate watchlist entry '{}'", s.raw);
            }
            fresh
        })
        .collect()
}

/// Instantiate the adapters the configuration enables and register their keys.
fn build_registry(config: &EngineConfig) -> Result<(ProviderRegistry, KeyRotator), MarketDataError> {
    let mut rotator = KeyRotator::with_config(config.rotator.clone());
    let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();

    let mut add = |provider: Arc<dyn MarketDataProvider>, keys: &[ApiKey], required: bool| {
        let id = provider.id();
        if keys.is_empty() && required {
            info!("Provider '{}' disabled: no API key configured", id);
            return;
        }
        if !keys.is_empty() {
            rotator.register(Cow::Borrowed(id), keys.to_vec());
        }
        debug!("Provider '{}' enabled with {} key(s)", id, keys.len());
        providers.push(provider);
    };

    add(Arc::new(FinnhubProvider::new()), &config.keys.finnhub, true);
    add(Arc::new(CoinGeckoProvider::new()), &config.keys.coingecko, false);
    add(Arc::new(CoindeskProvider::new()), &config.keys.coindesk, false);
    if config.yahoo_enabled {
        add(Arc::new(YahooProvider::new()?), &[], false);
    }
    add(Arc::new(MassiveProvider::new()), &config.keys.massive, true);
    add(Arc::new(ExaProvider::new()), &config.keys.exa, true);

    let descriptors = providers
        .into_iter()
        .map(|p| ProviderDescriptor::new(p).with_settings(config.provider_settings.clone()))
        .collect();

    let registry = ProviderRegistry::with_order(descriptors, &config.provider_order)?;
    registry.validate(&config.categories)?;
    Ok((registry, rotator))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::{AbsenceReason, InstrumentKind, Payload, RecordEntry};
    use crate::provider::{ProviderCapabilities, RateLimit};
    use crate::registry::ApiKey as Key;

    struct CountingQuotes {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for CountingQuotes {
        fn id(&self) -> &'static str {
            "COUNTING"
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                instrument_kinds: &InstrumentKind::KNOWN,
                categories: &[DataCategory::Quote],
                requires_credentials: false,
            }
        }

        fn rate_limit(&self) -> RateLimit {
            RateLimit {
                requests_per_minute: 6000,
                max_concurrency: 4,
                min_delay: std::time::Duration::ZERO,
            }
        }

        async fn get_quote(&self, _key: Option<&Key>, symbol: &Symbol) -> Result<Quote, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Quote::new(
                Utc::now(),
                dec!(100),
                symbol.kind.default_currency().to_string(),
                "COUNTING".to_string(),
            ))
        }
    }

    fn aggregator(provider: Arc<CountingQuotes>) -> Aggregator {
        let registry = ProviderRegistry::new(vec![ProviderDescriptor::new(provider)]);
        let executor = FailoverExecutor::new(registry, KeyRotator::new(), 4);
        Aggregator::new(SymbolClassifier::new(), executor, vec![DataCategory::Quote])
    }

    #[tokio::test]
    async fn test_records_follow_watchlist_order() {
        let provider = Arc::new(CountingQuotes {
            calls: AtomicUsize::new(0),
        });
        let aggregator = aggregator(provider.clone());

        let report = aggregator
            .run_cycle(&["AAPL", "what?", "BTC", "AAPL"], &CancellationToken::new())
            .await;

        let codes: Vec<&str> = report.records.iter().map(|r| &*r.symbol.code).collect();
        assert_eq!(codes, vec!["AAPL", "what?", "BTC"]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            report.records[1].entry(DataCategory::Quote),
            Some(&RecordEntry::Absent {
                reason: AbsenceReason::ClassificationUnknown
            })
        );
        assert_eq!(report.present_count(), 2);
        assert_eq!(report.absent_count(), 1);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_cache_serves_second_cycle() {
        let provider = Arc::new(CountingQuotes {
            calls: AtomicUsize::new(0),
        });
        let aggregator = aggregator(provider.clone()).with_cache(Arc::new(MemoryCache::new()));
        let cancel = CancellationToken::new();

        aggregator.run_cycle(&["AAPL"], &cancel).await;
        let second = aggregator.run_cycle(&["AAPL"], &cancel).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            second.records[0].entry(DataCategory::Quote),
            Some(RecordEntry::Present { from_cache: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_quote_is_refetched() {
        let provider = Arc::new(CountingQuotes {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(MemoryCache::new());
        let aggregator = aggregator(provider.clone()).with_cache(cache.clone());
        let cancel = CancellationToken::new();

        // A quote cached by an earlier poll, older than the quote TTL
        let aapl = SymbolClassifier::new().classify("AAPL");
        let earlier = Utc::now() - chrono::Duration::minutes(10);
        cache
            .put(
                CacheKey::new(&aapl, DataCategory::Quote, Utc::now()),
                CacheEntry {
                    provider: Cow::Borrowed("COUNTING"),
                    payload: Payload::Quote(Quote::new(
                        earlier,
                        dec!(90),
                        "USD".to_string(),
                        "COUNTING".to_string(),
                    )),
                    fetched_at: earlier,
                },
            )
            .await;

        let report = aggregator.run_cycle(&["AAPL"], &cancel).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            report.records[0].entry(DataCategory::Quote),
            Some(RecordEntry::Present { from_cache: false, .. })
        ));
        assert_eq!(report.records[0].price().map(|p| p.value), Some(dec!(100)));

        // A zero quote TTL refetches on every poll
        let aggregator = aggregator
            .with_cache_ttl(CacheTtl {
                quote: std::time::Duration::ZERO,
                ..CacheTtl::default()
            });
        aggregator.run_cycle(&["AAPL"], &cancel).await;
        aggregator.run_cycle(&["AAPL"], &cancel).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_market_overview_covers_watchlist_markets() {
        let provider = Arc::new(CountingQuotes {
            calls: AtomicUsize::new(0),
        });
        let aggregator = aggregator(provider).with_market_overview(true);

        let report = aggregator
            .run_cycle(&["hk00700"], &CancellationToken::new())
            .await;

        assert_eq!(report.market_overview.len(), 1);
        assert_eq!(&*report.market_overview[0].index.symbol.code, "^HSI");
        assert!(report.market_overview[0].quote.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_cycle_reports_cancellation() {
        let provider = Arc::new(CountingQuotes {
            calls: AtomicUsize::new(0),
        });
        let aggregator = aggregator(provider.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = aggregator.run_cycle(&["AAPL"], &cancel).await;
        assert!(report.cancelled);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            report.records[0].entry(DataCategory::Quote),
            Some(&RecordEntry::Absent {
                reason: AbsenceReason::Cancelled
            })
        );
    }

    #[test]
    fn test_from_config_requires_providers_for_categories() {
        let config = EngineConfig::from_vars([
            ("STOCK_LIST", "AAPL"),
            ("FETCH_CATEGORIES", "search"),
        ])
        .unwrap();
        let err = Aggregator::from_config(&config).err();
        assert!(matches!(
            err,
            Some(MarketDataError::Config(crate::errors::ConfigError::NoProviderForCategory(_)))
        ));
    }

    #[test]
    fn test_from_config_registers_massive_for_news() {
        let config = EngineConfig::from_vars([
            ("STOCK_LIST", "AAPL"),
            ("FETCH_CATEGORIES", "news"),
            ("MASSIVE_API_KEYS", "m1,m2"),
            ("PROVIDER_ORDER_NEWS", "MASSIVE,FINNHUB"),
        ])
        .unwrap();
        let aggregator = Aggregator::from_config(&config).unwrap();
        let chain: Vec<&str> = aggregator
            .executor()
            .registry()
            .providers_for(DataCategory::News)
            .iter()
            .map(|d| d.provider.id())
            .collect();
        assert_eq!(chain, vec!["MASSIVE"]);
    }

    #[test]
    fn test_from_config_skips_ordered_provider_without_key() {
        let config = EngineConfig::from_vars([
            ("STOCK_LIST", "AAPL"),
            ("FETCH_CATEGORIES", "quote"),
            ("PROVIDER_ORDER_QUOTE", "FINNHUB,YAHOO"),
        ])
        .unwrap();
        let aggregator = Aggregator::from_config(&config).unwrap();
        let chain: Vec<&str> = aggregator
            .executor()
            .registry()
            .providers_for(DataCategory::Quote)
            .iter()
            .map(|d| d.provider.id())
            .collect();
        assert_eq!(chain, vec!["YAHOO"]);

        // Without Yahoo nothing is left to serve quotes
        let config = EngineConfig::from_vars([
            ("STOCK_LIST", "AAPL"),
            ("FETCH_CATEGORIES", "quote"),
            ("PROVIDER_ORDER_QUOTE", "FINNHUB"),
            ("YAHOO_ENABLED", "false"),
        ])
        .unwrap();
        assert!(matches!(
            Aggregator::from_config(&config).err(),
            Some(MarketDataError::Config(crate::errors::ConfigError::NoProviderForCategory(_)))
        ));
    }
}
