//! End-to-end failover behavior against scripted providers.
//!
//! All tests run on paused tokio time so backoff sleeps, timeouts and
//! cooldowns resolve instantly and deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use common::{
    descriptor, news, quote, rate_limited, register, rotator, settings, unavailable,
    ScriptedProvider, Step,
};
use pulsewatch_market_data::registry::{FailoverExecutor, ProviderRegistry};
use pulsewatch_market_data::{
    AbsenceReason, Aggregator, DataCategory, FetchOutcome, FetchRequest, InstrumentKind,
    MarketDataError, RecordEntry, Symbol, SymbolClassifier,
};

const EQUITIES: &[InstrumentKind] = &[
    InstrumentKind::UsEquity,
    InstrumentKind::HkEquity,
    InstrumentKind::CnAShare,
];
const CRYPTO: &[InstrumentKind] = &[InstrumentKind::Crypto];
const QUOTE: &[DataCategory] = &[DataCategory::Quote];

fn symbol(raw: &str) -> Symbol {
    SymbolClassifier::new().classify(raw)
}

fn quote_request(raw: &str) -> FetchRequest {
    FetchRequest::new(symbol(raw), DataCategory::Quote)
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success() {
    let finnhub = Arc::new(
        ScriptedProvider::new("FINNHUB", EQUITIES, QUOTE, |call| {
            if call.index < 2 {
                Step::Reply(Err(unavailable("FINNHUB")))
            } else {
                Step::Reply(Ok(quote("FINNHUB", dec!(190.5))))
            }
        })
        .keyed(),
    );

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["k1"]);
    let registry = ProviderRegistry::new(vec![descriptor(
        &finnhub,
        settings(Duration::from_secs(5), 2),
    )]);
    let executor = FailoverExecutor::new(registry, keys, 4);

    let result = executor
        .fetch(quote_request("AAPL"), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(result.provider.as_deref(), Some("FINNHUB"));
    assert_eq!(result.diagnostics.error_count("FINNHUB"), 2);
    assert_eq!(
        result.payload().and_then(|p| p.as_quote()).map(|q| q.price),
        Some(dec!(190.5))
    );

    let keys_used: Vec<_> = finnhub.calls().into_iter().map(|c| c.key).collect();
    assert_eq!(keys_used, vec![Some("k1".to_string()); 3]);

    let status = executor.rotator().status("FINNHUB");
    assert_eq!(status[0].consecutive_failures, 0);
    assert!(!status[0].in_use);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_falls_back_to_next_provider() {
    let finnhub = Arc::new(
        ScriptedProvider::new("FINNHUB", EQUITIES, QUOTE, |_| {
            Step::Stall(Duration::from_secs(30))
        })
        .priority(1)
        .keyed(),
    );
    let yahoo = Arc::new(
        ScriptedProvider::new("YAHOO", &InstrumentKind::KNOWN, QUOTE, |_| {
            Step::Reply(Ok(quote("YAHOO", dec!(189.9))))
        })
        .priority(5),
    );

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["k1"]);
    let registry = ProviderRegistry::new(vec![
        descriptor(&finnhub, settings(Duration::from_secs(2), 0)),
        descriptor(&yahoo, settings(Duration::from_secs(2), 0)),
    ]);
    let executor = FailoverExecutor::new(registry, keys, 4);

    let result = executor
        .fetch(quote_request("AAPL"), &CancellationToken::new())
        .await;

    assert_eq!(result.provider.as_deref(), Some("YAHOO"));
    assert_eq!(
        result.diagnostics.summary(),
        "FINNHUB: ERROR (Timeout: FINNHUB) -> YAHOO: SUCCESS"
    );
    assert_eq!(finnhub.call_count(), 1);
    assert_eq!(executor.rotator().status("FINNHUB")[0].consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_chain_cools_down_and_recovers() {
    let script = |id: &'static str| {
        move |call: &common::Call| {
            if call.index == 0 {
                Step::Reply(Err(rate_limited(id)))
            } else {
                Step::Reply(Ok(quote(id, dec!(65000))))
            }
        }
    };
    let coingecko = Arc::new(
        ScriptedProvider::new("COINGECKO", CRYPTO, QUOTE, script("COINGECKO"))
            .priority(2)
            .keyed(),
    );
    let coindesk = Arc::new(
        ScriptedProvider::new("COINDESK", CRYPTO, QUOTE, script("COINDESK"))
            .priority(3)
            .keyed(),
    );

    let mut keys = rotator();
    register(&mut keys, "COINGECKO", &["cg-1"]);
    register(&mut keys, "COINDESK", &["cd-1"]);
    let registry = ProviderRegistry::new(vec![
        descriptor(&coingecko, settings(Duration::from_secs(5), 2)),
        descriptor(&coindesk, settings(Duration::from_secs(5), 2)),
    ]);
    let executor = FailoverExecutor::new(registry, keys, 4);
    let cancel = CancellationToken::new();

    let first = executor.fetch(quote_request("BTC"), &cancel).await;
    assert!(matches!(first.outcome, FetchOutcome::Exhausted { .. }));
    assert_eq!(
        first.diagnostics.summary(),
        "COINGECKO: ERROR (Rate limited: COINGECKO) -> COINGECKO: SKIPPED (all credentials cooling down) \
         -> COINDESK: ERROR (Rate limited: COINDESK) -> COINDESK: SKIPPED (all credentials cooling down)"
    );
    assert!(executor.rotator().all_cooling("COINGECKO"));
    assert!(executor.rotator().all_cooling("COINDESK"));

    // Cooling credentials are not called at all
    let second = executor.fetch(quote_request("BTC"), &cancel).await;
    assert!(!second.is_success());
    assert_eq!(coingecko.call_count(), 1);
    assert_eq!(coindesk.call_count(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    let third = executor.fetch(quote_request("BTC"), &cancel).await;
    assert_eq!(third.provider.as_deref(), Some("COINGECKO"));
    assert_eq!(coingecko.call_count(), 2);
    assert_eq!(coindesk.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_credential_cools_and_next_fetch_uses_other_key() {
    let finnhub = Arc::new(
        ScriptedProvider::new("FINNHUB", EQUITIES, QUOTE, |call| match call.key.as_deref() {
            Some("k1") => Step::Reply(Err(unavailable("FINNHUB"))),
            _ => Step::Reply(Ok(quote("FINNHUB", dec!(410)))),
        })
        .keyed(),
    );

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["k1", "k2"]);
    let registry = ProviderRegistry::new(vec![descriptor(
        &finnhub,
        settings(Duration::from_secs(5), 2),
    )]);
    let executor = FailoverExecutor::new(registry, keys, 4);
    let cancel = CancellationToken::new();

    let first = executor.fetch(quote_request("MSFT"), &cancel).await;
    assert!(!first.is_success());
    assert_eq!(first.diagnostics.error_count("FINNHUB"), 3);

    let status = executor.rotator().status("FINNHUB");
    assert!(status[0].cooling_for.is_some());
    assert!(status[1].cooling_for.is_none());

    let second = executor.fetch(quote_request("MSFT"), &cancel).await;
    assert!(second.is_success());

    let keys_used: Vec<_> = finnhub
        .calls()
        .into_iter()
        .filter_map(|c| c.key)
        .collect();
    assert_eq!(keys_used, vec!["k1", "k1", "k1", "k2"]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_spills_onto_next_credential() {
    let finnhub = Arc::new(
        ScriptedProvider::new("FINNHUB", EQUITIES, QUOTE, |call| match call.key.as_deref() {
            Some("k1") => Step::Reply(Err(unavailable("FINNHUB"))),
            _ => Step::Reply(Ok(quote("FINNHUB", dec!(410)))),
        })
        .keyed(),
    );

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["k1", "k2"]);
    let registry = ProviderRegistry::new(vec![descriptor(
        &finnhub,
        settings(Duration::from_secs(5), 3),
    )]);
    let executor = FailoverExecutor::new(registry, keys, 4);

    let result = executor
        .fetch(quote_request("MSFT"), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    let keys_used: Vec<_> = finnhub
        .calls()
        .into_iter()
        .filter_map(|c| c.key)
        .collect();
    assert_eq!(keys_used, vec!["k1", "k1", "k1", "k2"]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_switches_credential_without_backoff() {
    let finnhub = Arc::new(
        ScriptedProvider::new("FINNHUB", EQUITIES, QUOTE, |call| match call.key.as_deref() {
            Some("k1") => Step::Reply(Err(rate_limited("FINNHUB"))),
            _ => Step::Reply(Ok(quote("FINNHUB", dec!(175)))),
        })
        .keyed(),
    );

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["k1", "k2"]);
    let registry = ProviderRegistry::new(vec![descriptor(
        &finnhub,
        settings(Duration::from_secs(5), 1),
    )]);
    let executor = FailoverExecutor::new(registry, keys, 4);

    let result = executor
        .fetch(quote_request("NVDA"), &CancellationToken::new())
        .await;

    assert_eq!(
        result.diagnostics.summary(),
        "FINNHUB: ERROR (Rate limited: FINNHUB) -> FINNHUB: SUCCESS"
    );
    let status = executor.rotator().status("FINNHUB");
    assert!(status[0].cooling_for.is_some());
    assert_eq!(status[0].cooldown_streak, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_call_and_releases_lease() {
    let finnhub = Arc::new(
        ScriptedProvider::new("FINNHUB", EQUITIES, QUOTE, |_| {
            Step::Stall(Duration::from_secs(60))
        })
        .keyed(),
    );

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["k1"]);
    let registry = ProviderRegistry::new(vec![descriptor(
        &finnhub,
        settings(Duration::from_secs(120), 2),
    )]);
    let executor = FailoverExecutor::new(registry, keys, 4);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let result = executor.fetch(quote_request("AAPL"), &cancel).await;

    assert!(matches!(result.outcome, FetchOutcome::Cancelled));
    assert_eq!(finnhub.call_count(), 1);
    let status = executor.rotator().status("FINNHUB");
    assert!(!status[0].in_use);
    assert_eq!(status[0].consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_credential_never_runs_concurrently() {
    let finnhub = Arc::new(
        ScriptedProvider::new("FINNHUB", EQUITIES, QUOTE, |_| {
            Step::Stall(Duration::from_millis(50))
        })
        .keyed(),
    );
    let yahoo = Arc::new(ScriptedProvider::new(
        "YAHOO",
        &InstrumentKind::KNOWN,
        QUOTE,
        |_| Step::Stall(Duration::from_millis(50)),
    ));

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["only-key"]);
    let registry = ProviderRegistry::new(vec![descriptor(
        &finnhub,
        settings(Duration::from_secs(5), 0),
    )]);
    let executor = FailoverExecutor::new(registry, keys, 8);

    let requests = ["AAPL", "MSFT", "NVDA", "TSLA", "AMZN"]
        .into_iter()
        .map(quote_request)
        .collect();
    let results = executor.fetch_all(requests, &CancellationToken::new()).await;

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(finnhub.call_count(), 5);
    assert_eq!(finnhub.max_in_flight(), 1);

    // Keyless provider: bounded by the global permit count instead
    let registry = ProviderRegistry::new(vec![descriptor(
        &yahoo,
        settings(Duration::from_secs(5), 0),
    )]);
    let executor = FailoverExecutor::new(registry, rotator(), 2);
    let requests = ["AAPL", "MSFT", "NVDA", "TSLA", "AMZN", "META"]
        .into_iter()
        .map(quote_request)
        .collect();
    let results = executor.fetch_all(requests, &CancellationToken::new()).await;

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(yahoo.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_over_mixed_watchlist() {
    let coingecko = Arc::new(
        ScriptedProvider::new("COINGECKO", CRYPTO, QUOTE, |_| {
            Step::Reply(Ok(quote("COINGECKO", dec!(65000))))
        })
        .priority(2),
    );
    let coindesk = Arc::new(
        ScriptedProvider::new("COINDESK", CRYPTO, &[DataCategory::News], |_| {
            Step::Reply(Ok(news("CoinDesk", &["Bitcoin ETF inflows surge"])))
        })
        .priority(3),
    );
    let finnhub = Arc::new(
        ScriptedProvider::new(
            "FINNHUB",
            EQUITIES,
            &[DataCategory::Quote, DataCategory::News],
            |call| match (call.symbol.as_str(), call.category) {
                ("00700", DataCategory::Quote) => {
                    Step::Reply(Err(MarketDataError::SymbolNotFound("00700".to_string())))
                }
                (_, DataCategory::News) => {
                    Step::Reply(Ok(news("Reuters", &["Earnings beat expectations"])))
                }
                _ => Step::Reply(Ok(quote("FINNHUB", dec!(190)))),
            },
        )
        .priority(1)
        .keyed(),
    );
    let yahoo = Arc::new(
        ScriptedProvider::new("YAHOO", &InstrumentKind::KNOWN, QUOTE, |_| {
            Step::Reply(Ok(quote("YAHOO", dec!(320))))
        })
        .priority(5),
    );

    let mut keys = rotator();
    register(&mut keys, "FINNHUB", &["k1", "k2"]);
    let timeout = settings(Duration::from_secs(5), 1);
    let registry = ProviderRegistry::new(vec![
        descriptor(&finnhub, timeout.clone()),
        descriptor(&coingecko, timeout.clone()),
        descriptor(&coindesk, timeout.clone()),
        descriptor(&yahoo, timeout),
    ]);
    let executor = FailoverExecutor::new(registry, keys, 4);
    let aggregator = Aggregator::new(
        SymbolClassifier::new(),
        executor,
        vec![DataCategory::Quote, DataCategory::News],
    )
    .with_market_overview(true);

    let report = aggregator
        .run_cycle(&["BTC", "hk00700", "AAPL", "b@d"], &CancellationToken::new())
        .await;

    assert!(!report.cancelled);
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.present_count(), 6);
    assert_eq!(report.absent_count(), 2);

    let providers = |i: usize| {
        let record = &report.records[i];
        (
            record.provider(DataCategory::Quote).map(|p| p.to_string()),
            record.provider(DataCategory::News).map(|p| p.to_string()),
        )
    };
    assert_eq!(
        providers(0),
        (Some("COINGECKO".to_string()), Some("COINDESK".to_string()))
    );
    assert_eq!(
        providers(1),
        (Some("YAHOO".to_string()), Some("FINNHUB".to_string()))
    );
    assert_eq!(
        providers(2),
        (Some("FINNHUB".to_string()), Some("FINNHUB".to_string()))
    );
    assert_eq!(
        report.records[3].entry(DataCategory::Quote),
        Some(&RecordEntry::Absent {
            reason: AbsenceReason::ClassificationUnknown
        })
    );

    let indices: Vec<&str> = report
        .market_overview
        .iter()
        .map(|s| s.index.symbol.code.as_ref())
        .collect();
    assert!(indices.contains(&"^HSI"));
    assert!(indices.contains(&"^GSPC"));
    assert!(indices.contains(&"BTC"));
    assert!(report.market_overview.iter().all(|s| s.quote.is_some()));
}
