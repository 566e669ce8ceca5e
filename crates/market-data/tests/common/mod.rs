//! Scripted providers for end-to-end failover tests.

#![allow(dead_code)]

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use pulsewatch_market_data::errors::MarketDataError;
use pulsewatch_market_data::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
use pulsewatch_market_data::registry::{
    ApiKey, KeyRotator, KeyRotatorConfig, ProviderDescriptor, ProviderSettings,
};
use pulsewatch_market_data::{Article, DataCategory, InstrumentKind, Payload, Quote, Symbol};

/// What a scripted call does.
pub enum Step {
    Reply(Result<Payload, MarketDataError>),
    /// Sleep, then reply with a quote
    Stall(Duration),
}

/// One observed call.
#[derive(Clone, Debug)]
pub struct Call {
    pub index: usize,
    pub key: Option<String>,
    pub symbol: String,
    pub category: DataCategory,
}

type Script = dyn Fn(&Call) -> Step + Send + Sync;

pub struct ScriptedProvider {
    id: &'static str,
    priority: u8,
    kinds: &'static [InstrumentKind],
    categories: &'static [DataCategory],
    requires_credentials: bool,
    script: Box<Script>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(
        id: &'static str,
        kinds: &'static [InstrumentKind],
        categories: &'static [DataCategory],
        script: impl Fn(&Call) -> Step + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            priority: 10,
            kinds,
            categories,
            requires_credentials: false,
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn keyed(mut self) -> Self {
        self.requires_credentials = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the call is dropped by a timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            instrument_kinds: self.kinds,
            categories: self.categories,
            requires_credentials: self.requires_credentials,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 6000,
            max_concurrency: 4,
            min_delay: Duration::ZERO,
        }
    }

    async fn call(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
        category: DataCategory,
    ) -> Result<Payload, MarketDataError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let call = Call {
                index: calls.len(),
                key: key.map(|k| k.expose().to_string()),
                symbol: symbol.code.to_string(),
                category,
            };
            calls.push(call.clone());
            call
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match (self.script)(&call) {
            Step::Reply(result) => result,
            Step::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(quote(self.id, Decimal::ONE_HUNDRED))
            }
        }
    }
}

pub fn quote(source: &str, price: Decimal) -> Payload {
    Payload::Quote(Quote::new(
        Utc::now(),
        price,
        "USD".to_string(),
        source.to_string(),
    ))
}

pub fn news(source: &str, titles: &[&str]) -> Payload {
    Payload::News(
        titles
            .iter()
            .map(|title| Article::new(*title, source).published(Some(Utc::now())))
            .collect(),
    )
}

pub fn unavailable(provider: &str) -> MarketDataError {
    MarketDataError::Unavailable {
        provider: provider.to_string(),
        message: "HTTP 503 - upstream down".to_string(),
    }
}

pub fn rate_limited(provider: &str) -> MarketDataError {
    MarketDataError::RateLimited {
        provider: provider.to_string(),
    }
}

pub fn settings(timeout: Duration, max_retries: u32) -> ProviderSettings {
    ProviderSettings {
        timeout,
        max_retries,
        backoff_base: Duration::from_millis(100),
    }
}

pub fn descriptor(provider: &Arc<ScriptedProvider>, settings: ProviderSettings) -> ProviderDescriptor {
    ProviderDescriptor::new(provider.clone()).with_settings(settings)
}

pub fn rotator() -> KeyRotator {
    KeyRotator::with_config(KeyRotatorConfig {
        failure_threshold: 3,
        base_cooldown: Duration::from_secs(60),
        max_cooldown: Duration::from_secs(600),
        unauthorized_cooldown: Duration::from_secs(3600),
    })
}

pub fn register(rotator: &mut KeyRotator, provider: &'static str, keys: &[&str]) {
    rotator.register(
        Cow::Borrowed(provider),
        keys.iter().map(|k| ApiKey::new(*k)).collect(),
    );
}
