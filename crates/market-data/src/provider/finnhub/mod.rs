//! Finnhub market data provider implementation.
//!
//! This module provides equity data from the Finnhub API:
//! - Latest quotes via /quote
//! - Company fundamentals via /stock/profile2 and /stock/metric
//! - Company news via /company-news
//!
//! Finnhub free tier is limited to 60 API calls per minute and per key.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{
    Article, DataCategory, Exchange, Fundamentals, InstrumentKind, Quote, Symbol,
};
use crate::provider::{decimal, MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::registry::ApiKey;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";

/// Days of company news requested per call.
const NEWS_LOOKBACK_DAYS: i64 = 7;
const MAX_NEWS_ITEMS: usize = 10;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Change
    d: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// High price of the day
    h: Option<f64>,
    /// Low price of the day
    l: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Response from /stock/profile2 endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    name: Option<String>,
    /// Finnhub industry classification
    finnhub_industry: Option<String>,
    country: Option<String>,
    weburl: Option<String>,
    /// Market capitalization (in millions)
    market_capitalization: Option<f64>,
}

/// Response from /stock/metric endpoint
#[derive(Debug, Default, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    metric: Metrics,
}

#[derive(Debug, Default, Deserialize)]
struct Metrics {
    #[serde(rename = "peTTM")]
    pe_ttm: Option<f64>,
    #[serde(rename = "peBasicExclExtraTTM")]
    pe_basic: Option<f64>,
    #[serde(rename = "dividendYieldIndicatedAnnual")]
    dividend_yield: Option<f64>,
    #[serde(rename = "52WeekHigh")]
    week_52_high: Option<f64>,
    #[serde(rename = "52WeekLow")]
    week_52_low: Option<f64>,
}

/// Item of the /company-news response
#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    source: String,
    /// Unix timestamp
    datetime: Option<i64>,
}

/// Error response from Finnhub
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
///
/// Serves US, Hong Kong and China A-share equities. Every call needs a key;
/// the key comes from the lease the executor hands in.
pub struct FinnhubProvider {
    client: Client,
    base_url: String,
}

impl FinnhubProvider {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// Point the provider at another host (tests, proxies).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Make a GET request to the Finnhub API.
    async fn fetch(
        &self,
        key: Option<&ApiKey>,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let key = key.ok_or_else(|| MarketDataError::Unauthorized {
            provider: PROVIDER_ID.to_string(),
        })?;
        let url = format!("{}{}", self.base_url, endpoint);

        debug!(
            "Finnhub request: {} with {} params (key {})",
            endpoint,
            params.len(),
            key
        );

        let response = self
            .client
            .get(&url)
            // Header rather than query param keeps the key out of URLs in logs
            .header("X-Finnhub-Token", key.expose())
            .query(params)
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        if !status.is_success() {
            if let Some(message) = error_message(&body) {
                return Err(classify_error_message(&message));
            }
            return Err(MarketDataError::from_status(PROVIDER_ID, status, &body));
        }

        // Finnhub sometimes reports errors with a 200 status
        if let Some(message) = error_message(&body) {
            return Err(classify_error_message(&message));
        }

        Ok(body)
    }

    async fn fetch_metrics(&self, key: Option<&ApiKey>, ticker: &str) -> Result<Metrics, MarketDataError> {
        let text = self
            .fetch(key, "/stock/metric", &[("symbol", ticker), ("metric", "all")])
            .await?;
        let response: MetricResponse = serde_json::from_str(&text).map_err(|e| {
            MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse metric response: {}", e))
        })?;
        Ok(response.metric)
    }
}

impl Default for FinnhubProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Ticker in Finnhub notation ("AAPL", "00700.HK", "600519.SS").
fn finnhub_ticker(symbol: &Symbol) -> String {
    match (symbol.kind, symbol.exchange) {
        (InstrumentKind::HkEquity, _) => format!("{:0>5}.HK", symbol.code),
        (InstrumentKind::CnAShare, Some(Exchange::Shanghai)) => format!("{}.SS", symbol.code),
        (InstrumentKind::CnAShare, Some(Exchange::Shenzhen)) => format!("{}.SZ", symbol.code),
        (InstrumentKind::CnAShare, Some(Exchange::Beijing)) => format!("{}.BJ", symbol.code),
        _ => symbol.code.to_uppercase(),
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
}

fn classify_error_message(message: &str) -> MarketDataError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("limit") {
        MarketDataError::RateLimited {
            provider: PROVIDER_ID.to_string(),
        }
    } else if lower.contains("invalid api key") || lower.contains("api key required") {
        MarketDataError::Unauthorized {
            provider: PROVIDER_ID.to_string(),
        }
    } else if lower.contains("access") {
        // Premium-only endpoint or market
        MarketDataError::NotSupported {
            operation: message.to_string(),
            provider: PROVIDER_ID.to_string(),
        }
    } else {
        MarketDataError::unavailable(PROVIDER_ID, message)
    }
}

fn parse_quote(text: &str, symbol: &Symbol) -> Result<Quote, MarketDataError> {
    let response: QuoteResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse quote response: {}", e))
    })?;

    let price = response.c.unwrap_or(0.0);
    // Finnhub returns zeros for unknown symbols instead of an error
    if price == 0.0 && response.o.unwrap_or(0.0) == 0.0 {
        return Err(MarketDataError::SymbolNotFound(format!(
            "{}: no trading data for {}",
            PROVIDER_ID, symbol.code
        )));
    }

    let price = decimal(price)
        .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, format!("Invalid price: {}", price)))?;
    let timestamp = response
        .t
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    let mut quote = Quote::new(
        timestamp,
        price,
        symbol.kind.default_currency().to_string(),
        PROVIDER_ID.to_string(),
    );
    quote.open = response.o.and_then(decimal);
    quote.high = response.h.and_then(decimal);
    quote.low = response.l.and_then(decimal);
    quote.change = response.d.and_then(decimal);
    quote.change_percent = response.dp.and_then(decimal);

    Ok(match response.pc.and_then(decimal) {
        Some(previous_close) => quote.with_previous_close(previous_close),
        None => quote,
    })
}

fn parse_profile(text: &str, symbol: &Symbol) -> Result<Fundamentals, MarketDataError> {
    let profile: ProfileResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse profile response: {}", e))
    })?;

    // Unknown tickers come back as an empty object
    if profile.name.as_deref().unwrap_or("").is_empty() {
        return Err(MarketDataError::SymbolNotFound(format!(
            "{}: no profile for {}",
            PROVIDER_ID, symbol.code
        )));
    }

    let mut fundamentals = Fundamentals::from_source(PROVIDER_ID);
    fundamentals.name = profile.name;
    fundamentals.industry = profile.finnhub_industry.filter(|s| !s.is_empty());
    fundamentals.country = profile.country.filter(|s| !s.is_empty());
    fundamentals.website = profile.weburl.filter(|s| !s.is_empty());
    fundamentals.market_cap = profile.market_capitalization.map(|m| m * 1_000_000.0);
    Ok(fundamentals)
}

fn apply_metrics(fundamentals: &mut Fundamentals, metrics: Metrics) {
    fundamentals.pe_ratio = metrics.pe_ttm.or(metrics.pe_basic);
    fundamentals.dividend_yield = metrics.dividend_yield;
    fundamentals.week_52_high = metrics.week_52_high;
    fundamentals.week_52_low = metrics.week_52_low;
}

fn parse_news(text: &str) -> Result<Vec<Article>, MarketDataError> {
    let items: Vec<NewsItem> = serde_json::from_str(text).map_err(|e| {
        MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse news response: {}", e))
    })?;

    Ok(items
        .into_iter()
        .take(MAX_NEWS_ITEMS)
        .map(|item| {
            let source = if item.source.is_empty() {
                "Finnhub".to_string()
            } else {
                item.source
            };
            Article::new(item.headline, source)
                .with_summary(item.summary)
                .with_url(item.url)
                .published(item.datetime.and_then(|ts| Utc.timestamp_opt(ts, 0).single()))
        })
        .collect())
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            instrument_kinds: &[
                InstrumentKind::UsEquity,
                InstrumentKind::HkEquity,
                InstrumentKind::CnAShare,
            ],
            categories: &[
                DataCategory::Quote,
                DataCategory::Fundamentals,
                DataCategory::News,
            ],
            requires_credentials: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            max_concurrency: 5,
            min_delay: Duration::from_millis(100),
        }
    }

    async fn get_quote(&self, key: Option<&ApiKey>, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        let ticker = finnhub_ticker(symbol);
        debug!("Fetching quote for {} from Finnhub", ticker);

        let text = self.fetch(key, "/quote", &[("symbol", ticker.as_str())]).await?;
        parse_quote(&text, symbol)
    }

    async fn get_fundamentals(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Fundamentals, MarketDataError> {
        let ticker = finnhub_ticker(symbol);
        debug!("Fetching fundamentals for {} from Finnhub", ticker);

        let text = self.fetch(key, "/stock/profile2", &[("symbol", ticker.as_str())]).await?;
        let mut fundamentals = parse_profile(&text, symbol)?;

        match self.fetch_metrics(key, &ticker).await {
            Ok(metrics) => apply_metrics(&mut fundamentals, metrics),
            // Credential problems must reach the rotator
            Err(e @ (MarketDataError::RateLimited { .. } | MarketDataError::Unauthorized { .. })) => {
                return Err(e)
            }
            Err(e) => warn!("Finnhub metrics unavailable for {}: {}", ticker, e),
        }

        Ok(fundamentals)
    }

    async fn get_news(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Vec<Article>, MarketDataError> {
        let ticker = finnhub_ticker(symbol);
        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(NEWS_LOOKBACK_DAYS);
        let (from, to) = (from.format("%Y-%m-%d").to_string(), to.format("%Y-%m-%d").to_string());

        debug!("Fetching news for {} from Finnhub ({} to {})", ticker, from, to);

        let text = self
            .fetch(
                key,
                "/company-news",
                &[("symbol", ticker.as_str()), ("from", from.as_str()), ("to", to.as_str())],
            )
            .await?;
        parse_news(&text)
    }
}
