//! Coindesk crypto provider.
//!
//! - Price index ticks via /index/cc/v1/latest/tick
//! - Crypto news via /news/v1/article/list
//!
//! Most endpoints work without a key; a configured key raises the limits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{Article, DataCategory, InstrumentKind, Quote, Sentiment, Symbol};
use crate::provider::{decimal, MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::registry::ApiKey;

const BASE_URL: &str = "https://api.coindesk.com";
const PROVIDER_ID: &str = "COINDESK";
const NEWS_PAGE_SIZE: &str = "50";
const MAX_NEWS_ITEMS: usize = 10;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Tick {
    index: Option<IndexValue>,
    ohlc: Option<Ohlc>,
}

#[derive(Debug, Deserialize)]
struct IndexValue {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Ohlc {
    #[serde(rename = "open24h")]
    open_24h: Option<f64>,
    #[serde(rename = "high24h")]
    high_24h: Option<f64>,
    #[serde(rename = "low24h")]
    low_24h: Option<f64>,
    #[serde(rename = "change24h")]
    change_24h: Option<f64>,
    #[serde(rename = "changepct24h")]
    change_pct_24h: Option<f64>,
    #[serde(rename = "volume24h")]
    volume_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ArticleList {
    #[serde(default)]
    articles: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: String,
    #[serde(rename = "abstract", default)]
    summary: String,
    #[serde(default)]
    url: String,
    date: Option<String>,
    /// POSITIVE / NEUTRAL / NEGATIVE when the article is tagged
    sentiment: Option<String>,
}

/// Coindesk index symbol for a base asset. Coindesk quotes bitcoin as XBT.
fn index_code(base: &str) -> String {
    match base {
        "BTC" => "XBT".to_string(),
        other => other.to_string(),
    }
}

/// Words that mark an article as being about `base`.
fn topic_words(base: &str) -> Vec<String> {
    let mut words = vec![base.to_ascii_lowercase()];
    let name = match base {
        "BTC" => Some("bitcoin"),
        "ETH" => Some("ethereum"),
        "SOL" => Some("solana"),
        "XRP" => Some("ripple"),
        "DOGE" => Some("dogecoin"),
        "ADA" => Some("cardano"),
        "BNB" => Some("binance"),
        "LTC" => Some("litecoin"),
        "BCH" => Some("bitcoin cash"),
        _ => None,
    };
    words.extend(name.map(str::to_string));
    words
}

/// Coindesk market data provider.
pub struct CoindeskProvider {
    client: Client,
    base_url: String,
}

impl CoindeskProvider {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

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

    async fn fetch<T: DeserializeOwned>(
        &self,
        key: Option<&ApiKey>,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, MarketDataError> {
        debug!("Coindesk request: {} with {} params", path, params.len());

        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params);
        if let Some(key) = key {
            request = request.header("authorization", format!("Apikey {}", key.expose()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        if !status.is_success() {
            return Err(MarketDataError::from_status(PROVIDER_ID, status, &body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse {} response: {}", path, e))
        })?;
        envelope
            .data
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, format!("{}: missing data", path)))
    }
}

impl Default for CoindeskProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn tick_to_quote(symbol: &Symbol, tick: Tick) -> Result<Quote, MarketDataError> {
    let price = tick
        .index
        .and_then(|i| i.value)
        .filter(|v| *v > 0.0)
        .and_then(decimal)
        .ok_or_else(|| {
            MarketDataError::SymbolNotFound(format!("{}: no index value for {}", PROVIDER_ID, symbol.code))
        })?;

    let mut quote = Quote::new(Utc::now(), price, "USD".to_string(), PROVIDER_ID.to_string());
    if let Some(ohlc) = tick.ohlc {
        quote.open = ohlc.open_24h.and_then(decimal);
        quote.high = ohlc.high_24h.and_then(decimal);
        quote.low = ohlc.low_24h.and_then(decimal);
        quote.change = ohlc.change_24h.and_then(decimal);
        quote.change_percent = ohlc.change_pct_24h.and_then(decimal);
        quote.volume = ohlc.volume_24h.and_then(decimal);
    }
    Ok(quote)
}

/// Articles about `base`, newest first as served, capped.
fn relevant_articles(list: ArticleList, base: &str) -> Vec<Article> {
    let words = topic_words(base);
    list.articles
        .into_iter()
        .filter(|item| {
            let text = format!("{} {}", item.title, item.summary).to_ascii_lowercase();
            words.iter().any(|word| text.contains(word.as_str()))
        })
        .take(MAX_NEWS_ITEMS)
        .map(|item| {
            let published = item
                .date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.with_timezone(&Utc));
            Article::new(item.title, "CoinDesk")
                .with_summary(item.summary)
                .with_url(item.url)
                .published(published)
                .with_sentiment(item.sentiment.as_deref().and_then(Sentiment::from_label))
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for CoindeskProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        3
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            instrument_kinds: &[InstrumentKind::Crypto],
            categories: &[DataCategory::Quote, DataCategory::News],
            requires_credentials: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            max_concurrency: 3,
            min_delay: Duration::from_millis(200),
        }
    }

    async fn get_quote(&self, key: Option<&ApiKey>, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        let index = format!("{}-USD", index_code(symbol.base_asset()));
        let tick: Tick = self
            .fetch(
                key,
                "/index/cc/v1/latest/tick",
                &[("index", index.as_str()), ("precision", "2")],
            )
            .await?;
        tick_to_quote(symbol, tick)
    }

    async fn get_news(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Vec<Article>, MarketDataError> {
        let list: ArticleList = self
            .fetch(key, "/news/v1/article/list", &[("limit", NEWS_PAGE_SIZE)])
            .await?;
        Ok(relevant_articles(list, symbol.base_asset()))
    }
}
