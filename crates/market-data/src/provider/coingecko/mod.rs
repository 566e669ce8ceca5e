//! CoinGecko crypto provider.
//!
//! Quotes and coin fundamentals from the /coins/markets endpoint. A demo key
//! is optional; without one the public rate limit applies.
//! API documentation: https://docs.coingecko.com/reference/coins-markets

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{DataCategory, Fundamentals, InstrumentKind, Quote, Symbol};
use crate::provider::{decimal, MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::registry::ApiKey;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const PROVIDER_ID: &str = "COINGECKO";

lazy_static! {
    /// Ticker to CoinGecko coin id. Tickers are ambiguous on CoinGecko, ids are not.
    static ref COIN_IDS: HashMap<&'static str, &'static str> = [
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("BNB", "binancecoin"),
        ("SOL", "solana"),
        ("XRP", "ripple"),
        ("ADA", "cardano"),
        ("DOGE", "dogecoin"),
        ("DOT", "polkadot"),
        ("MATIC", "matic-network"),
        ("LTC", "litecoin"),
        ("TRX", "tron"),
        ("AVAX", "avalanche-2"),
        ("SHIB", "shiba-inu"),
        ("UNI", "uniswap"),
        ("LINK", "chainlink"),
        ("ATOM", "cosmos"),
        ("XLM", "stellar"),
        ("ETC", "ethereum-classic"),
        ("BCH", "bitcoin-cash"),
        ("NEAR", "near"),
        ("APT", "aptos"),
        ("ARB", "arbitrum"),
        ("FIL", "filecoin"),
        ("TON", "the-open-network"),
        ("PEPE", "pepe"),
        ("SUI", "sui"),
        ("USDT", "tether"),
        ("USDC", "usd-coin"),
    ]
    .into_iter()
    .collect();
}

/// Item of the /coins/markets response
#[derive(Debug, Deserialize)]
struct MarketItem {
    name: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
    total_volume: Option<f64>,
    high_24h: Option<f64>,
    low_24h: Option<f64>,
    price_change_24h: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    circulating_supply: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}

/// CoinGecko market data provider.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
}

impl CoinGeckoProvider {
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

    /// Fetch the market row of one coin.
    async fn fetch_market(&self, key: Option<&ApiKey>, symbol: &Symbol) -> Result<MarketItem, MarketDataError> {
        let base = symbol.base_asset().to_ascii_uppercase();
        let lookup = match COIN_IDS.get(base.as_str()) {
            Some(id) => ("ids", id.to_string()),
            None => ("symbols", base.to_ascii_lowercase()),
        };

        debug!("CoinGecko request: /coins/markets {}={}", lookup.0, lookup.1);

        let mut request = self
            .client
            .get(format!("{}/coins/markets", self.base_url))
            .query(&[("vs_currency", "usd"), (lookup.0, lookup.1.as_str())]);
        if let Some(key) = key {
            request = request.header("x-cg-demo-api-key", key.expose());
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

        parse_market(&body, &base)
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_market(body: &str, base: &str) -> Result<MarketItem, MarketDataError> {
    let items: Vec<MarketItem> = serde_json::from_str(body).map_err(|e| {
        MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse markets response: {}", e))
    })?;

    // With a `symbols` lookup several coins may share a ticker; the list is
    // ordered by market cap, so the first is the one people mean.
    items
        .into_iter()
        .next()
        .ok_or_else(|| MarketDataError::SymbolNotFound(format!("{}: {}", PROVIDER_ID, base)))
}

fn to_quote(item: &MarketItem) -> Result<Quote, MarketDataError> {
    let price = item.current_price.and_then(decimal).ok_or_else(|| {
        MarketDataError::malformed(PROVIDER_ID, "missing current_price")
    })?;

    let mut quote = Quote::new(
        item.last_updated.unwrap_or_else(Utc::now),
        price,
        "USD".to_string(),
        PROVIDER_ID.to_string(),
    );
    quote.high = item.high_24h.and_then(decimal);
    quote.low = item.low_24h.and_then(decimal);
    quote.change = item.price_change_24h.and_then(decimal);
    quote.change_percent = item.price_change_percentage_24h.and_then(decimal);
    quote.volume = item.total_volume.and_then(decimal);
    Ok(quote)
}

fn to_fundamentals(item: MarketItem) -> Fundamentals {
    let mut fundamentals = Fundamentals::from_source(PROVIDER_ID);
    fundamentals.price = item.current_price.and_then(decimal);
    fundamentals.change_percent = item.price_change_percentage_24h.and_then(decimal);
    fundamentals.name = item.name;
    fundamentals.market_cap = item.market_cap.filter(|cap| *cap > 0.0);
    fundamentals.rank = item.market_cap_rank;
    fundamentals.circulating_supply = item.circulating_supply;
    fundamentals
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        2
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            instrument_kinds: &[InstrumentKind::Crypto],
            categories: &[DataCategory::Quote, DataCategory::Fundamentals],
            requires_credentials: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        // Public tier: roughly 30 calls per minute
        RateLimit {
            requests_per_minute: 30,
            max_concurrency: 2,
            min_delay: Duration::from_millis(500),
        }
    }

    async fn get_quote(&self, key: Option<&ApiKey>, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        let item = self.fetch_market(key, symbol).await?;
        to_quote(&item)
    }

    async fn get_fundamentals(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Fundamentals, MarketDataError> {
        let item = self.fetch_market(key, symbol).await?;
        Ok(to_fundamentals(item))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    const BITCOIN: &str = r#"[{
        "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
        "current_price": 65000.5, "market_cap": 1280000000000, "market_cap_rank": 1,
        "total_volume": 31000000000, "high_24h": 66000, "low_24h": 64000,
        "price_change_24h": 1200.5, "price_change_percentage_24h": 1.88,
        "circulating_supply": 19650000, "last_updated": "2026-03-02T08:00:00.000Z"
    }]"#;

    #[test]
    fn test_parse_quote() {
        let item = parse_market(BITCOIN, "BTC").unwrap();
        let quote = to_quote(&item).unwrap();
        assert_eq!(quote.price, dec!(65000.5));
        assert_eq!(quote.change_percent, Some(dec!(1.88)));
        assert_eq!(quote.high, Some(dec!(66000)));
        assert_eq!(quote.currency, "USD");
        assert_eq!(quote.timestamp.to_rfc3339(), "2026-03-02T08:00:00+00:00");
    }

    #[test]
    fn test_parse_fundamentals() {
        let item = parse_market(BITCOIN, "BTC").unwrap();
        let fundamentals = to_fundamentals(item);
        assert_eq!(fundamentals.name.as_deref(), Some("Bitcoin"));
        assert_eq!(fundamentals.rank, Some(1));
        assert_eq!(fundamentals.market_cap, Some(1_280_000_000_000.0));
        assert_eq!(fundamentals.price, Some(dec!(65000.5)));
        assert!(!fundamentals.is_empty());
    }

    #[test]
    fn test_empty_list_is_symbol_not_found() {
        let err = parse_market("[]", "ZZZ").err();
        assert!(matches!(err, Some(MarketDataError::SymbolNotFound(_))));
    }

    #[test]
    fn test_missing_price_is_malformed() {
        let item = parse_market(r#"[{"name":"Bitcoin"}]"#, "BTC").unwrap();
        assert!(matches!(to_quote(&item), Err(MarketDataError::Malformed { .. })));
    }

    #[test]
    fn test_coin_ids_cover_known_tickers() {
        assert_eq!(COIN_IDS.get("BTC"), Some(&"bitcoin"));
        assert_eq!(COIN_IDS.get("LINK"), Some(&"chainlink"));
    }
}
