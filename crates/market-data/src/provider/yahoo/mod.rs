//! Yahoo Finance market data provider.
//!
//! Keyless quotes for every instrument kind through the `yahoo_finance_api`
//! connector:
//! - Equities in Yahoo notation (AAPL, 0700.HK, 600519.SS)
//! - Cryptocurrencies as USD pairs (BTC-USD)
//! - Broad-market indices (^GSPC, ^HSI)

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use crate::errors::MarketDataError;
use crate::models::{DataCategory, InstrumentKind, Quote, Symbol};
use crate::provider::{decimal, MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::registry::ApiKey;

const PROVIDER_ID: &str = "YAHOO";

/// Yahoo Finance market data provider.
pub struct YahooProvider {
    connector: yahoo::YahooConnector,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider.
    pub fn new() -> Result<Self, MarketDataError> {
        let connector = yahoo::YahooConnector::new().map_err(|e| {
            MarketDataError::unavailable(
                PROVIDER_ID,
                format!("Failed to initialize Yahoo connector: {}", e),
            )
        })?;
        Ok(Self { connector })
    }

    fn map_error(ticker: &str, error: yahoo::YahooError) -> MarketDataError {
        match error {
            yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult => {
                MarketDataError::SymbolNotFound(format!("{}: {}", PROVIDER_ID, ticker))
            }
            other => {
                let message = other.to_string();
                if message.contains("429") || message.to_ascii_lowercase().contains("too many") {
                    MarketDataError::RateLimited {
                        provider: PROVIDER_ID.to_string(),
                    }
                } else {
                    MarketDataError::unavailable(PROVIDER_ID, message)
                }
            }
        }
    }
}

/// Ticker in Yahoo notation.
fn yahoo_ticker(symbol: &Symbol) -> String {
    match symbol.kind {
        InstrumentKind::Crypto => format!("{}-USD", symbol.base_asset()),
        _ => symbol.suffixed_ticker(),
    }
}

/// The fields we read from a Yahoo bar.
#[derive(Clone, Copy, Debug)]
struct Bar {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

impl From<&yahoo::Quote> for Bar {
    fn from(quote: &yahoo::Quote) -> Self {
        Self {
            timestamp: quote.timestamp as i64,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            volume: quote.volume,
        }
    }
}

/// Convert the latest bar (and the one before it, for the previous close) to our Quote.
fn to_quote(symbol: &Symbol, latest: Bar, previous: Option<Bar>) -> Result<Quote, MarketDataError> {
    let timestamp: DateTime<Utc> = Utc
        .timestamp_opt(latest.timestamp, 0)
        .single()
        .ok_or_else(|| {
            MarketDataError::malformed(PROVIDER_ID, format!("Invalid timestamp: {}", latest.timestamp))
        })?;

    let price = decimal(latest.close).ok_or_else(|| {
        MarketDataError::malformed(PROVIDER_ID, format!("Invalid close price: {}", latest.close))
    })?;

    let mut quote = Quote::new(
        timestamp,
        price,
        symbol.kind.default_currency().to_string(),
        PROVIDER_ID.to_string(),
    );
    quote.open = decimal(latest.open);
    quote.high = decimal(latest.high);
    quote.low = decimal(latest.low);
    quote.volume = Decimal::from_u64(latest.volume);

    Ok(match previous.and_then(|bar| decimal(bar.close)) {
        Some(previous_close) => quote.with_previous_close(previous_close),
        None => quote,
    })
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        5
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
            requests_per_minute: 2000,
            max_concurrency: 10,
            min_delay: Duration::from_millis(50),
        }
    }

    async fn get_quote(&self, _key: Option<&ApiKey>, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        let ticker = yahoo_ticker(symbol);
        debug!("Fetching latest quote for {} from Yahoo", ticker);

        let response = self
            .connector
            .get_latest_quotes(&ticker, "1d")
            .await
            .map_err(|e| Self::map_error(&ticker, e))?;

        let bars = response.quotes().map_err(|e| {
            warn!("No quotes returned for {}: {}", ticker, e);
            MarketDataError::SymbolNotFound(format!("{}: {}", PROVIDER_ID, ticker))
        })?;

        let mut recent = bars.iter().rev();
        let latest = recent
            .next()
            .ok_or_else(|| MarketDataError::SymbolNotFound(format!("{}: {}", PROVIDER_ID, ticker)))?;
        to_quote(symbol, Bar::from(latest), recent.next().map(Bar::from))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::Exchange;

    fn bar(timestamp: i64, close: f64) -> Bar {
        Bar {
            timestamp,
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn test_ticker_formats() {
        let btc = Symbol::new("BTC", "BTC", InstrumentKind::Crypto, Some(Exchange::Crypto));
        assert_eq!(yahoo_ticker(&btc), "BTC-USD");

        let pair = Symbol::new("ETH-USDT", "ETH-USDT", InstrumentKind::Crypto, Some(Exchange::Crypto));
        assert_eq!(yahoo_ticker(&pair), "ETH-USD");

        let tencent = Symbol::new("hk00700", "00700", InstrumentKind::HkEquity, Some(Exchange::Hkex));
        assert_eq!(yahoo_ticker(&tencent), "0700.HK");

        let hsi = Symbol::index("^HSI", InstrumentKind::HkEquity, Some(Exchange::Hkex));
        assert_eq!(yahoo_ticker(&hsi), "^HSI");
    }

    #[test]
    fn test_quote_uses_previous_bar_as_previous_close() {
        let symbol = Symbol::new("hk00700", "00700", InstrumentKind::HkEquity, Some(Exchange::Hkex));
        let quote = to_quote(&symbol, bar(1772438400, 110.0), Some(bar(1772352000, 100.0))).unwrap();

        assert_eq!(quote.price, dec!(110));
        assert_eq!(quote.previous_close, Some(dec!(100)));
        assert_eq!(quote.change_percent, Some(dec!(10)));
        assert_eq!(quote.volume, Some(dec!(1000)));
        assert_eq!(quote.currency, "HKD");
        assert_eq!(quote.source, "YAHOO");
    }

    #[test]
    fn test_nan_close_is_malformed() {
        let symbol = Symbol::new("AAPL", "AAPL", InstrumentKind::UsEquity, Some(Exchange::Us));
        let err = to_quote(&symbol, bar(1772438400, f64::NAN), None).unwrap_err();
        assert!(matches!(err, MarketDataError::Malformed { .. }));
    }
}
