use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Company or coin fundamentals from market data providers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Provider that supplied this data (e.g., "FINNHUB", "COINGECKO")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Company/asset name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Industry classification (e.g., "Technology")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Country of domicile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Market capitalization in quote currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,

    /// Price-to-earnings ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,

    /// Dividend yield (as decimal, e.g., 0.025 for 2.5%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_high: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_low: Option<f64>,

    /// Circulating supply (crypto only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circulating_supply: Option<f64>,

    /// Market-cap rank (crypto only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    /// Current price, when the provider reports one alongside fundamentals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    /// Percent change over the last trading day / 24h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,
}

impl Fundamentals {
    /// Create an empty record attributed to a provider
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    /// True when the provider returned nothing useful
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.industry.is_none()
            && self.market_cap.is_none()
            && self.pe_ratio.is_none()
            && self.price.is_none()
    }
}
