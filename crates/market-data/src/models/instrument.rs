use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::SymbolCode;

/// Instrument classification produced by the symbol classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentKind {
    Crypto,
    HkEquity,
    UsEquity,
    CnAShare,
    /// Matched no rule. Reported, never fetched.
    Unknown,
}

impl InstrumentKind {
    /// All kinds that can be fetched.
    pub const KNOWN: [InstrumentKind; 4] = [
        InstrumentKind::Crypto,
        InstrumentKind::HkEquity,
        InstrumentKind::UsEquity,
        InstrumentKind::CnAShare,
    ];

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Trading currency assumed when a provider does not report one.
    pub fn default_currency(&self) -> &'static str {
        match self {
            Self::HkEquity => "HKD",
            Self::CnAShare => "CNY",
            Self::Crypto | Self::UsEquity | Self::Unknown => "USD",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "CRYPTO",
            Self::HkEquity => "HK_EQUITY",
            Self::UsEquity => "US_EQUITY",
            Self::CnAShare => "CN_A_SHARE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchange hint attached to a classified symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Exchange {
    /// Any US venue (NYSE, NASDAQ, ...). The venue is not derivable from the ticker.
    Us,
    Hkex,
    Shanghai,
    Shenzhen,
    Beijing,
    Crypto,
}

impl Exchange {
    /// Yahoo-style ticker suffix for this exchange.
    pub fn yahoo_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Hkex => Some(".HK"),
            Self::Shanghai => Some(".SS"),
            Self::Shenzhen => Some(".SZ"),
            Self::Beijing => Some(".BJ"),
            Self::Us | Self::Crypto => None,
        }
    }
}

/// A classified watchlist entry.
///
/// Immutable once produced by the classifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// The string as configured by the user
    pub raw: Arc<str>,

    /// Normalized code (e.g. "00700" for "hk00700", "BTC" for "BTC-USD")
    pub code: SymbolCode,

    pub kind: InstrumentKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<Exchange>,

    /// Broad-market index rather than a tradable instrument
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_index: bool,
}

impl Symbol {
    pub fn new(
        raw: impl Into<Arc<str>>,
        code: impl Into<Arc<str>>,
        kind: InstrumentKind,
        exchange: Option<Exchange>,
    ) -> Self {
        Self {
            raw: raw.into(),
            code: code.into(),
            kind,
            exchange,
            is_index: false,
        }
    }

    /// Build a broad-market index symbol. The code is used verbatim.
    pub fn index(code: &str, kind: InstrumentKind, exchange: Option<Exchange>) -> Self {
        Self {
            raw: Arc::from(code),
            code: Arc::from(code),
            kind,
            exchange,
            is_index: true,
        }
    }

    /// Symbol that matched no classification rule.
    pub fn unknown(raw: &str) -> Self {
        Self::new(raw, raw, InstrumentKind::Unknown, None)
    }

    /// Base asset of a crypto symbol ("LINK" for "LINK-USD"). Other kinds return the code.
    pub fn base_asset(&self) -> &str {
        if self.kind != InstrumentKind::Crypto {
            return &self.code;
        }
        ["-USDT", "-USD", "USDT"]
            .iter()
            .find_map(|suffix| self.code.strip_suffix(suffix).filter(|b| !b.is_empty()))
            .unwrap_or(&self.code)
    }

    /// Ticker in Yahoo notation ("0700.HK", "600519.SS", "AAPL").
    pub fn suffixed_ticker(&self) -> String {
        if self.is_index {
            return match self.exchange.and_then(|e| e.yahoo_suffix()) {
                Some(suffix) if !self.code.starts_with('^') => format!("{}{}", self.code, suffix),
                _ => self.code.to_string(),
            };
        }
        match self.kind {
            // Yahoo lists HK tickers with four digits
            InstrumentKind::HkEquity => {
                let trimmed = self.code.trim_start_matches('0');
                format!("{:0>4}.HK", trimmed)
            }
            _ => match self.exchange.and_then(|e| e.yahoo_suffix()) {
                Some(suffix) => format!("{}{}", self.code, suffix),
                None => self.code.to_string(),
            },
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hk_suffixed_ticker_uses_four_digits() {
        let symbol = Symbol::new("hk00700", "00700", InstrumentKind::HkEquity, Some(Exchange::Hkex));
        assert_eq!(symbol.suffixed_ticker(), "0700.HK");

        let symbol = Symbol::new("09988", "09988", InstrumentKind::HkEquity, Some(Exchange::Hkex));
        assert_eq!(symbol.suffixed_ticker(), "9988.HK");
    }

    #[test]
    fn test_a_share_suffixed_ticker() {
        let symbol = Symbol::new("600519", "600519", InstrumentKind::CnAShare, Some(Exchange::Shanghai));
        assert_eq!(symbol.suffixed_ticker(), "600519.SS");

        let symbol = Symbol::new("000001", "000001", InstrumentKind::CnAShare, Some(Exchange::Shenzhen));
        assert_eq!(symbol.suffixed_ticker(), "000001.SZ");
    }

    #[test]
    fn test_index_keeps_caret_code() {
        let symbol = Symbol::index("^GSPC", InstrumentKind::UsEquity, Some(Exchange::Us));
        assert_eq!(symbol.suffixed_ticker(), "^GSPC");

        let symbol = Symbol::index("000001", InstrumentKind::CnAShare, Some(Exchange::Shanghai));
        assert_eq!(symbol.suffixed_ticker(), "000001.SS");
    }

    #[test]
    fn test_default_currency() {
        assert_eq!(InstrumentKind::HkEquity.default_currency(), "HKD");
        assert_eq!(InstrumentKind::CnAShare.default_currency(), "CNY");
        assert_eq!(InstrumentKind::Crypto.default_currency(), "USD");
    }

    #[test]
    fn test_unknown_is_not_known() {
        assert!(!InstrumentKind::Unknown.is_known());
        assert!(InstrumentKind::KNOWN.iter().all(|k| k.is_known()));
    }
}
