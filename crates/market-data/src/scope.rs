//! Market scope: which markets a watchlist touches and their broad indices.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::{Exchange, InstrumentKind, Symbol};

/// A broad-market index tracked for a market kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MarketIndex {
    pub market: InstrumentKind,
    /// Display name ("S&P 500")
    pub name: &'static str,
    pub symbol: Symbol,
}

impl MarketIndex {
    fn new(market: InstrumentKind, name: &'static str, code: &str, exchange: Exchange) -> Self {
        Self {
            market,
            name,
            symbol: Symbol::index(code, market, Some(exchange)),
        }
    }
}

/// Derives the set of markets relevant to a watchlist.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarketScopeFilter;

impl MarketScopeFilter {
    /// Distinct known kinds in the watchlist. Unknown symbols are ignored.
    pub fn relevant_markets(symbols: &[Symbol]) -> BTreeSet<InstrumentKind> {
        symbols
            .iter()
            .map(|s| s.kind)
            .filter(InstrumentKind::is_known)
            .collect()
    }

    /// Broad-market indices for the given kinds, in kind order.
    pub fn indices_for(kinds: &BTreeSet<InstrumentKind>) -> Vec<MarketIndex> {
        kinds.iter().flat_map(|kind| Self::indices_of(*kind)).collect()
    }

    fn indices_of(kind: InstrumentKind) -> Vec<MarketIndex> {
        use InstrumentKind::*;
        match kind {
            UsEquity => vec![
                MarketIndex::new(UsEquity, "S&P 500", "^GSPC", Exchange::Us),
                MarketIndex::new(UsEquity, "NASDAQ Composite", "^IXIC", Exchange::Us),
                MarketIndex::new(UsEquity, "Dow Jones Industrial Average", "^DJI", Exchange::Us),
            ],
            HkEquity => vec![MarketIndex::new(HkEquity, "Hang Seng Index", "^HSI", Exchange::Hkex)],
            CnAShare => vec![
                MarketIndex::new(CnAShare, "SSE Composite", "000001", Exchange::Shanghai),
                MarketIndex::new(CnAShare, "SZSE Component", "399001", Exchange::Shenzhen),
            ],
            Crypto => vec![
                MarketIndex::new(Crypto, "Bitcoin", "BTC", Exchange::Crypto),
                MarketIndex::new(Crypto, "Ethereum", "ETH", Exchange::Crypto),
            ],
            Unknown => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SymbolClassifier;

    fn kinds(raws: &[&str]) -> BTreeSet<InstrumentKind> {
        let symbols = SymbolClassifier::new().classify_all(raws);
        MarketScopeFilter::relevant_markets(&symbols)
    }

    #[test]
    fn test_mixed_watchlist() {
        let markets = kinds(&["BTC", "hk00700", "AAPL"]);
        assert_eq!(
            markets,
            [InstrumentKind::Crypto, InstrumentKind::HkEquity, InstrumentKind::UsEquity]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn test_single_market() {
        let markets = kinds(&["600519", "000001"]);
        assert_eq!(markets, [InstrumentKind::CnAShare].into_iter().collect());
    }

    #[test]
    fn test_empty_and_unknown() {
        assert!(kinds(&[]).is_empty());
        assert!(kinds(&["???", "brk.b"]).is_empty());
    }

    #[test]
    fn test_indices_for_markets() {
        let markets = kinds(&["AAPL", "600519"]);
        let codes: Vec<String> = MarketScopeFilter::indices_for(&markets)
            .iter()
            .map(|i| i.symbol.suffixed_ticker())
            .collect();
        assert_eq!(codes, vec!["^GSPC", "^IXIC", "^DJI", "000001.SS", "399001.SZ"]);
    }
}
