//! Watchlist symbol classification.
//!
//! Turns a raw ticker into a [`Symbol`] by applying an ordered list of pure
//! rules. The first rule that matches wins; a ticker that matches none is
//! kept as [`InstrumentKind::Unknown`] so it can be reported.
//!
//! | Order | Input | Result |
//! |-------|-------|--------|
//! | 0 | `BTC-USD`, `ETH-USDT`, `SOLUSDT` | Crypto, code = base when the base is known |
//! | 1 | `BTC` (known crypto, not an equity collision) | Crypto |
//! | 2 | `hk00700`, `HK700`, `09988` | HK equity, 5-digit code |
//! | 3 | `600519`, `000001`, `830799` | CN A-share, exchange from first digit |
//! | 4 | `AAPL`, `BRK` | US equity |

mod known_symbols;

use std::collections::HashSet;

use log::debug;

use crate::models::{Exchange, InstrumentKind, Symbol};

pub use known_symbols::{CRYPTO_QUOTE_SUFFIXES, EQUITY_COLLISIONS, KNOWN_CRYPTO};

type Rule = fn(&SymbolClassifier, &str) -> Option<Symbol>;

/// Precedence-ordered classification rules.
const RULES: [(&str, Rule); 5] = [
    ("crypto_pair", SymbolClassifier::crypto_pair),
    ("crypto_base", SymbolClassifier::crypto_base),
    ("hk_equity", SymbolClassifier::hk_equity),
    ("cn_a_share", SymbolClassifier::cn_a_share),
    ("us_equity", SymbolClassifier::us_equity),
];

/// Deterministic, side-effect free ticker classifier.
#[derive(Clone, Debug)]
pub struct SymbolClassifier {
    crypto: HashSet<String>,
    equity_collisions: HashSet<String>,
}

impl SymbolClassifier {
    /// Classifier with the built-in crypto and collision tables.
    pub fn new() -> Self {
        Self {
            crypto: KNOWN_CRYPTO.iter().map(|s| s.to_string()).collect(),
            equity_collisions: EQUITY_COLLISIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Classifier with extra crypto symbols and equity collisions on top of the built-in tables.
    pub fn with_extensions<C, E>(crypto: C, equity_collisions: E) -> Self
    where
        C: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        let mut classifier = Self::new();
        classifier
            .crypto
            .extend(crypto.into_iter().map(|s| s.trim().to_ascii_uppercase()));
        classifier
            .equity_collisions
            .extend(equity_collisions.into_iter().map(|s| s.trim().to_ascii_uppercase()));
        classifier
    }

    /// Classify one raw watchlist entry.
    pub fn classify(&self, raw: &str) -> Symbol {
        let trimmed = raw.trim();
        for (name, rule) in RULES.iter() {
            if let Some(symbol) = rule(self, trimmed) {
                debug!("Classified '{}' as {} via rule '{}'", trimmed, symbol.kind, name);
                return symbol;
            }
        }
        debug!("No classification rule matched '{}'", trimmed);
        Symbol::unknown(trimmed)
    }

    /// Classify a whole watchlist, preserving order.
    pub fn classify_all<S: AsRef<str>>(&self, raws: &[S]) -> Vec<Symbol> {
        raws.iter().map(|raw| self.classify(raw.as_ref())).collect()
    }

    pub fn is_known_crypto(&self, code: &str) -> bool {
        self.crypto.contains(code)
    }

    /// A pair whose base would not classify as crypto on its own keeps the
    /// full pair as its code, so re-classifying the code stays crypto.
    fn crypto_pair(&self, input: &str) -> Option<Symbol> {
        CRYPTO_QUOTE_SUFFIXES.iter().find_map(|suffix| {
            let base = input.strip_suffix(suffix)?;
            if !is_upper_alpha(base, 2, 6) {
                return None;
            }
            let code = if self.crypto_base(base).is_some() {
                base
            } else {
                input
            };
            Some(Symbol::new(
                input,
                code,
                InstrumentKind::Crypto,
                Some(Exchange::Crypto),
            ))
        })
    }

    fn crypto_base(&self, input: &str) -> Option<Symbol> {
        if !is_upper_alpha(input, 2, 6)
            || !self.crypto.contains(input)
            || self.equity_collisions.contains(input)
        {
            return None;
        }
        Some(Symbol::new(
            input,
            input,
            InstrumentKind::Crypto,
            Some(Exchange::Crypto),
        ))
    }

    fn hk_equity(&self, input: &str) -> Option<Symbol> {
        let digits = match input.strip_prefix("hk").or_else(|| input.strip_prefix("HK")) {
            Some(rest) if is_digits(rest, 1, 5) => rest,
            Some(_) => return None,
            None if is_digits(input, 5, 5) => input,
            None => return None,
        };
        let code = format!("{:0>5}", digits);
        Some(Symbol::new(
            input,
            code,
            InstrumentKind::HkEquity,
            Some(Exchange::Hkex),
        ))
    }

    fn cn_a_share(&self, input: &str) -> Option<Symbol> {
        if !is_digits(input, 6, 6) {
            return None;
        }
        let exchange = match input.as_bytes()[0] {
            b'6' | b'5' | b'9' => Exchange::Shanghai,
            b'0' | b'3' | b'2' | b'1' => Exchange::Shenzhen,
            _ => Exchange::Beijing,
        };
        Some(Symbol::new(
            input,
            input,
            InstrumentKind::CnAShare,
            Some(exchange),
        ))
    }

    fn us_equity(&self, input: &str) -> Option<Symbol> {
        if !is_upper_alpha(input, 1, usize::MAX) {
            return None;
        }
        Some(Symbol::new(
            input,
            input,
            InstrumentKind::UsEquity,
            Some(Exchange::Us),
        ))
    }
}

impl Default for SymbolClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn is_upper_alpha(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_uppercase())
}

fn is_digits(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(raw: &str) -> Symbol {
        SymbolClassifier::new().classify(raw)
    }

    #[test]
    fn test_known_crypto() {
        let symbol = classify("BTC");
        assert_eq!(symbol.kind, InstrumentKind::Crypto);
        assert_eq!(symbol.code.as_ref(), "BTC");
        assert_eq!(symbol.exchange, Some(Exchange::Crypto));
    }

    #[test]
    fn test_crypto_pairs() {
        for raw in ["BTC-USD", "ETH-USDT", "SOLUSDT"] {
            let symbol = classify(raw);
            assert_eq!(symbol.kind, InstrumentKind::Crypto, "{}", raw);
        }
        assert_eq!(classify("ETH-USDT").code.as_ref(), "ETH");
        assert_eq!(classify("SOLUSDT").code.as_ref(), "SOL");
    }

    #[test]
    fn test_collision_stays_equity() {
        let symbol = classify("LINK");
        assert_eq!(symbol.kind, InstrumentKind::UsEquity);

        let symbol = classify("LINK-USD");
        assert_eq!(symbol.kind, InstrumentKind::Crypto);
        assert_eq!(symbol.code.as_ref(), "LINK-USD");
        assert_eq!(symbol.base_asset(), "LINK");
    }

    #[test]
    fn test_hk_forms() {
        for (raw, code) in [("hk00700", "00700"), ("HK700", "00700"), ("09988", "09988"), ("hk5", "00005")] {
            let symbol = classify(raw);
            assert_eq!(symbol.kind, InstrumentKind::HkEquity, "{}", raw);
            assert_eq!(symbol.code.as_ref(), code);
            assert_eq!(symbol.exchange, Some(Exchange::Hkex));
        }
        assert_eq!(classify("hk123456").kind, InstrumentKind::Unknown);
    }

    #[test]
    fn test_a_share_exchanges() {
        assert_eq!(classify("600519").exchange, Some(Exchange::Shanghai));
        assert_eq!(classify("000001").exchange, Some(Exchange::Shenzhen));
        assert_eq!(classify("300750").exchange, Some(Exchange::Shenzhen));
        assert_eq!(classify("830799").exchange, Some(Exchange::Beijing));
        assert_eq!(classify("430047").exchange, Some(Exchange::Beijing));
    }

    #[test]
    fn test_us_equity() {
        let symbol = classify(" AAPL ");
        assert_eq!(symbol.kind, InstrumentKind::UsEquity);
        assert_eq!(symbol.code.as_ref(), "AAPL");
        assert_eq!(classify("GOOGLEX").kind, InstrumentKind::UsEquity);
    }

    #[test]
    fn test_unknown() {
        for raw in ["", "aapl", "1234", "BRK.B", "12345678", "BTC USD"] {
            assert_eq!(classify(raw).kind, InstrumentKind::Unknown, "{:?}", raw);
        }
    }

    #[test]
    fn test_extensions() {
        let classifier = SymbolClassifier::with_extensions(
            vec!["wld".to_string()],
            vec!["SOL".to_string()],
        );
        assert_eq!(classifier.classify("WLD").kind, InstrumentKind::Crypto);
        assert_eq!(classifier.classify("SOL").kind, InstrumentKind::UsEquity);
        assert_eq!(classifier.classify("SOL-USD").kind, InstrumentKind::Crypto);
    }

    #[test]
    fn test_reclassifying_code_is_stable() {
        let classifier = SymbolClassifier::new();
        for raw in ["BTC-USD", "LINK-USD", "XYZUSDT", "hk700", "600519", "MSFT", "ETH"] {
            let first = classifier.classify(raw);
            let again = classifier.classify(&first.code);
            assert_eq!(first.kind, again.kind, "{}", raw);
            assert_eq!(first.code, again.code, "{}", raw);
        }
    }
}
