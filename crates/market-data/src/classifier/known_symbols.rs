//! Static symbol tables used by the classifier.
//!
//! Built once via `lazy_static`. Configuration can extend both sets at
//! classifier construction time.

use std::collections::HashSet;

use lazy_static::lazy_static;

lazy_static! {
    /// Crypto base symbols recognized without an explicit `-USD` pair.
    pub static ref KNOWN_CRYPTO: HashSet<&'static str> = [
        "BTC", "ETH", "BNB", "SOL", "XRP", "ADA", "DOGE", "DOT", "MATIC", "LTC",
        "TRX", "AVAX", "SHIB", "UNI", "LINK", "ATOM", "XLM", "ETC", "BCH", "NEAR",
        "APT", "ARB", "FIL", "TON", "PEPE", "SUI", "USDT", "USDC",
    ]
    .into_iter()
    .collect();

    /// Tickers that are both a listed equity and a crypto symbol.
    ///
    /// A bare ticker in this set stays an equity. Use `LINK-USD` to force crypto.
    pub static ref EQUITY_COLLISIONS: HashSet<&'static str> =
        ["LINK", "NEAR", "APT", "UNI"].into_iter().collect();
}

/// Quote currencies accepted in an explicit crypto pair (`BTC-USD`, `ETHUSDT`).
pub const CRYPTO_QUOTE_SUFFIXES: [&str; 3] = ["-USDT", "-USD", "USDT"];
