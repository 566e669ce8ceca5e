//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities and rate limiting configuration
//! - Concrete provider implementations (Finnhub, Yahoo, CoinGecko, Coindesk, Massive, Exa)
//!
//! # Architecture
//!
//! Providers are stateless request/response adapters:
//! - **Provider-agnostic core**: the executor only sees `MarketDataProvider`
//! - **Extensible**: new sources implement the trait and declare capabilities
//! - **Credential-free**: keys are leased by the executor and passed per call,
//!   so rotation and cooldown never live inside an adapter

mod capabilities;
mod traits;

pub mod coindesk;
pub mod coingecko;
pub mod exa;
pub mod finnhub;
pub mod massive;
pub mod yahoo;

use num_traits::FromPrimitive;
use rust_decimal::Decimal;

// Re-exports
pub use capabilities::{ProviderCapabilities, RateLimit};
pub use traits::MarketDataProvider;

pub use coindesk::CoindeskProvider;
pub use coingecko::CoinGeckoProvider;
pub use exa::ExaProvider;
pub use finnhub::FinnhubProvider;
pub use massive::MassiveProvider;
pub use yahoo::YahooProvider;

/// Convert a provider float to Decimal. NaN and infinities yield None.
pub(crate) fn decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}
