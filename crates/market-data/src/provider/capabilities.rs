//! Provider capabilities and rate limiting configuration.
//!
//! This module defines structures for describing what a market data provider
//! can do and how it should be rate-limited.

use std::time::Duration;

use crate::models::{DataCategory, InstrumentKind};

/// Describes the capabilities of a market data provider.
///
/// Used by the registry to build per-category chains and to filter them
/// by instrument kind.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Instrument kinds this provider can serve.
    pub instrument_kinds: &'static [InstrumentKind],

    /// Data categories this provider implements.
    pub categories: &'static [DataCategory],

    /// Whether calls need an API key. Keyless providers get anonymous lease slots.
    pub requires_credentials: bool,
}

impl ProviderCapabilities {
    pub fn supports_kind(&self, kind: InstrumentKind) -> bool {
        self.instrument_kinds.contains(&kind)
    }

    pub fn supports_category(&self, category: DataCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Rate limiting configuration for a provider.
///
/// Controls how aggressively we can call a provider to avoid
/// hitting their rate limits and getting blocked.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,

    /// Maximum concurrent requests to this provider.
    pub max_concurrency: usize,

    /// Minimum delay between requests.
    pub min_delay: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            max_concurrency: 5,
            min_delay: Duration::from_millis(100),
        }
    }
}
