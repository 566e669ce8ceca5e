//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers must implement.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Article, DataCategory, Fundamentals, Payload, Quote, Symbol};
use crate::registry::ApiKey;

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Trait for market data providers.
///
/// Implement this trait to add support for a new data source. Every
/// category method defaults to `NotSupported`, so an adapter only overrides
/// what it declares in [`capabilities`](Self::capabilities).
///
/// `key` is `None` for keyless providers and for providers whose key is optional
/// and not configured.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use pulsewatch_market_data::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities {
///             instrument_kinds: &[InstrumentKind::UsEquity],
///             categories: &[DataCategory::Quote],
///             requires_credentials: false,
///         }
///     }
///
///     fn rate_limit(&self) -> RateLimit {
///         RateLimit::default()
///     }
///
///     async fn get_quote(&self, key: Option<&ApiKey>, symbol: &Symbol) -> Result<Quote, MarketDataError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "FINNHUB", "YAHOO", etc.
    /// Used for logging, credential pools, and provider order lists.
    fn id(&self) -> &'static str;

    /// Provider priority for ordering.
    ///
    /// Lower values = higher priority. Default is 10.
    /// Used when no explicit order is configured for a category.
    fn priority(&self) -> u8 {
        10
    }

    /// Describes what this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Rate limiting configuration.
    fn rate_limit(&self) -> RateLimit;

    /// Fetch the latest quote.
    async fn get_quote(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Quote, MarketDataError> {
        let _ = (key, symbol);
        Err(self.not_supported(DataCategory::Quote))
    }

    /// Fetch company or coin fundamentals.
    async fn get_fundamentals(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Fundamentals, MarketDataError> {
        let _ = (key, symbol);
        Err(self.not_supported(DataCategory::Fundamentals))
    }

    /// Fetch recent news about the symbol.
    async fn get_news(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Vec<Article>, MarketDataError> {
        let _ = (key, symbol);
        Err(self.not_supported(DataCategory::News))
    }

    /// Web search about the symbol.
    async fn search(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Vec<Article>, MarketDataError> {
        let _ = (key, symbol);
        Err(self.not_supported(DataCategory::Search))
    }

    /// Dispatch a category to the matching method.
    async fn call(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
        category: DataCategory,
    ) -> Result<Payload, MarketDataError> {
        match category {
            DataCategory::Quote => self.get_quote(key, symbol).await.map(Payload::Quote),
            DataCategory::Fundamentals => self
                .get_fundamentals(key, symbol)
                .await
                .map(Payload::Fundamentals),
            DataCategory::News => self.get_news(key, symbol).await.map(Payload::News),
            DataCategory::Search => self.search(key, symbol).await.map(Payload::Search),
        }
    }

    #[doc(hidden)]
    fn not_supported(&self, category: DataCategory) -> MarketDataError {
        MarketDataError::NotSupported {
            operation: category.to_string(),
            provider: self.id().to_string(),
        }
    }
}
