//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all fetch operations
//! - [`RetryClass`]: Classification for determining retry behavior
//! - [`ConfigError`]: Startup configuration problems

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which determines how the failover executor should handle the error.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider rate limited the request (HTTP 429) or the key's quota is spent.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The credential was rejected (HTTP 401/403 without quota semantics).
    #[error("Unauthorized: {provider}")]
    Unauthorized {
        /// The provider that rejected the credential
        provider: String,
    },

    /// The provider answered, but the payload could not be parsed or failed validation.
    #[error("Malformed response from {provider}: {message}")]
    Malformed {
        /// The provider that returned the payload
        provider: String,
        /// What was wrong with it
        message: String,
    },

    /// The provider is down or answered with an unexpected status.
    #[error("Provider unavailable: {provider} - {message}")]
    Unavailable {
        /// The provider that failed
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider does not offer this operation.
    #[error("Operation '{operation}' not supported by {provider}")]
    NotSupported {
        /// The operation that was attempted
        operation: String,
        /// The provider that was asked
        provider: String,
    },

    /// The provider does not know this symbol.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Every provider of the chain failed or was unavailable.
    #[error("All providers failed for {symbol}/{category}: {summary}")]
    ChainExhausted {
        /// Symbol code
        symbol: String,
        /// Data category
        category: String,
        /// Per-provider attempt summary
        summary: String,
    },

    /// The raw symbol did not match any classification rule.
    #[error("Unclassified symbol: {0}")]
    ClassificationUnknown(String),

    /// The polling cycle was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid engine configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulsewatch_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::Timeout { provider: "FINNHUB".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::SymbolNotFound("INVALID".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::NextProvider);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. }
            | Self::Malformed { .. }
            | Self::Unavailable { .. }
            | Self::Network(_) => RetryClass::WithBackoff,

            Self::RateLimited { .. } | Self::Unauthorized { .. } => RetryClass::Cooldown,

            Self::NotSupported { .. } | Self::SymbolNotFound(_) => RetryClass::NextProvider,

            Self::ChainExhausted { .. }
            | Self::ClassificationUnknown(_)
            | Self::Cancelled
            | Self::Config(_) => RetryClass::Never,
        }
    }

    pub(crate) fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed(provider: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Map a transport error from reqwest onto the provider taxonomy.
    pub(crate) fn from_transport(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
            }
        } else if error.is_decode() {
            Self::malformed(provider, error.to_string())
        } else {
            Self::Network(error)
        }
    }

    /// Map a non-success HTTP status onto the provider taxonomy.
    pub(crate) fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => Self::RateLimited {
                provider: provider.to_string(),
            },
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Self::Unauthorized {
                provider: provider.to_string(),
            },
            reqwest::StatusCode::NOT_FOUND => Self::SymbolNotFound(format!("{}: {}", provider, body)),
            _ => Self::unavailable(provider, format!("HTTP {} - {}", status, body)),
        }
    }
}

/// Problems detected while loading configuration.
///
/// These abort startup instead of letting the engine run degraded.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Unknown provider '{provider}' in {key}")]
    UnknownProvider { key: String, provider: String },

    #[error("No provider configured for required category '{0}'")]
    NoProviderForCategory(String),

    #[error("Watchlist is empty")]
    EmptyWatchlist,
}
