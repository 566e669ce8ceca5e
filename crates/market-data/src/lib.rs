//! PulseWatch Market Data Crate
//!
//! Routing and failover engine for watchlist market data: quotes,
//! fundamentals, news and web search for US, Hong Kong and China A-share
//! equities and cryptocurrencies.
//!
//! # Overview
//!
//! - Symbols are classified by an ordered list of pure rules
//! - Each data category has its own ordered provider chain
//! - Credentials rotate per provider and cool down after failures
//! - The first provider that succeeds wins; failures stay isolated per
//!   (symbol, category) and surface as absence markers
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |    Watchlist     |  ("BTC,hk00700,AAPL")
//! +------------------+
//!          |
//!          v
//! +------------------+
//! | SymbolClassifier |  (ordered rules -> Symbol)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! | FailoverExecutor | --> | ProviderRegistry |  (chain per category)
//! +------------------+     +------------------+
//!          |               +------------------+
//!          +-------------> |    KeyRotator    |  (credential leases)
//!          |               +------------------+
//!          v
//! +------------------+
//! |   ResultMerger   |  (one NormalizedRecord per symbol)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Symbol`] - Classified watchlist entry
//! - [`FetchResult`] - Outcome of one (symbol, category) fetch
//! - [`NormalizedRecord`] - Merged per-symbol output
//! - [`Aggregator`] - Runs a full polling cycle
//!
//! # Type Aliases
//!
//! - [`ProviderId`] - Provider identifier (e.g., "FINNHUB", "YAHOO")
//! - [`Currency`] - Currency code (ISO 4217)
//! - [`SymbolCode`] - Normalized symbol code

pub mod aggregator;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod merger;
pub mod models;
pub mod provider;
pub mod registry;
pub mod scope;

// Re-export all public types from models
pub use models::{
    AbsenceReason, Article, Currency, DataCategory, Exchange, FetchOutcome, FetchRequest,
    FetchResult, Fundamentals, InstrumentKind, NormalizedRecord, Payload, ProviderId, Quote,
    RecordEntry, Sentiment, SentimentSummary, SourcedValue, Symbol, SymbolCode,
};

pub use aggregator::{Aggregator, CycleReport, MarketSnapshot};
pub use cache::{CacheEntry, CacheKey, CacheTtl, FetchCache, MemoryCache};
pub use classifier::SymbolClassifier;
pub use config::{EngineConfig, ProviderKeys};
pub use merger::{MergeConfig, NearDuplicate, ResultMerger};
pub use scope::{MarketIndex, MarketScopeFilter};

// Re-export provider types
pub use provider::coindesk::CoindeskProvider;
pub use provider::coingecko::CoinGeckoProvider;
pub use provider::exa::ExaProvider;
pub use provider::finnhub::FinnhubProvider;
pub use provider::massive::MassiveProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

// Re-export registry types
pub use registry::{
    ApiKey, CredentialOutcome, FailoverExecutor, FetchDiagnostics, KeyRotator, KeyRotatorConfig,
    ProviderDescriptor, ProviderRegistry, ProviderSettings, SkipReason,
};

// Re-export error types
pub use errors::{ConfigError, MarketDataError, RetryClass};
