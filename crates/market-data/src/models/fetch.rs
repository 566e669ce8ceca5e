use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Article, DataCategory, Fundamentals, ProviderId, Quote, Symbol};
use crate::registry::FetchDiagnostics;

/// One unit of work for the failover executor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub symbol: Symbol,
    pub category: DataCategory,
}

impl FetchRequest {
    pub fn new(symbol: Symbol, category: DataCategory) -> Self {
        Self { symbol, category }
    }
}

/// Normalized data returned by a provider for one category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Quote(Quote),
    Fundamentals(Fundamentals),
    News(Vec<Article>),
    Search(Vec<Article>),
}

impl Payload {
    /// Category this payload belongs to.
    pub fn category(&self) -> DataCategory {
        match self {
            Self::Quote(_) => DataCategory::Quote,
            Self::Fundamentals(_) => DataCategory::Fundamentals,
            Self::News(_) => DataCategory::News,
            Self::Search(_) => DataCategory::Search,
        }
    }

    pub fn as_quote(&self) -> Option<&Quote> {
        match self {
            Self::Quote(quote) => Some(quote),
            _ => None,
        }
    }

    pub fn as_fundamentals(&self) -> Option<&Fundamentals> {
        match self {
            Self::Fundamentals(fundamentals) => Some(fundamentals),
            _ => None,
        }
    }

    pub fn articles(&self) -> Option<&[Article]> {
        match self {
            Self::News(items) | Self::Search(items) => Some(items),
            _ => None,
        }
    }
}

/// How a single (symbol, category) fetch ended.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Success(Payload),
    /// Every provider in the chain failed or was skipped.
    Exhausted { summary: String },
    Cancelled,
}

/// Result of one (symbol, category) fetch.
#[derive(Clone, Debug)]
pub struct FetchResult {
    /// Provider that produced the payload. `None` unless the fetch succeeded.
    pub provider: Option<ProviderId>,
    pub symbol: Symbol,
    pub category: DataCategory,
    pub outcome: FetchOutcome,
    pub fetched_at: DateTime<Utc>,
    /// Served from the fetch cache without calling any provider
    pub from_cache: bool,
    pub diagnostics: FetchDiagnostics,
}

impl FetchResult {
    pub fn success(
        provider: ProviderId,
        request: FetchRequest,
        payload: Payload,
        diagnostics: FetchDiagnostics,
    ) -> Self {
        Self {
            provider: Some(provider),
            symbol: request.symbol,
            category: request.category,
            outcome: FetchOutcome::Success(payload),
            fetched_at: Utc::now(),
            from_cache: false,
            diagnostics,
        }
    }

    /// A payload served from the fetch cache.
    pub fn cached(
        provider: ProviderId,
        request: FetchRequest,
        payload: Payload,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider: Some(provider),
            symbol: request.symbol,
            category: request.category,
            outcome: FetchOutcome::Success(payload),
            fetched_at,
            from_cache: true,
            diagnostics: FetchDiagnostics::new(),
        }
    }

    pub fn exhausted(request: FetchRequest, diagnostics: FetchDiagnostics) -> Self {
        let summary = if diagnostics.attempts.is_empty() {
            "no provider configured".to_string()
        } else {
            diagnostics.summary()
        };
        Self {
            provider: None,
            symbol: request.symbol,
            category: request.category,
            outcome: FetchOutcome::Exhausted { summary },
            fetched_at: Utc::now(),
            from_cache: false,
            diagnostics,
        }
    }

    pub fn cancelled(request: FetchRequest, diagnostics: FetchDiagnostics) -> Self {
        Self {
            provider: None,
            symbol: request.symbol,
            category: request.category,
            outcome: FetchOutcome::Cancelled,
            fetched_at: Utc::now(),
            from_cache: false,
            diagnostics,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.outcome {
            FetchOutcome::Success(payload) => Some(payload),
            _ => None,
        }
    }

    /// Failure detail for logs. `None` on success.
    pub fn error_detail(&self) -> Option<String> {
        match &self.outcome {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Exhausted { summary } => Some(summary.clone()),
            FetchOutcome::Cancelled => Some("cancelled".to_string()),
        }
    }
}
