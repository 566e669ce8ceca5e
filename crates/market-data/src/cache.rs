//! Fetch cache collaborator.
//!
//! Checked before the failover executor runs and filled after a success.
//! Entries are keyed by UTC trading day, so a new day starts cold. Within a
//! day, [`CacheTtl`] bounds how long a payload of each category is served.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};

use crate::models::{DataCategory, InstrumentKind, Payload, ProviderId, Symbol, SymbolCode};

/// Cache key: one entry per symbol and category per UTC day.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub day: NaiveDate,
    pub code: SymbolCode,
    pub kind: InstrumentKind,
    pub category: DataCategory,
}

impl CacheKey {
    pub fn new(symbol: &Symbol, category: DataCategory, at: DateTime<Utc>) -> Self {
        Self {
            day: at.date_naive(),
            code: symbol.code.clone(),
            kind: symbol.kind,
            category,
        }
    }
}

/// A cached successful fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub provider: ProviderId,
    pub payload: Payload,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is still servable at `now` under `ttl`.
    ///
    /// `None` means the entry is good for the rest of its day. Entries
    /// stamped in the future count as fresh.
    pub fn is_fresh(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        match ttl {
            None => true,
            Some(ttl) => now
                .signed_duration_since(self.fetched_at)
                .to_std()
                .map_or(true, |age| age < ttl),
        }
    }
}

/// Default lifetime of a cached quote.
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default lifetime of cached news.
pub const DEFAULT_NEWS_TTL: Duration = Duration::from_secs(30 * 60);

/// Default lifetime of cached search results.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(60 * 60);

/// How long cached payloads stay servable, per category.
///
/// Fundamentals change at most daily and have no TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTtl {
    pub quote: Duration,
    pub news: Duration,
    pub search: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            quote: DEFAULT_QUOTE_TTL,
            news: DEFAULT_NEWS_TTL,
            search: DEFAULT_SEARCH_TTL,
        }
    }
}

impl CacheTtl {
    pub fn for_category(&self, category: DataCategory) -> Option<Duration> {
        match category {
            DataCategory::Quote => Some(self.quote),
            DataCategory::News => Some(self.news),
            DataCategory::Search => Some(self.search),
            DataCategory::Fundamentals => None,
        }
    }
}

/// Storage for successful fetches. Implementations decide persistence.
#[async_trait]
pub trait FetchCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    async fn put(&self, key: CacheKey, entry: CacheEntry);
}

/// In-memory cache that keeps only the most recent day.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Fetch cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FetchCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock_entries().get(key).cloned()
    }

    async fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|k, _| k.day >= key.day);
        if entries.len() < before {
            debug!("Fetch cache: evicted {} entries from earlier days", before - entries.len());
        }
        entries.insert(key, entry);
    }
}
