//! Merges one symbol's fetch results into a [`NormalizedRecord`].
//!
//! Per category the merger keeps exactly one successful payload: the one
//! whose provider ranks highest in that category's chain, the most recent
//! one on ties. Numeric fields are never blended across providers.
//! Articles are deduplicated across News and Search (News wins) and stale
//! articles are dropped.

mod dedup;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::debug;

pub use dedup::{normalize_url, title_hash, ArticleDeduper, NearDuplicate};

use crate::models::{
    AbsenceReason, Article, DataCategory, FetchOutcome, FetchResult, NormalizedRecord, Payload,
    RecordEntry, SentimentSummary, Symbol,
};
use crate::registry::ProviderRegistry;

/// Default freshness window for news and search items.
pub const DEFAULT_MAX_ARTICLE_AGE_DAYS: i64 = 7;

/// Merger settings.
#[derive(Clone)]
pub struct MergeConfig {
    /// Articles published longer ago are dropped. `None` keeps everything.
    pub max_article_age: Option<Duration>,
    pub near_duplicate: Option<Arc<dyn NearDuplicate>>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_article_age: Some(Duration::days(DEFAULT_MAX_ARTICLE_AGE_DAYS)),
            near_duplicate: None,
        }
    }
}

/// Builds one record per symbol from that symbol's fetch results.
pub struct ResultMerger {
    registry: Arc<ProviderRegistry>,
    config: MergeConfig,
}

impl ResultMerger {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_config(registry, MergeConfig::default())
    }

    pub fn with_config(registry: Arc<ProviderRegistry>, config: MergeConfig) -> Self {
        Self { registry, config }
    }

    /// Merge results for one symbol, as of now.
    pub fn merge(&self, symbol: Symbol, results: Vec<FetchResult>) -> NormalizedRecord {
        self.merge_at(symbol, results, Utc::now())
    }

    /// Merge results for one symbol, judging article freshness against `now`.
    pub fn merge_at(
        &self,
        symbol: Symbol,
        results: Vec<FetchResult>,
        now: DateTime<Utc>,
    ) -> NormalizedRecord {
        let mut by_category: BTreeMap<DataCategory, Vec<FetchResult>> = BTreeMap::new();
        for result in results {
            by_category.entry(result.category).or_default().push(result);
        }

        let mut record = NormalizedRecord::new(symbol);
        for (category, results) in by_category {
            let entry = match self.pick_best(category, results) {
                Ok(best) => best,
                Err(reason) => RecordEntry::Absent { reason },
            };
            record.entries.insert(category, entry);
        }

        self.clean_articles(&mut record, now);
        record.sentiment = SentimentSummary::from_articles(record.articles());
        record
    }

    /// Record for a symbol that was never fetched because it is unclassified.
    pub fn unclassified(&self, symbol: Symbol, categories: &[DataCategory]) -> NormalizedRecord {
        let mut record = NormalizedRecord::new(symbol);
        for category in categories {
            record.entries.insert(
                *category,
                RecordEntry::Absent {
                    reason: AbsenceReason::ClassificationUnknown,
                },
            );
        }
        record
    }

    fn pick_best(
        &self,
        category: DataCategory,
        results: Vec<FetchResult>,
    ) -> Result<RecordEntry, AbsenceReason> {
        let mut best: Option<(usize, DateTime<Utc>, RecordEntry)> = None;
        let mut cancelled = false;
        let mut summaries: Vec<String> = Vec::new();

        for result in results {
            let (provider, payload) = match (result.provider, result.outcome) {
                (Some(provider), FetchOutcome::Success(payload)) => (provider, payload),
                (_, FetchOutcome::Cancelled) => {
                    cancelled = true;
                    continue;
                }
                (_, FetchOutcome::Exhausted { summary }) => {
                    summaries.push(summary);
                    continue;
                }
                (None, FetchOutcome::Success(_)) => continue,
            };

            let rank = self
                .registry
                .rank(category, &provider)
                .unwrap_or(usize::MAX);
            let better = match &best {
                None => true,
                Some((best_rank, best_at, _)) => {
                    rank < *best_rank || (rank == *best_rank && result.fetched_at > *best_at)
                }
            };
            if better {
                best = Some((
                    rank,
                    result.fetched_at,
                    RecordEntry::Present {
                        payload,
                        provider,
                        fetched_at: result.fetched_at,
                        from_cache: result.from_cache,
                    },
                ));
            }
        }

        match best {
            Some((_, _, entry)) => Ok(entry),
            None if cancelled && summaries.is_empty() => Err(AbsenceReason::Cancelled),
            None => Err(AbsenceReason::ChainExhausted {
                summary: summaries.join(" | "),
            }),
        }
    }

    /// Drop stale articles, then deduplicate News before Search.
    fn clean_articles(&self, record: &mut NormalizedRecord, now: DateTime<Utc>) {
        // An age reaching past the representable range keeps everything.
        let cutoff = self
            .config
            .max_article_age
            .and_then(|age| now.checked_sub_signed(age));
        let mut deduper = ArticleDeduper::new(self.config.near_duplicate.clone());

        for category in [DataCategory::News, DataCategory::Search] {
            let Some(RecordEntry::Present { payload, .. }) = record.entries.get_mut(&category) else {
                continue;
            };
            let items = match payload {
                Payload::News(items) | Payload::Search(items) => items,
                _ => continue,
            };

            let before = items.len();
            let fresh: Vec<Article> = std::mem::take(items)
                .into_iter()
                .filter(|a| match (cutoff, a.published_at) {
                    (Some(cutoff), Some(published)) => published >= cutoff,
                    _ => true,
                })
                .collect();
            *items = deduper.retain_new(fresh);

            if items.len() < before {
                debug!(
                    "Dropped {} stale or duplicate {} item(s) for {}",
                    before - items.len(),
                    category,
                    record.symbol
                );
            }
        }
    }
}
