//! Merged per-symbol output of a polling cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Article, DataCategory, Payload, ProviderId, Sentiment, Symbol};

/// Scores at or beyond this magnitude lean positive or negative.
const SENTIMENT_LEAN: f64 = 0.2;

/// Why a category has no data in a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbsenceReason {
    /// Every provider failed or was skipped
    ChainExhausted { summary: String },
    Cancelled,
    /// The symbol was never fetched because no rule classified it
    ClassificationUnknown,
}

/// State of one category inside a [`NormalizedRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordEntry {
    Present {
        payload: Payload,
        provider: ProviderId,
        fetched_at: DateTime<Utc>,
        #[serde(default)]
        from_cache: bool,
    },
    Absent {
        #[serde(flatten)]
        reason: AbsenceReason,
    },
}

impl RecordEntry {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Present { payload, .. } => Some(payload),
            Self::Absent { .. } => None,
        }
    }

    pub fn provider(&self) -> Option<&ProviderId> {
        match self {
            Self::Present { provider, .. } => Some(provider),
            Self::Absent { .. } => None,
        }
    }
}

/// A field value together with where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct SourcedValue<T> {
    pub value: T,
    pub category: DataCategory,
    pub provider: ProviderId,
}

/// Aggregate of the sentiment labels across a record's articles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    /// Labeled articles only
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    /// `(positive - negative) / total`, in [-1, 1]
    pub score: f64,
    pub label: Sentiment,
}

impl SentimentSummary {
    /// `None` when no article carries a label.
    pub fn from_articles<'a>(articles: impl IntoIterator<Item = &'a Article>) -> Option<Self> {
        let (mut positive, mut negative, mut neutral) = (0usize, 0usize, 0usize);
        for sentiment in articles.into_iter().filter_map(|a| a.sentiment) {
            match sentiment {
                Sentiment::Positive => positive += 1,
                Sentiment::Negative => negative += 1,
                Sentiment::Neutral => neutral += 1,
            }
        }

        let total = positive + negative + neutral;
        if total == 0 {
            return None;
        }
        let score = (positive as f64 - negative as f64) / total as f64;
        let label = if score >= SENTIMENT_LEAN {
            Sentiment::Positive
        } else if score <= -SENTIMENT_LEAN {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        Some(Self {
            total,
            positive,
            negative,
            neutral,
            score,
            label,
        })
    }
}

/// One merged record per symbol per cycle.
///
/// Holds at most one payload per category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub symbol: Symbol,
    pub entries: BTreeMap<DataCategory, RecordEntry>,
    /// Set by the merger from the kept articles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentSummary>,
}

impl NormalizedRecord {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            entries: BTreeMap::new(),
            sentiment: None,
        }
    }

    pub fn entry(&self, category: DataCategory) -> Option<&RecordEntry> {
        self.entries.get(&category)
    }

    pub fn payload(&self, category: DataCategory) -> Option<&Payload> {
        self.entries.get(&category).and_then(RecordEntry::payload)
    }

    /// Provider whose payload was kept for a category.
    pub fn provider(&self, category: DataCategory) -> Option<&ProviderId> {
        self.entries.get(&category).and_then(RecordEntry::provider)
    }

    /// Categories that ended without data.
    pub fn absences(&self) -> impl Iterator<Item = (DataCategory, &AbsenceReason)> {
        self.entries.iter().filter_map(|(category, entry)| match entry {
            RecordEntry::Absent { reason } => Some((*category, reason)),
            RecordEntry::Present { .. } => None,
        })
    }

    /// Latest price. Quote wins over Fundamentals.
    pub fn price(&self) -> Option<SourcedValue<Decimal>> {
        self.pick(|payload| match payload {
            Payload::Quote(quote) => Some(quote.price),
            Payload::Fundamentals(f) => f.price,
            _ => None,
        })
    }

    /// Daily (24h for crypto) percent change. Quote wins over Fundamentals.
    pub fn change_percent(&self) -> Option<SourcedValue<Decimal>> {
        self.pick(|payload| match payload {
            Payload::Quote(quote) => quote.change_percent,
            Payload::Fundamentals(f) => f.change_percent,
            _ => None,
        })
    }

    /// Market capitalization. Only Fundamentals carries it.
    pub fn market_cap(&self) -> Option<SourcedValue<f64>> {
        self.pick(|payload| match payload {
            Payload::Fundamentals(f) => f.market_cap,
            _ => None,
        })
    }

    /// News articles followed by search hits, already deduplicated by the merger.
    pub fn articles(&self) -> Vec<&Article> {
        [DataCategory::News, DataCategory::Search]
            .iter()
            .filter_map(|c| self.payload(*c))
            .filter_map(Payload::articles)
            .flatten()
            .collect()
    }

    /// First category (Quote, then Fundamentals) holding the field.
    fn pick<T>(&self, field: impl Fn(&Payload) -> Option<T>) -> Option<SourcedValue<T>> {
        [DataCategory::Quote, DataCategory::Fundamentals]
            .iter()
            .find_map(|category| match self.entries.get(category)? {
                RecordEntry::Present {
                    payload, provider, ..
                } => field(payload).map(|value| SourcedValue {
                    value,
                    category: *category,
                    provider: provider.clone(),
                }),
                RecordEntry::Absent { .. } => None,
            })
    }
}
