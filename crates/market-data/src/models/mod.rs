//! Market data models
//!
//! This module contains the core data types of the engine:
//! - `types` - Type aliases for common identifiers (ProviderId, Currency, SymbolCode)
//! - `instrument` - Classified symbol identity (Symbol, InstrumentKind, Exchange)
//! - `category` - Requested data categories (DataCategory)
//! - `quote`, `fundamentals`, `article` - Provider payload shapes
//! - `fetch` - Per-request fetch results (FetchRequest, FetchResult, Payload)
//! - `record` - Merged per-symbol output (NormalizedRecord)

mod article;
mod category;
mod fetch;
mod fundamentals;
mod instrument;
mod quote;
mod record;
mod types;

pub use article::{Article, Sentiment};
pub(crate) use article::domain_of;
pub use category::DataCategory;
pub use fetch::{FetchOutcome, FetchRequest, FetchResult, Payload};
pub use fundamentals::Fundamentals;
pub use instrument::{Exchange, InstrumentKind, Symbol};
pub use quote::Quote;
pub use record::{AbsenceReason, NormalizedRecord, RecordEntry, SentimentSummary, SourcedValue};
pub use types::{Currency, ProviderId, SymbolCode};
