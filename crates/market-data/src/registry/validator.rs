//! Payload validation.
//!
//! Validates provider payloads before they count as a success:
//! - Quotes: positive price, OHLC invariants, sanity bound
//! - Fundamentals: at least one populated field
//! - Articles: items without a title are dropped

use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{Article, Fundamentals, Payload, Quote};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - reject payload, the executor treats it as malformed.
    Hard,
    /// Soft warning - accept payload but log warning.
    Soft,
}

/// Validation result details.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationIssue {
    fn hard(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Hard,
            message: message.into(),
        }
    }

    fn soft(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Soft,
            message: message.into(),
        }
    }
}

/// Validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Reject quotes whose price is zero or negative.
    pub reject_non_positive_prices: bool,
    /// Reject quotes where high < low.
    pub reject_invalid_ohlc: bool,
    /// Maximum allowed price value (sanity check).
    pub max_price: Option<Decimal>,
    /// Warn when a quote reports zero volume.
    pub warn_on_zero_volume: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_non_positive_prices: true,
            reject_invalid_ohlc: true,
            max_price: Some(Decimal::from(1_000_000_000i64)),
            warn_on_zero_volume: false,
        }
    }
}

/// Checks provider payloads before the executor accepts them.
pub struct PayloadValidator {
    config: ValidatorConfig,
}

impl PayloadValidator {
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a payload, returning the (possibly filtered) payload.
    ///
    /// Hard issues become [`MarketDataError::Malformed`] attributed to `provider`.
    pub fn validate(&self, provider: &str, payload: Payload) -> Result<Payload, MarketDataError> {
        let mut issues = Vec::new();

        let payload = match payload {
            Payload::Quote(quote) => {
                self.check_quote(&quote, &mut issues);
                Payload::Quote(quote)
            }
            Payload::Fundamentals(fundamentals) => {
                self.check_fundamentals(&fundamentals, &mut issues);
                Payload::Fundamentals(fundamentals)
            }
            Payload::News(items) => Payload::News(self.filter_articles(items, &mut issues)),
            Payload::Search(items) => Payload::Search(self.filter_articles(items, &mut issues)),
        };

        let errors: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();
        if !errors.is_empty() {
            return Err(MarketDataError::malformed(provider, errors.join("; ")));
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Payload validation warning from '{}': {}", provider, issue.message);
        }

        Ok(payload)
    }

    fn check_quote(&self, quote: &Quote, issues: &mut Vec<ValidationIssue>) {
        if self.config.reject_non_positive_prices && quote.price <= Decimal::ZERO {
            issues.push(ValidationIssue::hard(format!(
                "Non-positive price: {}",
                quote.price
            )));
        }

        if let Some(max) = self.config.max_price {
            if quote.price > max {
                issues.push(ValidationIssue::hard(format!(
                    "Price {} exceeds maximum {}",
                    quote.price, max
                )));
            }
        }

        if let (Some(high), Some(low)) = (quote.high, quote.low) {
            if high < low {
                let issue = format!("High ({}) < Low ({})", high, low);
                issues.push(if self.config.reject_invalid_ohlc {
                    ValidationIssue::hard(issue)
                } else {
                    ValidationIssue::soft(issue)
                });
            }
        }

        if self.config.warn_on_zero_volume && quote.volume == Some(Decimal::ZERO) {
            issues.push(ValidationIssue::soft("Zero volume"));
        }
    }

    fn check_fundamentals(&self, fundamentals: &Fundamentals, issues: &mut Vec<ValidationIssue>) {
        if fundamentals.is_empty() {
            issues.push(ValidationIssue::hard("Empty fundamentals"));
        }
        if fundamentals.market_cap.is_some_and(|cap| cap < 0.0) {
            issues.push(ValidationIssue::soft("Negative market cap"));
        }
    }

    /// An empty list is a valid answer; only untitled items are removed.
    fn filter_articles(&self, items: Vec<Article>, issues: &mut Vec<ValidationIssue>) -> Vec<Article> {
        let before = items.len();
        let kept: Vec<Article> = items
            .into_iter()
            .filter(|a| !a.title.trim().is_empty())
            .collect();
        if kept.len() < before {
            issues.push(ValidationIssue::soft(format!(
                "Dropped {} untitled article(s)",
                before - kept.len()
            )));
        }
        kept
    }
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new()
    }
}
