//! Per-fetch diagnostics: which providers were tried, skipped, or failed.

use std::fmt;

use crate::models::ProviderId;

/// Why a provider was skipped during fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Provider doesn't serve this instrument kind.
    InstrumentKindMismatch,

    /// Every credential of the provider is cooling down.
    AllCredentialsCooling,

    /// Provider has no credential pool registered.
    NoCredentials,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstrumentKindMismatch => f.write_str("instrument kind not supported"),
            Self::AllCredentialsCooling => f.write_str("all credentials cooling down"),
            Self::NoCredentials => f.write_str("no credentials"),
        }
    }
}

/// Record of a single provider attempt during a fetch.
#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub skipped: Option<SkipReason>,
    pub error: Option<String>,
    pub success: bool,
}

/// Ordered trail of attempts for one (symbol, category) fetch.
#[derive(Clone, Debug, Default)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: Some(reason),
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, provider_id: ProviderId, error: String) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: Some(error),
            success: false,
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: None,
            success: true,
        });
    }

    /// Summary for logging and absence markers.
    ///
    /// `FINNHUB: ERROR (Timeout: FINNHUB) -> YAHOO: SUCCESS`
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.provider_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.provider_id, err)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    pub fn skip_reasons(&self) -> Vec<(&ProviderId, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.as_ref().map(|s| (&a.provider_id, s)))
            .collect()
    }

    pub fn errors(&self) -> Vec<(&ProviderId, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (&a.provider_id, e.as_str())))
            .collect()
    }

    /// Number of failed calls made to one provider.
    pub fn error_count(&self, provider_id: &str) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.error.is_some() && a.provider_id == provider_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = FetchDiagnostics::new();
        diag.record_error(Cow::Borrowed("FINNHUB"), "Timeout".to_string());
        diag.record_skip(Cow::Borrowed("EXA"), SkipReason::AllCredentialsCooling);
        diag.record_success(Cow::Borrowed("YAHOO"));

        assert_eq!(
            diag.summary(),
            "FINNHUB: ERROR (Timeout) -> EXA: SKIPPED (all credentials cooling down) -> YAHOO: SUCCESS"
        );
    }

    #[test]
    fn test_has_success() {
        let mut diag = FetchDiagnostics::new();
        diag.record_skip(Cow::Borrowed("COINGECKO"), SkipReason::InstrumentKindMismatch);
        assert!(!diag.has_success());

        diag.record_success(Cow::Borrowed("YAHOO"));
        assert!(diag.has_success());
    }

    #[test]
    fn test_error_count() {
        let mut diag = FetchDiagnostics::new();
        diag.record_error(Cow::Borrowed("FINNHUB"), "Timeout".to_string());
        diag.record_error(Cow::Borrowed("FINNHUB"), "Timeout".to_string());
        diag.record_skip(Cow::Borrowed("FINNHUB"), SkipReason::AllCredentialsCooling);

        assert_eq!(diag.error_count("FINNHUB"), 2);
        assert_eq!(diag.skip_reasons().len(), 1);
        assert_eq!(diag.errors().len(), 2);
    }
}
