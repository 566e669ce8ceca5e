//! Provider orchestration: chains, credentials, rate limits, failover.

mod backoff;
mod failover;
mod key_rotator;
mod provider_registry;
mod rate_limiter;
mod skip_reason;
mod validator;

pub use backoff::backoff_delay;
pub use failover::{FailoverExecutor, DEFAULT_MAX_CONCURRENCY};
pub use key_rotator::{
    ApiKey, CredentialLease, CredentialOutcome, CredentialStatus, KeyRotator, KeyRotatorConfig,
};
pub use provider_registry::{ProviderDescriptor, ProviderRegistry, ProviderSettings};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use skip_reason::{FetchDiagnostics, ProviderAttempt, SkipReason};
pub use validator::{PayloadValidator, ValidationIssue, ValidationSeverity, ValidatorConfig};
