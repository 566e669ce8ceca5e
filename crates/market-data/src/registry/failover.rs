//! Failover executor: walks a provider chain until one call succeeds.
//!
//! For each (symbol, category) request the executor:
//! 1. Takes a global concurrency permit
//! 2. Builds the chain from the [`ProviderRegistry`], filtered by instrument kind
//! 3. Per provider: leases a credential, waits for a rate limit token, calls the
//!    adapter under a timeout and validates the payload
//! 4. On failure, consults [`RetryClass`] to retry, switch credential, or move on
//!
//! Every suspension point also listens to a [`CancellationToken`]. Failures
//! are isolated per request; the executor never returns an error, only a
//! [`FetchResult`] describing the outcome.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::backoff::backoff_delay;
use super::key_rotator::{CredentialLease, CredentialOutcome, KeyRotator};
use super::provider_registry::{ProviderDescriptor, ProviderRegistry};
use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::skip_reason::{FetchDiagnostics, SkipReason};
use super::validator::PayloadValidator;
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{DataCategory, FetchRequest, FetchResult, InstrumentKind, Payload};
use crate::scope::{MarketIndex, MarketScopeFilter};

/// Default cap on concurrently running fetches.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// How one provider's turn in the chain ended.
enum ProviderTurn {
    Success(Payload),
    /// Move on to the next provider.
    Failed,
    /// Stop walking the chain.
    Terminal,
    Cancelled,
}

/// Executes fetch requests against provider chains.
pub struct FailoverExecutor {
    registry: Arc<ProviderRegistry>,
    rotator: Arc<KeyRotator>,
    rate_limiter: RateLimiter,
    validator: PayloadValidator,
    permits: Semaphore,
}

impl FailoverExecutor {
    /// Create an executor.
    ///
    /// Providers that need no credentials and have no pool in `rotator` get
    /// an anonymous pool sized by their `max_concurrency`. Rate limits are
    /// configured from each provider's declared [`RateLimit`](crate::provider::RateLimit).
    pub fn new(registry: ProviderRegistry, mut rotator: KeyRotator, max_concurrency: usize) -> Self {
        let rate_limiter = RateLimiter::new();

        for descriptor in registry.descriptors() {
            let id = descriptor.id();
            let limit = descriptor.provider.rate_limit();
            rate_limiter.configure(&id, RateLimitConfig::from(&limit));

            if !rotator.has_pool(&id) {
                if descriptor.provider.capabilities().requires_credentials {
                    warn!("Provider '{}' requires an API key but none is configured", id);
                } else {
                    rotator.register_anonymous(id.clone(), limit.max_concurrency);
                }
            }
        }

        Self {
            registry: Arc::new(registry),
            rotator: Arc::new(rotator),
            rate_limiter,
            validator: PayloadValidator::new(),
            permits: Semaphore::new(max_concurrency.max(1)),
        }
    }

    pub fn with_validator(mut self, validator: PayloadValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Shared credential state, e.g. for `reset_all` at quota rollover.
    pub fn rotator(&self) -> &Arc<KeyRotator> {
        &self.rotator
    }

    /// Fetch one (symbol, category). First success wins.
    pub async fn fetch(&self, request: FetchRequest, cancel: &CancellationToken) -> FetchResult {
        let mut diagnostics = FetchDiagnostics::new();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return FetchResult::cancelled(request, diagnostics),
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return FetchResult::cancelled(request, diagnostics),
            },
        };

        let chain = self
            .registry
            .providers_for_symbol(&request.symbol, request.category, &mut diagnostics);

        for descriptor in chain {
            let provider_id = descriptor.id();
            match self
                .run_provider(descriptor, &request, &mut diagnostics, cancel)
                .await
            {
                ProviderTurn::Success(payload) => {
                    diagnostics.record_success(provider_id.clone());
                    debug!(
                        "Fetched {} for {} from '{}'",
                        request.category, request.symbol, provider_id
                    );
                    return FetchResult::success(provider_id, request, payload, diagnostics);
                }
                ProviderTurn::Failed => continue,
                ProviderTurn::Terminal => break,
                ProviderTurn::Cancelled => {
                    debug!("Fetch of {} for {} cancelled", request.category, request.symbol);
                    return FetchResult::cancelled(request, diagnostics);
                }
            }
        }

        let result = FetchResult::exhausted(request, diagnostics);
        warn!(
            "All providers failed for {} {}: {}",
            result.symbol,
            result.category,
            result.error_detail().unwrap_or_default()
        );
        result
    }

    /// Fetch many requests concurrently, bounded by the global permit count.
    ///
    /// Results come back in request order.
    pub async fn fetch_all(
        &self,
        requests: Vec<FetchRequest>,
        cancel: &CancellationToken,
    ) -> Vec<FetchResult> {
        join_all(requests.into_iter().map(|request| self.fetch(request, cancel))).await
    }

    /// Fetch quotes for the broad-market indices of the given markets.
    pub async fn fetch_market_overview(
        &self,
        kinds: &BTreeSet<InstrumentKind>,
        cancel: &CancellationToken,
    ) -> Vec<(MarketIndex, FetchResult)> {
        let indices = MarketScopeFilter::indices_for(kinds);
        let requests = indices
            .iter()
            .map(|index| FetchRequest::new(index.symbol.clone(), DataCategory::Quote))
            .collect();
        let results = self.fetch_all(requests, cancel).await;
        indices.into_iter().zip(results).collect()
    }

    /// One provider's turn: lease, rate limit, call, retry per retry class.
    async fn run_provider(
        &self,
        descriptor: &ProviderDescriptor,
        request: &FetchRequest,
        diagnostics: &mut FetchDiagnostics,
        cancel: &CancellationToken,
    ) -> ProviderTurn {
        let provider_id = descriptor.id();
        let settings = &descriptor.settings;

        if !self.rotator.has_pool(&provider_id) {
            diagnostics.record_skip(provider_id, SkipReason::NoCredentials);
            return ProviderTurn::Failed;
        }

        let mut held: Option<CredentialLease> = None;
        let mut attempt: u32 = 0;

        loop {
            let lease = match held.take() {
                Some(lease) => lease,
                None => {
                    let acquired = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return ProviderTurn::Cancelled,
                        lease = self.rotator.acquire(&provider_id) => lease,
                    };
                    match acquired {
                        Some(lease) => lease,
                        None => {
                            debug!("Skipping '{}': every credential is cooling down", provider_id);
                            diagnostics.record_skip(provider_id, SkipReason::AllCredentialsCooling);
                            return ProviderTurn::Failed;
                        }
                    }
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ProviderTurn::Cancelled,
                _ = self.rate_limiter.acquire(&provider_id) => {}
            }

            debug!(
                "Calling '{}' for {} {} with {} (attempt {})",
                provider_id,
                request.symbol,
                request.category,
                lease.label(),
                attempt + 1
            );

            let call = descriptor
                .provider
                .call(lease.key(), &request.symbol, request.category);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ProviderTurn::Cancelled,
                result = tokio::time::timeout(settings.timeout, call) => match result {
                    Ok(result) => result,
                    Err(_) => Err(MarketDataError::Timeout {
                        provider: provider_id.to_string(),
                    }),
                },
            };

            let error = match result.and_then(|payload| self.validator.validate(&provider_id, payload)) {
                Ok(payload) => {
                    self.rotator.report(lease, CredentialOutcome::Success);
                    return ProviderTurn::Success(payload);
                }
                Err(error) => error,
            };

            diagnostics.record_error(provider_id.clone(), error.to_string());
            let cooling = self
                .rotator
                .record(&lease, CredentialOutcome::from_error(&error));

            match error.retry_class() {
                RetryClass::NextProvider => {
                    debug!("'{}' cannot serve {}: {}", provider_id, request.symbol, error);
                    return ProviderTurn::Failed;
                }
                RetryClass::Never => {
                    warn!("Terminal error from '{}': {}", provider_id, error);
                    return ProviderTurn::Terminal;
                }
                RetryClass::WithBackoff | RetryClass::Cooldown if attempt >= settings.max_retries => {
                    info!(
                        "'{}' failed for {} {} after {} attempt(s): {}",
                        provider_id,
                        request.symbol,
                        request.category,
                        attempt + 1,
                        error
                    );
                    return ProviderTurn::Failed;
                }
                RetryClass::WithBackoff => {
                    // Keep the credential unless the failure pushed it into cooldown
                    if !cooling {
                        held = Some(lease);
                    } else {
                        drop(lease);
                    }
                    let delay = backoff_delay(settings.backoff_base, attempt);
                    debug!(
                        "Retrying '{}' for {} in {:?} after: {}",
                        provider_id, request.symbol, delay, error
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return ProviderTurn::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryClass::Cooldown => {
                    debug!(
                        "Credential {} of '{}' cooled down, trying another one",
                        lease.label(),
                        provider_id
                    );
                    drop(lease);
                }
            }

            attempt += 1;
        }
    }
}
