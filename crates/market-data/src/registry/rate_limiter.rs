//! Token bucket rate limiter for market data providers.
//!
//! Each provider gets its own bucket, sized from the provider's declared
//! [`RateLimit`]. The bucket also enforces the provider's minimum delay
//! between two consecutive requests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::models::ProviderId;
use crate::provider::RateLimit;

/// Default rate limit: 60 requests per minute.
const DEFAULT_REQUESTS_PER_MINUTE: f64 = 60.0;

/// Default bucket capacity (allows bursting).
const DEFAULT_BUCKET_CAPACITY: f64 = 5.0;

/// Token bucket for a single provider.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was refilled.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
    /// Minimum spacing between two grants.
    min_delay: Duration,
    /// Time of the last granted token.
    last_grant: Option<Instant>,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_capacity.max(1.0);
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: (config.requests_per_minute.max(1) as f64) / 60.0,
            capacity,
            min_delay: config.min_delay,
            last_grant: None,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// Take a token, or return how long to wait for one.
    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        let spacing = self
            .last_grant
            .map(|last| (last + self.min_delay).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        if self.tokens >= 1.0 && spacing.is_zero() {
            self.tokens -= 1.0;
            self.last_grant = Some(now);
            return Ok(());
        }

        let refill_wait = if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        };
        Err(refill_wait.max(spacing))
    }
}

/// Rate limiter configuration for a provider.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum requests per minute.
    pub requests_per_minute: u32,
    /// Maximum burst capacity.
    pub burst_capacity: f64,
    /// Minimum delay between requests.
    pub min_delay: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE as u32,
            burst_capacity: DEFAULT_BUCKET_CAPACITY,
            min_delay: Duration::ZERO,
        }
    }
}

impl From<&RateLimit> for RateLimitConfig {
    fn from(limit: &RateLimit) -> Self {
        Self {
            requests_per_minute: limit.requests_per_minute,
            burst_capacity: limit.max_concurrency as f64,
            min_delay: limit.min_delay,
        }
    }
}

/// Token bucket rate limiter for multiple providers.
///
/// Buckets are created on first use, from the provider's configuration if
/// one was registered and from defaults otherwise.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    configs: Mutex<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    ///
    /// The worst case after poisoning is slightly incorrect rate limiting,
    /// which is better than panicking.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure rate limits for a specific provider.
    pub fn configure(&self, provider: &ProviderId, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), config);
        drop(configs);

        // Rebuild the bucket with the new limits on next use
        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_ref());
    }

    /// Wait until a token is available for the provider.
    pub async fn acquire(&self, provider: &ProviderId) {
        loop {
            let wait = match self.try_acquire_or_wait(provider) {
                Ok(()) => {
                    debug!("Rate limiter: acquired token for '{}'", provider);
                    return;
                }
                Err(wait) => wait,
            };

            debug!("Rate limiter: waiting {:?} for provider '{}'", wait, provider);
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self, provider: &ProviderId) -> bool {
        self.try_acquire_or_wait(provider).is_ok()
    }

    fn try_acquire_or_wait(&self, provider: &ProviderId) -> Result<(), Duration> {
        let config = self.config_for(provider);
        let mut buckets = self.lock_buckets();
        buckets
            .entry(provider.to_string())
            .or_insert_with(|| TokenBucket::new(&config))
            .try_acquire(Instant::now())
    }

    /// Reset the rate limiter for a provider.
    pub fn reset(&self, provider: &ProviderId) {
        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_ref());
    }

    fn config_for(&self, provider: &ProviderId) -> RateLimitConfig {
        self.lock_configs()
            .get(provider.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
