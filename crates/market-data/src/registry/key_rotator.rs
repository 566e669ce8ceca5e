//! Per-provider credential pools with round-robin leasing and cooldowns.
//!
//! Every provider call holds a [`CredentialLease`]. A credential is leased to
//! at most one in-flight call, so outbound concurrency per provider never
//! exceeds its pool size. Outcomes reported back through
//! [`KeyRotator::report`] drive the per-credential state:
//!
//! - **Failure**: counted; reaching the threshold starts a cooldown.
//! - **QuotaExhausted**: cooldown right away.
//! - **Unauthorized**: the longer unauthorized cooldown right away.
//! - **Success**: counters and cooldown streak reset.
//!
//! Cooldown windows double with each consecutive cooldown of the same
//! credential, up to a cap. State is in-memory and survives across polling
//! cycles until [`KeyRotator::reset_all`] is called.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::errors::MarketDataError;
use crate::models::ProviderId;

/// Default number of consecutive failures before a credential cools down.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default first cooldown window.
const DEFAULT_BASE_COOLDOWN: Duration = Duration::from_secs(60);

/// Default cap for the doubling cooldown window.
const DEFAULT_MAX_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Default cooldown for a rejected key.
const DEFAULT_UNAUTHORIZED_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// An API key. `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building requests only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First four characters followed by an ellipsis.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{}…", prefix)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.masked())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// What a provider call did to the credential it used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialOutcome {
    Success,
    /// Transient failure (timeout, 5xx, malformed payload)
    Failure,
    /// Rate limited or quota spent
    QuotaExhausted,
    /// Key rejected
    Unauthorized,
    /// Says nothing about the credential (symbol not found, not supported)
    Neutral,
}

impl CredentialOutcome {
    pub fn from_error(error: &MarketDataError) -> Self {
        match error {
            MarketDataError::Timeout { .. }
            | MarketDataError::Malformed { .. }
            | MarketDataError::Unavailable { .. }
            | MarketDataError::Network(_) => Self::Failure,
            MarketDataError::RateLimited { .. } => Self::QuotaExhausted,
            MarketDataError::Unauthorized { .. } => Self::Unauthorized,
            _ => Self::Neutral,
        }
    }
}

/// Key rotator configuration.
#[derive(Clone, Debug)]
pub struct KeyRotatorConfig {
    /// Consecutive failures before a cooldown starts.
    pub failure_threshold: u32,
    /// First cooldown window; doubles per consecutive cooldown.
    pub base_cooldown: Duration,
    /// Cap for the doubling window.
    pub max_cooldown: Duration,
    /// Cooldown after the provider rejected the key.
    pub unauthorized_cooldown: Duration,
}

impl Default for KeyRotatorConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            base_cooldown: DEFAULT_BASE_COOLDOWN,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
            unauthorized_cooldown: DEFAULT_UNAUTHORIZED_COOLDOWN,
        }
    }
}

impl KeyRotatorConfig {
    /// `base * 2^streak`, capped.
    fn cooldown_window(&self, streak: u32) -> Duration {
        let factor = 2u32.saturating_pow(streak.min(16));
        self.base_cooldown
            .checked_mul(factor)
            .unwrap_or(self.max_cooldown)
            .min(self.max_cooldown)
    }
}

#[derive(Debug)]
struct Credential {
    /// `None` for an anonymous slot of a keyless provider
    key: Option<ApiKey>,
    in_use: bool,
    cooling_until: Option<Instant>,
    consecutive_failures: u32,
    cooldown_streak: u32,
}

impl Credential {
    fn new(key: Option<ApiKey>) -> Self {
        Self {
            key,
            in_use: false,
            cooling_until: None,
            consecutive_failures: 0,
            cooldown_streak: 0,
        }
    }

    fn is_cooling(&self, now: Instant) -> bool {
        self.cooling_until.is_some_and(|until| until > now)
    }

    fn label(&self, index: usize) -> String {
        match &self.key {
            Some(key) => key.masked(),
            None => format!("anonymous#{}", index),
        }
    }
}

#[derive(Debug)]
struct Pool {
    credentials: Vec<Credential>,
    /// Round-robin cursor
    next: usize,
}

struct PoolHandle {
    provider: ProviderId,
    state: Mutex<Pool>,
    released: Notify,
}

impl PoolHandle {
    /// Lock the pool, recovering from poison if necessary.
    ///
    /// A poisoned pool at worst holds a stale counter, which beats panicking
    /// in every later fetch.
    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Key rotator pool for '{}' was poisoned, recovering", self.provider);
            poisoned.into_inner()
        })
    }

    fn release(&self, index: usize) {
        {
            let mut pool = self.lock();
            if let Some(credential) = pool.credentials.get_mut(index) {
                credential.in_use = false;
            }
        }
        self.released.notify_waiters();
    }
}

/// Exclusive use of one credential for one provider call.
///
/// Dropping the lease releases the credential. Dropping without reporting
/// leaves its counters unchanged.
pub struct CredentialLease {
    pool: Arc<PoolHandle>,
    index: usize,
    key: Option<ApiKey>,
    label: String,
}

impl CredentialLease {
    /// Key to send, `None` for anonymous slots.
    pub fn key(&self) -> Option<&ApiKey> {
        self.key.as_ref()
    }

    pub fn provider(&self) -> &ProviderId {
        &self.pool.provider
    }

    /// Position of the credential inside its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Masked key or anonymous slot name, safe for logs.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("provider", &self.pool.provider)
            .field("credential", &self.label)
            .finish()
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

/// Read-only view of one credential, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialStatus {
    pub label: String,
    pub in_use: bool,
    pub cooling_for: Option<Duration>,
    pub consecutive_failures: u32,
    pub cooldown_streak: u32,
}

/// Gateway for all credential state.
///
/// Pools are registered up front; leasing and reporting are safe to call
/// from many tasks concurrently.
pub struct KeyRotator {
    pools: HashMap<String, Arc<PoolHandle>>,
    config: KeyRotatorConfig,
}

impl KeyRotator {
    /// Create a key rotator with default settings.
    pub fn new() -> Self {
        Self::with_config(KeyRotatorConfig::default())
    }

    pub fn with_config(config: KeyRotatorConfig) -> Self {
        Self {
            pools: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &KeyRotatorConfig {
        &self.config
    }

    /// Register the keys of a provider. Replaces an existing pool.
    pub fn register(&mut self, provider: ProviderId, keys: Vec<ApiKey>) {
        let credentials = keys.into_iter().map(|k| Credential::new(Some(k))).collect();
        self.insert_pool(provider, credentials);
    }

    /// Register `slots` anonymous credentials for a keyless provider.
    pub fn register_anonymous(&mut self, provider: ProviderId, slots: usize) {
        let credentials = (0..slots.max(1)).map(|_| Credential::new(None)).collect();
        self.insert_pool(provider, credentials);
    }

    fn insert_pool(&mut self, provider: ProviderId, credentials: Vec<Credential>) {
        let pool = Pool {
            credentials,
            next: 0,
        };
        debug!(
            "Key rotator: registered {} credential(s) for '{}'",
            pool.credentials.len(),
            provider
        );
        self.pools.insert(
            provider.to_string(),
            Arc::new(PoolHandle {
                provider,
                state: Mutex::new(pool),
                released: Notify::new(),
            }),
        );
    }

    pub fn has_pool(&self, provider: &str) -> bool {
        self.pools.contains_key(provider)
    }

    /// Lease the next free credential in round-robin order.
    ///
    /// Returns `None` when the provider has no pool or every credential is
    /// cooling down. When all usable credentials are merely leased, waits
    /// until one is released.
    pub async fn acquire(&self, provider: &str) -> Option<CredentialLease> {
        let handle = self.pools.get(provider)?;

        loop {
            // Registered before the check so a release in between is not missed.
            let released = handle.released.notified();

            {
                let mut pool = handle.lock();
                let now = Instant::now();
                let len = pool.credentials.len();
                if len == 0 {
                    return None;
                }

                let start = pool.next;
                let free = (0..len)
                    .map(|offset| (start + offset) % len)
                    .find(|&i| {
                        let c = &pool.credentials[i];
                        !c.in_use && !c.is_cooling(now)
                    });

                if let Some(index) = free {
                    pool.next = (index + 1) % len;
                    let credential = &mut pool.credentials[index];
                    credential.in_use = true;
                    if credential.cooling_until.is_some_and(|until| until <= now) {
                        debug!(
                            "Key rotator: cooldown of {} for '{}' expired",
                            credential.label(index),
                            provider
                        );
                        credential.cooling_until = None;
                    }
                    let label = credential.label(index);
                    return Some(CredentialLease {
                        pool: Arc::clone(handle),
                        index,
                        key: credential.key.clone(),
                        label,
                    });
                }

                if pool.credentials.iter().all(|c| c.is_cooling(now)) {
                    debug!("Key rotator: every credential of '{}' is cooling down", provider);
                    return None;
                }
            }

            debug!("Key rotator: waiting for a free credential of '{}'", provider);
            released.await;
        }
    }

    /// Record the outcome of a call and release the lease.
    pub fn report(&self, lease: CredentialLease, outcome: CredentialOutcome) {
        self.record(&lease, outcome);
        drop(lease);
    }

    /// Record the outcome of a call while keeping the lease, e.g. to retry
    /// with the same credential.
    ///
    /// Returns true when the credential is now cooling down and should not
    /// be used for the retry.
    pub fn record(&self, lease: &CredentialLease, outcome: CredentialOutcome) -> bool {
        let handle = &lease.pool;
        let mut pool = handle.lock();
        let Some(credential) = pool.credentials.get_mut(lease.index) else {
            return false;
        };
        let label = lease.label.as_str();

        match outcome {
            CredentialOutcome::Success => {
                credential.consecutive_failures = 0;
                credential.cooling_until = None;
                credential.cooldown_streak = 0;
            }
            CredentialOutcome::Failure => {
                credential.consecutive_failures += 1;
                if credential.consecutive_failures >= self.config.failure_threshold {
                    let window = self.config.cooldown_window(credential.cooldown_streak);
                    self.start_cooldown(credential, window);
                    info!(
                        "Key rotator: {} of '{}' cooling down for {:?} after repeated failures",
                        label, handle.provider, window
                    );
                } else {
                    debug!(
                        "Key rotator: failure for {} of '{}' ({}/{})",
                        label,
                        handle.provider,
                        credential.consecutive_failures,
                        self.config.failure_threshold
                    );
                }
            }
            CredentialOutcome::QuotaExhausted => {
                let window = self.config.cooldown_window(credential.cooldown_streak);
                self.start_cooldown(credential, window);
                info!(
                    "Key rotator: {} of '{}' rate limited, cooling down for {:?}",
                    label, handle.provider, window
                );
            }
            CredentialOutcome::Unauthorized => {
                let window = self.config.unauthorized_cooldown;
                self.start_cooldown(credential, window);
                warn!(
                    "Key rotator: {} of '{}' was rejected, cooling down for {:?}",
                    label, handle.provider, window
                );
            }
            CredentialOutcome::Neutral => {}
        }

        credential.is_cooling(Instant::now())
    }

    fn start_cooldown(&self, credential: &mut Credential, window: Duration) {
        credential.cooling_until = Some(Instant::now() + window);
        credential.cooldown_streak = credential.cooldown_streak.saturating_add(1);
        credential.consecutive_failures = 0;
    }

    /// True if the provider has a pool and every credential is cooling down.
    pub fn all_cooling(&self, provider: &str) -> bool {
        let Some(handle) = self.pools.get(provider) else {
            return false;
        };
        let pool = handle.lock();
        let now = Instant::now();
        !pool.credentials.is_empty() && pool.credentials.iter().all(|c| c.is_cooling(now))
    }

    /// Per-credential state of a provider pool.
    pub fn status(&self, provider: &str) -> Vec<CredentialStatus> {
        let Some(handle) = self.pools.get(provider) else {
            return Vec::new();
        };
        let pool = handle.lock();
        let now = Instant::now();
        pool.credentials
            .iter()
            .enumerate()
            .map(|(i, c)| CredentialStatus {
                label: c.label(i),
                in_use: c.in_use,
                cooling_for: c
                    .cooling_until
                    .filter(|until| *until > now)
                    .map(|until| until - now),
                consecutive_failures: c.consecutive_failures,
                cooldown_streak: c.cooldown_streak,
            })
            .collect()
    }

    /// Clear counters and cooldowns of one provider. Leases in flight stay valid.
    pub fn reset(&self, provider: &str) {
        if let Some(handle) = self.pools.get(provider) {
            {
                let mut pool = handle.lock();
                for credential in pool.credentials.iter_mut() {
                    credential.cooling_until = None;
                    credential.consecutive_failures = 0;
                    credential.cooldown_streak = 0;
                }
            }
            handle.released.notify_waiters();
            info!("Key rotator: reset credentials for '{}'", provider);
        }
    }

    /// Clear all pools, e.g. when provider quota windows roll over.
    pub fn reset_all(&self) {
        for provider in self.pools.keys() {
            self.reset(provider);
        }
    }
}

impl Default for KeyRotator {
    fn default() -> Self {
        Self::new()
    }
}
