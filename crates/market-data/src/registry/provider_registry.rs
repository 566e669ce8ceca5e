//! Provider registry: descriptors plus an ordered chain per data category.
//!
//! The registry is static after construction. Chain order for a category is
//! either the explicit order from configuration or, by default, provider
//! priority (lower first) with ties broken by registration order.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use super::{FetchDiagnostics, SkipReason};
use crate::config::KNOWN_PROVIDERS;
use crate::errors::ConfigError;
use crate::models::{DataCategory, ProviderId, Symbol};
use crate::provider::MarketDataProvider;

/// Default per-call timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of same-provider retries.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay for exponential backoff.
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Call settings for one provider.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    /// Upper bound for a single call.
    pub timeout: Duration,
    /// Retries against the same provider after the first attempt.
    pub max_retries: u32,
    /// Base delay for jittered exponential backoff between retries.
    pub backoff_base: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// A registered provider and how to call it.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub provider: Arc<dyn MarketDataProvider>,
    pub settings: ProviderSettings,
}

impl ProviderDescriptor {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            settings: ProviderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn id(&self) -> ProviderId {
        Cow::Borrowed(self.provider.id())
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.provider.id())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Registry of providers and their per-category chains.
pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
    /// Per category, indices into `descriptors` in chain order.
    chains: HashMap<DataCategory, Vec<usize>>,
}

impl ProviderRegistry {
    /// Build a registry ordered by provider priority.
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        let chains = DataCategory::ALL
            .iter()
            .map(|category| (*category, Self::priority_chain(&descriptors, *category)))
            .collect();
        Self {
            descriptors,
            chains,
        }
    }

    /// Build a registry with explicit chain orders for some categories.
    ///
    /// An explicit order is the complete chain for its category: providers
    /// not listed are left out. Listed providers that do not implement the
    /// category, or that are known but were not registered for lack of
    /// credentials or by configuration, are dropped with a warning. Unknown
    /// names are an error.
    pub fn with_order(
        descriptors: Vec<ProviderDescriptor>,
        order: &HashMap<DataCategory, Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new(descriptors);

        for (category, names) in order {
            let mut chain = Vec::with_capacity(names.len());
            for name in names {
                let name = name.trim().to_ascii_uppercase();
                let Some(index) = registry
                    .descriptors
                    .iter()
                    .position(|d| d.provider.id() == name)
                else {
                    if KNOWN_PROVIDERS.contains(&name.as_str()) {
                        warn!(
                            "Provider '{}' is not configured, ignoring it in the {} order",
                            name, category
                        );
                        continue;
                    }
                    return Err(ConfigError::UnknownProvider {
                        key: format!("PROVIDER_ORDER_{}", category.as_str().to_ascii_uppercase()),
                        provider: name,
                    });
                };
                if !registry.descriptors[index]
                    .provider
                    .capabilities()
                    .supports_category(*category)
                {
                    warn!(
                        "Provider '{}' does not serve '{}', ignoring it in the configured order",
                        name, category
                    );
                    continue;
                }
                if !chain.contains(&index) {
                    chain.push(index);
                }
            }
            debug!("Configured {} chain: {:?}", category, names);
            registry.chains.insert(*category, chain);
        }

        Ok(registry)
    }

    fn priority_chain(descriptors: &[ProviderDescriptor], category: DataCategory) -> Vec<usize> {
        let mut chain: Vec<usize> = descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.provider.capabilities().supports_category(category))
            .map(|(i, _)| i)
            .collect();
        // Stable sort keeps registration order for equal priorities
        chain.sort_by_key(|i| descriptors[*i].provider.priority());
        chain
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, provider_id: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.provider.id() == provider_id)
    }

    /// Ordered chain for a category.
    pub fn providers_for(&self, category: DataCategory) -> Vec<&ProviderDescriptor> {
        self.chains
            .get(&category)
            .map(|chain| chain.iter().map(|i| &self.descriptors[*i]).collect())
            .unwrap_or_default()
    }

    /// Ordered chain for a category, filtered to providers serving the symbol's kind.
    ///
    /// Filtered-out providers are recorded as skipped in `diagnostics`.
    pub fn providers_for_symbol(
        &self,
        symbol: &Symbol,
        category: DataCategory,
        diagnostics: &mut FetchDiagnostics,
    ) -> Vec<&ProviderDescriptor> {
        let mut eligible = Vec::new();
        for descriptor in self.providers_for(category) {
            if descriptor.provider.capabilities().supports_kind(symbol.kind) {
                eligible.push(descriptor);
            } else {
                diagnostics.record_skip(descriptor.id(), SkipReason::InstrumentKindMismatch);
            }
        }
        eligible
    }

    /// Position of a provider in a category chain. Lower is preferred.
    pub fn rank(&self, category: DataCategory, provider_id: &str) -> Option<usize> {
        self.chains.get(&category).and_then(|chain| {
            chain
                .iter()
                .position(|i| self.descriptors[*i].provider.id() == provider_id)
        })
    }

    /// Startup check that every required category has at least one provider.
    pub fn validate(&self, required: &[DataCategory]) -> Result<(), ConfigError> {
        for category in required {
            if self.providers_for(*category).is_empty() {
                return Err(ConfigError::NoProviderForCategory(category.to_string()));
            }
        }
        Ok(())
    }
}
