//! Environment-style configuration.
//!
//! [`EngineConfig::from_vars`] is pure and testable; [`EngineConfig::from_env`]
//! reads the process environment. Callers load `.env` first if they want it.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheTtl, DEFAULT_NEWS_TTL, DEFAULT_QUOTE_TTL, DEFAULT_SEARCH_TTL};
use crate::errors::ConfigError;
use crate::models::DataCategory;
use crate::registry::{ApiKey, KeyRotatorConfig, ProviderSettings, DEFAULT_MAX_CONCURRENCY};

/// Provider ids accepted in `PROVIDER_ORDER_<CATEGORY>` lists.
pub const KNOWN_PROVIDERS: [&str; 6] = [
    "FINNHUB", "COINGECKO", "COINDESK", "YAHOO", "MASSIVE", "EXA",
];

/// API keys per provider. Empty means not configured.
#[derive(Clone, Debug, Default)]
pub struct ProviderKeys {
    pub finnhub: Vec<ApiKey>,
    pub coingecko: Vec<ApiKey>,
    pub coindesk: Vec<ApiKey>,
    pub massive: Vec<ApiKey>,
    pub exa: Vec<ApiKey>,
}

/// Everything the engine needs to run.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Raw watchlist entries, in configured order
    pub watchlist: Vec<String>,
    /// Categories fetched for every symbol
    pub categories: Vec<DataCategory>,
    pub keys: ProviderKeys,
    pub yahoo_enabled: bool,
    /// Explicit chain per category, by provider id
    pub provider_order: HashMap<DataCategory, Vec<String>>,
    pub max_concurrency: usize,
    pub provider_settings: ProviderSettings,
    pub rotator: KeyRotatorConfig,
    /// Also fetch broad-market indices of the watchlist's markets
    pub market_overview: bool,
    pub max_article_age: Duration,
    /// Per-category lifetime of cached payloads within a day
    pub cache_ttl: CacheTtl,
    pub crypto_symbols: Vec<String>,
    pub equity_denylist: Vec<String>,
    /// `None` runs a single cycle
    pub poll_interval: Option<Duration>,
}

impl EngineConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from key/value pairs. Empty values count as unset.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = Vars::new(vars);

        let watchlist = vars
            .list("STOCK_LIST")
            .ok_or(ConfigError::Missing("STOCK_LIST"))?;
        if watchlist.is_empty() {
            return Err(ConfigError::EmptyWatchlist);
        }

        let categories = match vars.list("FETCH_CATEGORIES") {
            Some(names) => names
                .iter()
                .map(|name| {
                    name.parse::<DataCategory>()
                        .map_err(|_| invalid("FETCH_CATEGORIES", name))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![
                DataCategory::Quote,
                DataCategory::Fundamentals,
                DataCategory::News,
            ],
        };

        let mut provider_order = HashMap::new();
        for category in DataCategory::ALL {
            let key = format!("PROVIDER_ORDER_{}", category.as_str().to_ascii_uppercase());
            if let Some(names) = vars.list(&key) {
                let names: Vec<String> = names.iter().map(|n| n.to_ascii_uppercase()).collect();
                if let Some(unknown) = names.iter().find(|n| !KNOWN_PROVIDERS.contains(&n.as_str())) {
                    return Err(ConfigError::UnknownProvider {
                        key,
                        provider: unknown.clone(),
                    });
                }
                provider_order.insert(category, names);
            }
        }

        let keys = ProviderKeys {
            finnhub: vars.keys(&["FINNHUB_API_KEYS", "FINNHUB_API_KEY"]),
            coingecko: vars.keys(&["COINGECKO_API_KEYS", "CRYPTO_API_KEY"]),
            coindesk: vars.keys(&["COINDESK_API_KEYS", "COINDESK_API_KEY"]),
            massive: vars.keys(&["MASSIVE_API_KEYS", "MASSIVE_API_KEY"]),
            exa: vars.keys(&["EXA_API_KEYS", "EXA_API_KEY"]),
        };

        let provider_settings = ProviderSettings {
            timeout: Duration::from_secs(vars.parse("FETCH_TIMEOUT_SECS", 10u64)?),
            max_retries: vars.parse("FETCH_MAX_RETRIES", 2u32)?,
            backoff_base: Duration::from_millis(vars.parse("RETRY_BACKOFF_MS", 500u64)?),
        };

        let rotator = KeyRotatorConfig {
            failure_threshold: vars.parse("CREDENTIAL_FAILURE_THRESHOLD", 3u32)?.max(1),
            base_cooldown: Duration::from_secs(vars.parse("CREDENTIAL_COOLDOWN_SECS", 60u64)?),
            max_cooldown: Duration::from_secs(vars.parse("CREDENTIAL_MAX_COOLDOWN_SECS", 1800u64)?),
            unauthorized_cooldown: Duration::from_secs(
                vars.parse("CREDENTIAL_UNAUTHORIZED_COOLDOWN_SECS", 3600u64)?,
            ),
        };

        let cache_ttl = CacheTtl {
            quote: vars.scaled_secs("CACHE_QUOTE_TTL_SECS", DEFAULT_QUOTE_TTL.as_secs(), 1)?,
            news: vars.scaled_secs("CACHE_NEWS_TTL_SECS", DEFAULT_NEWS_TTL.as_secs(), 1)?,
            search: vars.scaled_secs("CACHE_SEARCH_TTL_SECS", DEFAULT_SEARCH_TTL.as_secs(), 1)?,
        };

        let poll_interval = vars.scaled_secs("POLL_INTERVAL_MINUTES", 0, 60)?;

        Ok(Self {
            watchlist,
            categories,
            keys,
            yahoo_enabled: vars.bool("YAHOO_ENABLED", true)?,
            provider_order,
            max_concurrency: vars.parse("MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?.max(1),
            provider_settings,
            rotator,
            market_overview: vars.bool("MARKET_OVERVIEW", true)?,
            max_article_age: vars.scaled_secs("MAX_ARTICLE_AGE_DAYS", 7, 86_400)?,
            cache_ttl,
            crypto_symbols: vars.list("CRYPTO_SYMBOLS").unwrap_or_default(),
            equity_denylist: vars.list("EQUITY_DENYLIST").unwrap_or_default(),
            poll_interval: (!poll_interval.is_zero()).then_some(poll_interval),
        })
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Key/value lookup with typed accessors.
struct Vars(HashMap<String, String>);

impl Vars {
    fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into().trim().to_string()))
                .filter(|(_, v)| !v.is_empty())
                .collect(),
        )
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => value.parse().map_err(|_| invalid(key, value)),
            None => Ok(default),
        }
    }

    /// Whole units of `unit_secs` seconds. Overflow is an invalid value.
    fn scaled_secs(&self, key: &str, default: u64, unit_secs: u64) -> Result<Duration, ConfigError> {
        let units: u64 = self.parse(key, default)?;
        units
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| invalid(key, self.get(key).unwrap_or_default()))
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(_) => Err(invalid(key, self.get(key).unwrap_or_default())),
        }
    }

    /// Comma separated list with blanks removed. `None` when unset.
    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Keys from the first key name that is set.
    fn keys(&self, names: &[&str]) -> Vec<ApiKey> {
        names
            .iter()
            .find_map(|name| self.list(name))
            .unwrap_or_default()
            .into_iter()
            .map(ApiKey::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        EngineConfig::from_vars(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("STOCK_LIST", "BTC, hk00700 ,AAPL")]).unwrap();
        assert_eq!(config.watchlist, vec!["BTC", "hk00700", "AAPL"]);
        assert_eq!(
            config.categories,
            vec![DataCategory::Quote, DataCategory::Fundamentals, DataCategory::News]
        );
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.provider_settings.timeout, Duration::from_secs(10));
        assert_eq!(config.provider_settings.max_retries, 2);
        assert_eq!(config.rotator.failure_threshold, 3);
        assert!(config.yahoo_enabled);
        assert!(config.market_overview);
        assert!(config.poll_interval.is_none());
        assert!(config.keys.finnhub.is_empty());
    }

    #[test]
    fn test_missing_and_empty_watchlist() {
        assert_eq!(load(&[]).err(), Some(ConfigError::Missing("STOCK_LIST")));
        assert_eq!(
            load(&[("STOCK_LIST", " , ,")]).err(),
            Some(ConfigError::EmptyWatchlist)
        );
    }

    #[test]
    fn test_key_lists_and_aliases() {
        let config = load(&[
            ("STOCK_LIST", "AAPL"),
            ("FINNHUB_API_KEYS", "k1,k2"),
            ("FINNHUB_API_KEY", "ignored"),
            ("CRYPTO_API_KEY", "cg"),
        ])
        .unwrap();
        assert_eq!(config.keys.finnhub.len(), 2);
        assert_eq!(config.keys.finnhub[1].expose(), "k2");
        assert_eq!(config.keys.coingecko[0].expose(), "cg");

        let config = load(&[("STOCK_LIST", "AAPL"), ("MASSIVE_API_KEY", "m1")]).unwrap();
        assert_eq!(config.keys.massive.len(), 1);
        assert_eq!(config.keys.massive[0].expose(), "m1");
    }

    #[test]
    fn test_provider_order() {
        let config = load(&[("STOCK_LIST", "AAPL"), ("PROVIDER_ORDER_QUOTE", "yahoo,FINNHUB")]).unwrap();
        assert_eq!(
            config.provider_order.get(&DataCategory::Quote),
            Some(&vec!["YAHOO".to_string(), "FINNHUB".to_string()])
        );

        let err = load(&[("STOCK_LIST", "AAPL"), ("PROVIDER_ORDER_NEWS", "FINNHUB,BLOOMBERG")]).err();
        assert_eq!(
            err,
            Some(ConfigError::UnknownProvider {
                key: "PROVIDER_ORDER_NEWS".to_string(),
                provider: "BLOOMBERG".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_numbers_are_errors() {
        let err = load(&[("STOCK_LIST", "AAPL"), ("MAX_CONCURRENCY", "eight")]).err();
        assert_eq!(
            err,
            Some(ConfigError::InvalidValue {
                key: "MAX_CONCURRENCY".to_string(),
                value: "eight".to_string(),
            })
        );

        let err = load(&[("STOCK_LIST", "AAPL"), ("YAHOO_ENABLED", "maybe")]).err();
        assert!(matches!(err, Some(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_categories_and_interval() {
        let config = load(&[
            ("STOCK_LIST", "AAPL"),
            ("FETCH_CATEGORIES", "quote,search"),
            ("POLL_INTERVAL_MINUTES", "15"),
        ])
        .unwrap();
        assert_eq!(config.categories, vec![DataCategory::Quote, DataCategory::Search]);
        assert_eq!(config.poll_interval, Some(Duration::from_secs(900)));
        assert_eq!(config.cache_ttl.quote, Duration::from_secs(300));

        let err = load(&[("STOCK_LIST", "AAPL"), ("FETCH_CATEGORIES", "quote,weather")]).err();
        assert!(matches!(err, Some(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_oversized_durations_are_errors() {
        let err = load(&[("STOCK_LIST", "AAPL"), ("MAX_ARTICLE_AGE_DAYS", "300000000000000")]).err();
        assert_eq!(
            err,
            Some(ConfigError::InvalidValue {
                key: "MAX_ARTICLE_AGE_DAYS".to_string(),
                value: "300000000000000".to_string(),
            })
        );

        let err = load(&[("STOCK_LIST", "AAPL"), ("POLL_INTERVAL_MINUTES", "18446744073709551615")]).err();
        assert!(matches!(
            err,
            Some(ConfigError::InvalidValue { ref key, .. }) if key == "POLL_INTERVAL_MINUTES"
        ));

        let config = load(&[("STOCK_LIST", "AAPL"), ("MAX_ARTICLE_AGE_DAYS", "30")]).unwrap();
        assert_eq!(config.max_article_age, Duration::from_secs(30 * 86_400));
    }
}
