//! Exa web search provider.
//!
//! Neural web search for recent coverage of a symbol through POST /search.
//! Every call needs a key.
//! API documentation: https://docs.exa.ai/reference/search

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{domain_of, Article, DataCategory, InstrumentKind, Symbol};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::registry::ApiKey;

const BASE_URL: &str = "https://api.exa.ai";
const PROVIDER_ID: &str = "EXA";
const NUM_RESULTS: u32 = 10;
const LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    num_results: u32,
    #[serde(rename = "type")]
    search_type: &'static str,
    start_published_date: String,
    contents: Contents,
}

#[derive(Debug, Serialize)]
struct Contents {
    summary: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    title: Option<String>,
    url: String,
    published_date: Option<DateTime<Utc>>,
    score: Option<f64>,
    summary: Option<String>,
}

/// Search phrase for a symbol.
fn search_query(symbol: &Symbol) -> String {
    match symbol.kind {
        InstrumentKind::Crypto => format!("{} cryptocurrency price news", symbol.base_asset()),
        InstrumentKind::HkEquity => format!("{}.HK Hong Kong stock latest news analysis", symbol.code),
        InstrumentKind::CnAShare => format!("{} China A-share stock latest news analysis", symbol.code),
        InstrumentKind::UsEquity | InstrumentKind::Unknown => {
            format!("{} stock latest news analysis", symbol.code)
        }
    }
}

fn to_articles(response: SearchResponse) -> Vec<Article> {
    response
        .results
        .into_iter()
        .map(|hit| {
            let source = domain_of(&hit.url).unwrap_or_else(|| "exa.ai".to_string());
            let mut article = Article::new(hit.title.unwrap_or_default(), source)
                .with_url(hit.url)
                .published(hit.published_date);
            if let Some(summary) = hit.summary {
                article = article.with_summary(summary);
            }
            if let Some(score) = hit.score {
                article = article.with_score(score);
            }
            article
        })
        .collect()
}

/// Exa search provider.
pub struct ExaProvider {
    client: Client,
    base_url: String,
}

impl ExaProvider {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl Default for ExaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for ExaProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            instrument_kinds: &InstrumentKind::KNOWN,
            categories: &[DataCategory::Search],
            requires_credentials: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            max_concurrency: 5,
            min_delay: Duration::from_millis(200),
        }
    }

    async fn search(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Vec<Article>, MarketDataError> {
        let key = key.ok_or_else(|| MarketDataError::Unauthorized {
            provider: PROVIDER_ID.to_string(),
        })?;

        let body = SearchRequest {
            query: search_query(symbol),
            num_results: NUM_RESULTS,
            search_type: "auto",
            start_published_date: (Utc::now() - chrono::Duration::days(LOOKBACK_DAYS))
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            contents: Contents { summary: true },
        };
        debug!("Exa search: '{}'", body.query);

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        if !status.is_success() {
            // Exa answers 402 when the account is out of credits
            if status == reqwest::StatusCode::PAYMENT_REQUIRED {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            return Err(MarketDataError::from_status(PROVIDER_ID, status, &text));
        }

        let response: SearchResponse = serde_json::from_str(&text).map_err(|e| {
            MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse search response: {}", e))
        })?;
        Ok(to_articles(response))
    }
}
