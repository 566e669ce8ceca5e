//! Massive financial news provider.
//!
//! Company and market news through GET /news/search. Articles come with a
//! provider sentiment label and a relevance score, which feed the record's
//! sentiment summary. Every call needs a key, sent as a bearer token.
//! API documentation: https://massive.com/docs/rest/quickstart

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{Article, DataCategory, InstrumentKind, Sentiment, Symbol};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
use crate::registry::ApiKey;

const BASE_URL: &str = "https://api.massive.com/v1";
const PROVIDER_ID: &str = "MASSIVE";
const LOOKBACK_DAYS: i64 = 7;
const MAX_NEWS_ITEMS: u32 = 15;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: String,
    summary: Option<String>,
    #[serde(default)]
    url: String,
    source: Option<NewsSource>,
    published_at: Option<DateTime<Utc>>,
    sentiment: Option<String>,
    relevance_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NewsSource {
    name: Option<String>,
}

/// Search terms for a symbol: the ticker, plus the exchange form where one exists.
fn news_query(symbol: &Symbol) -> String {
    match symbol.kind {
        InstrumentKind::Crypto => symbol.base_asset().to_string(),
        InstrumentKind::HkEquity => format!("{0}.HK OR {0}", symbol.code),
        _ => symbol.code.to_uppercase(),
    }
}

fn parse_news(text: &str) -> Result<Vec<Article>, MarketDataError> {
    let response: SearchResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::malformed(PROVIDER_ID, format!("Failed to parse news response: {}", e))
    })?;

    Ok(response
        .articles
        .into_iter()
        .map(|item| {
            let source = item
                .source
                .and_then(|s| s.name)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Massive".to_string());
            let mut article = Article::new(item.title, source)
                .with_url(item.url)
                .published(item.published_at)
                .with_sentiment(item.sentiment.as_deref().and_then(Sentiment::from_label));
            if let Some(summary) = item.summary {
                article = article.with_summary(summary);
            }
            if let Some(score) = item.relevance_score {
                article = article.with_score(score);
            }
            article
        })
        .collect())
}

/// Massive news provider.
pub struct MassiveProvider {
    client: Client,
    base_url: String,
}

impl MassiveProvider {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// Point the provider at another host (tests, proxies).
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

impl Default for MassiveProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MassiveProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        4
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            instrument_kinds: &InstrumentKind::KNOWN,
            categories: &[DataCategory::News],
            requires_credentials: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            max_concurrency: 3,
            min_delay: Duration::from_millis(200),
        }
    }

    async fn get_news(
        &self,
        key: Option<&ApiKey>,
        symbol: &Symbol,
    ) -> Result<Vec<Article>, MarketDataError> {
        let key = key.ok_or_else(|| MarketDataError::Unauthorized {
            provider: PROVIDER_ID.to_string(),
        })?;

        let query = news_query(symbol);
        let since = (Utc::now() - chrono::Duration::days(LOOKBACK_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        let limit = MAX_NEWS_ITEMS.to_string();
        debug!("Massive news search: '{}' since {}", query, since);

        let response = self
            .client
            .get(format!("{}/news/search", self.base_url))
            .bearer_auth(key.expose())
            .query(&[
                ("q", query.as_str()),
                ("language", "en"),
                ("published_after", since.as_str()),
                ("limit", limit.as_str()),
                ("sort", "published_at:desc"),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        if !status.is_success() {
            return Err(MarketDataError::from_status(PROVIDER_ID, status, &text));
        }
        parse_news(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Exchange;

    #[test]
    fn test_queries_per_kind() {
        let tencent = Symbol::new("hk00700", "00700", InstrumentKind::HkEquity, Some(Exchange::Hkex));
        assert_eq!(news_query(&tencent), "00700.HK OR 00700");

        let aapl = Symbol::new("aapl", "aapl", InstrumentKind::UsEquity, Some(Exchange::Us));
        assert_eq!(news_query(&aapl), "AAPL");
    }

    #[test]
    fn test_parse_news_with_sentiment() {
        let body = r#"{"articles":[
            {"title":"Tencent lifts buyback","summary":"Board approves","url":"https://www.scmp.com/t","source":{"name":"SCMP"},"published_at":"2026-03-01T08:00:00Z","sentiment":"positive","relevance_score":0.91,"symbols":["00700"]},
            {"title":"Gaming rules tighten","url":"","source":{},"sentiment":"unknown"}
        ]}"#;
        let articles = parse_news(body).unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source, "SCMP");
        assert_eq!(articles[0].sentiment, Some(Sentiment::Positive));
        assert_eq!(articles[0].score, Some(0.91));
        assert!(articles[0].published_at.is_some());
        assert_eq!(articles[1].source, "Massive");
        assert_eq!(articles[1].sentiment, None);
        assert!(articles[1].url.is_none());
    }

    #[test]
    fn test_missing_articles_is_empty() {
        assert!(parse_news("{}").unwrap().is_empty());
        assert!(matches!(
            parse_news("rate limited").unwrap_err(),
            MarketDataError::Malformed { .. }
        ));
    }

    #[test]
    fn test_status_mapping() {
        let err = MarketDataError::from_status(PROVIDER_ID, reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, MarketDataError::RateLimited { ref provider } if provider == "MASSIVE"));
    }
}
