//! Article deduplication keys.
//!
//! Two articles are duplicates when their normalized URLs match or the md5
//! of their normalized titles match. A [`NearDuplicate`] hook can add fuzzy
//! matching on top.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Url;

use crate::models::Article;

/// Optional fuzzy matcher consulted after the exact keys.
pub trait NearDuplicate: Send + Sync {
    fn is_near_duplicate(&self, candidate: &Article, kept: &Article) -> bool;
}

/// Host and path without scheme, `www.`, fragment, `utm_*` parameters or
/// trailing slash. `None` when the string has no host.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut url = Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{}", raw)))
        .ok()?;
    let host = url.host_str()?.trim_start_matches("www.").to_string();

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !name.starts_with("utm_"))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    url.set_fragment(None);
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&kept);
    }

    let mut normalized = format!("{}{}", host, url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        normalized.push('?');
        normalized.push_str(query);
    }
    Some(normalized)
}

/// md5 hex digest of the lowercased, whitespace-collapsed title.
pub fn title_hash(title: &str) -> Option<String> {
    let normalized = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    Some(format!("{:x}", md5::compute(normalized.as_bytes())))
}

/// Tracks what has been kept so far across one symbol's article lists.
#[derive(Default)]
pub struct ArticleDeduper {
    urls: HashSet<String>,
    titles: HashSet<String>,
    kept: Vec<Article>,
    near: Option<Arc<dyn NearDuplicate>>,
}

impl ArticleDeduper {
    pub fn new(near: Option<Arc<dyn NearDuplicate>>) -> Self {
        Self {
            near,
            ..Self::default()
        }
    }

    /// Returns true and remembers the article if it was not seen before.
    pub fn admit(&mut self, article: &Article) -> bool {
        let url = article.url.as_deref().and_then(normalize_url);
        let title = title_hash(&article.title);

        if url.as_ref().is_some_and(|u| self.urls.contains(u))
            || title.as_ref().is_some_and(|t| self.titles.contains(t))
        {
            return false;
        }
        if let Some(near) = &self.near {
            if self.kept.iter().any(|kept| near.is_near_duplicate(article, kept)) {
                return false;
            }
            self.kept.push(article.clone());
        }

        self.urls.extend(url);
        self.titles.extend(title);
        true
    }

    /// Keep the unseen articles of a list, preserving order.
    pub fn retain_new(&mut self, articles: Vec<Article>) -> Vec<Article> {
        articles.into_iter().filter(|a| self.admit(a)).collect()
    }
}
