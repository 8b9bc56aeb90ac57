//! # Content extraction
//! URL → [`ExtractedArticle`] through a fixed-priority strategy cascade,
//! fronted by a 24h file cache.
//!
//! Order: `structured` → `boilerplate` → `readability`. A strategy wins only
//! with ≥100 chars of content; failures and short results are logged and the
//! next strategy runs. The page is downloaded at most once per call.

pub mod cache;
pub mod credibility;
pub mod fetch;
pub mod strategies;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PipelineError;

pub use cache::ExtractCache;
pub use fetch::{HttpFetcher, Page, PageFetcher};
pub use strategies::{BoilerplateStrategy, ReadabilityStrategy, StructuredStrategy};

/// Minimum content length (chars) for a strategy to count as successful.
pub const MIN_CONTENT_CHARS: usize = 100;

const WORDS_PER_MINUTE: f64 = 225.0;
const SUMMARY_THRESHOLD_CHARS: usize = 1000;

/// What a single strategy pulled out of the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyOutput {
    pub title: String,
    pub content: String,
    pub authors: Vec<String>,
    pub publish_date: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
}

impl StrategyOutput {
    /// Fill only the fields the strategy left empty.
    pub fn fill_from(&mut self, meta: strategies::PageMetadata) {
        if self.title.is_empty() {
            self.title = meta.title.unwrap_or_default();
        }
        if self.description.is_none() {
            self.description = meta.description;
        }
        if self.publish_date.is_none() {
            self.publish_date = meta.published;
        }
        if self.authors.is_empty() {
            self.authors = meta.authors;
        }
        if self.keywords.is_empty() {
            self.keywords = meta.keywords;
        }
    }
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the output already carries page metadata (title, dates, authors).
    fn harvests_metadata(&self) -> bool {
        false
    }

    /// `Ok(None)` means "nothing found"; length is checked by the cascade.
    async fn extract(&self, page: &Page) -> Result<Option<StrategyOutput>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub domain: String,
    pub source_credibility: u8,
    pub extraction_method: String,
    pub is_known_fake_news: bool,
    pub reading_time_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub cache_time: DateTime<Utc>,
}

impl ExtractedArticle {
    /// Attach domain, credibility, reading time and summary to a winning output.
    pub fn assemble(url: &Url, method: &str, out: StrategyOutput, now: DateTime<Utc>) -> Self {
        let domain = credibility::domain_of(url);
        let summary = summarize(&out.content);
        Self {
            url: url.to_string(),
            title: out.title,
            reading_time_minutes: reading_time_minutes(&out.content),
            content: out.content,
            authors: out.authors,
            publish_date: out.publish_date,
            description: out.description,
            keywords: out.keywords,
            source_credibility: credibility::credibility(&domain),
            is_known_fake_news: credibility::is_known_fake(&domain),
            domain,
            extraction_method: method.to_string(),
            summary,
            cache_time: now,
        }
    }
}

/// `round(words / 225)`, never below one minute.
pub fn reading_time_minutes(content: &str) -> u32 {
    let words = content.split_whitespace().count() as f64;
    ((words / WORDS_PER_MINUTE).round() as u32).max(1)
}

/// First three `.`-separated sentences, only for content over 1000 chars.
pub fn summarize(content: &str) -> Option<String> {
    if content.chars().count() <= SUMMARY_THRESHOLD_CHARS {
        return None;
    }
    let head: Vec<&str> = content.split('.').take(3).collect();
    Some(format!("{}.", head.join(".")).trim().to_string())
}

/// Absolute http(s) URL with a host, or `Extraction`.
pub fn validate_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| PipelineError::extraction(raw, format!("invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::extraction(
            raw,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(PipelineError::extraction(raw, "url has no host"));
    }
    Ok(url)
}

pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(StructuredStrategy),
        Box::new(BoilerplateStrategy),
        Box::new(ReadabilityStrategy),
    ]
}

pub struct Extractor {
    fetcher: Arc<dyn PageFetcher>,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    cache: Option<ExtractCache>,
}

impl Extractor {
    /// Default cascade over `fetcher`, cached in `cache`.
    pub fn new(fetcher: Arc<dyn PageFetcher>, cache: ExtractCache) -> Self {
        Self::with_strategies(fetcher, default_strategies(), Some(cache))
    }

    pub fn with_strategies(
        fetcher: Arc<dyn PageFetcher>,
        strategies: Vec<Box<dyn ExtractionStrategy>>,
        cache: Option<ExtractCache>,
    ) -> Self {
        Self {
            fetcher,
            strategies,
            cache,
        }
    }

    /// Real HTTP fetcher plus a cache under `cache_dir`.
    pub fn http(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpFetcher::new()?),
            ExtractCache::new(cache_dir),
        ))
    }

    pub fn cache(&self) -> Option<&ExtractCache> {
        self.cache.as_ref()
    }

    /// Cached extraction. A fresh cache entry is returned without any fetch.
    pub async fn extract(&self, raw_url: &str) -> Result<ExtractedArticle, PipelineError> {
        let url = validate_url(raw_url)?;

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(url.as_str()).await {
                counter!("extract_cache_hits_total").increment(1);
                tracing::debug!(target: "extract", url = %url, "cache hit");
                return Ok(hit);
            }
            counter!("extract_cache_misses_total").increment(1);
        }

        let article = self.run_cascade(&url).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&article).await {
                tracing::warn!(target: "extract", url = %url, error = %e, "cache write failed");
            }
        }
        Ok(article)
    }

    /// Cascade only: no cache lookup, no cache write. Used for batch enrichment.
    pub async fn extract_uncached(&self, raw_url: &str) -> Result<ExtractedArticle, PipelineError> {
        let url = validate_url(raw_url)?;
        self.run_cascade(&url).await
    }

    async fn run_cascade(&self, url: &Url) -> Result<ExtractedArticle, PipelineError> {
        let page = Page::new(url.clone(), self.fetcher.clone());

        for strategy in &self.strategies {
            let name = strategy.name();
            let mut out = match strategy.extract(&page).await {
                Ok(Some(out)) if out.content.chars().count() >= MIN_CONTENT_CHARS => out,
                Ok(Some(out)) => {
                    tracing::warn!(
                        target: "extract",
                        url = %url,
                        strategy = name,
                        chars = out.content.chars().count(),
                        "insufficient content"
                    );
                    counter!("extract_strategy_failures_total", "strategy" => name).increment(1);
                    continue;
                }
                Ok(None) => {
                    tracing::warn!(target: "extract", url = %url, strategy = name, "no content found");
                    counter!("extract_strategy_failures_total", "strategy" => name).increment(1);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(target: "extract", url = %url, strategy = name, "strategy failed: {e:#}");
                    counter!("extract_strategy_failures_total", "strategy" => name).increment(1);
                    continue;
                }
            };

            if !strategy.harvests_metadata() {
                if let Ok(html) = page.body().await {
                    out.fill_from(strategies::page_metadata(html));
                }
            }

            tracing::info!(target: "extract", url = %url, strategy = name, "extracted");
            return Ok(ExtractedArticle::assemble(url, name, out, Utc::now()));
        }

        tracing::error!(target: "extract", url = %url, "all strategies failed");
        Err(PipelineError::extraction(
            url.as_str(),
            "all extraction strategies failed",
        ))
    }
}
