// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One collected article as written to a batch artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub title: String,
    pub url: String,
    pub published_date: String, // RFC 3339 when the feed date parsed, verbatim otherwise
    pub source: String,         // e.g. "bbc.co.uk"
    pub source_url: String,     // feed the item came from; empty for aggregators
    pub collection_time: String,
    pub content: String, // raw summary, replaced by full text on enrichment

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_candidates(&self) -> Result<Vec<ArticleCandidate>>;
    fn name(&self) -> &str;
}
