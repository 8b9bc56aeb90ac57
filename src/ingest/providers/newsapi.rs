// src/ingest/providers/newsapi.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::types::{ArticleCandidate, FeedSource};

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org";

#[derive(Debug, Deserialize)]
struct TopHeadlines {
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    title: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    source: Option<ApiSource>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSource {
    name: Option<String>,
}

/// NewsAPI top headlines (English). Only constructed when a key is configured.
pub struct NewsApiSource {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl NewsApiSource {
    pub fn new(api_key: &str, client: reqwest::Client) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, client)
    }

    pub fn with_base_url(api_key: &str, base_url: &str, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl FeedSource for NewsApiSource {
    async fn fetch_candidates(&self) -> Result<Vec<ArticleCandidate>> {
        let resp = self
            .client
            .get(format!("{}/v2/top-headlines", self.base_url))
            .query(&[("language", "en"), ("apiKey", self.api_key.as_str())])
            .send()
            .await
            .context("newsapi GET")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("newsapi returned status {}", status.as_u16()));
        }
        let body: TopHeadlines = resp.json().await.context("newsapi json")?;

        let collected_at = chrono::Utc::now().to_rfc3339();
        let out = body
            .articles
            .into_iter()
            .filter_map(|a| {
                let url = a.url.filter(|u| !u.trim().is_empty())?;
                Some(ArticleCandidate {
                    title: normalize_text(a.title.as_deref().unwrap_or_default()),
                    url,
                    published_date: a.published_at.unwrap_or_default(),
                    source: a.source.and_then(|s| s.name).unwrap_or_default(),
                    source_url: String::new(),
                    collection_time: collected_at.clone(),
                    content: normalize_text(a.description.as_deref().unwrap_or_default()),
                    ..ArticleCandidate::default()
                })
            })
            .collect();
        Ok(out)
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}
