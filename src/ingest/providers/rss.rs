// src/ingest/providers/rss.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};
use url::Url;

use crate::extract::credibility::domain_of;
use crate::ingest::normalize_text;
use crate::ingest::types::{ArticleCandidate, FeedSource};

/// Feeds polled by the collector when the config names none.
pub const DEFAULT_FEEDS: &[&str] = &[
    // general
    "http://rss.cnn.com/rss/cnn_topstories.rss",
    "https://www.nytimes.com/svc/collections/v1/publish/https://www.nytimes.com/section/world/rss.xml",
    "https://feeds.bbci.co.uk/news/world/rss.xml",
    "https://www.theguardian.com/world/rss",
    "https://www.washingtonpost.com/rss/world",
    // technology
    "https://feeds.feedburner.com/TechCrunch",
    "https://www.wired.com/feed/rss",
    // science
    "https://www.sciencedaily.com/rss/all.xml",
    "https://www.sciencenews.org/feed",
    // low-credibility, kept for contrast
    "https://www.infowars.com/feed/custom_feed_rss",
    "https://www.breitbart.com/feed/",
];

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// RFC 2822 feed date → RFC 3339 (UTC); unparseable input is kept verbatim.
pub fn normalize_pub_date(raw: &str) -> String {
    OffsetDateTime::parse(raw.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| dt.to_offset(UtcOffset::UTC).format(&Rfc3339).ok())
        .unwrap_or_else(|| raw.to_string())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

/// Parse an RSS 2.0 document into at most `limit` candidates.
/// Items without a link are dropped.
pub fn parse_feed(
    xml: &str,
    feed_url: &str,
    source: &str,
    limit: usize,
) -> Result<Vec<ArticleCandidate>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).with_context(|| format!("parsing rss from {feed_url}"))?;
    let collected_at = chrono::Utc::now().to_rfc3339();

    let mut out = Vec::with_capacity(rss.channel.item.len().min(limit));
    for it in rss.channel.item.into_iter().take(limit) {
        let link = it.link.as_deref().map(str::trim).unwrap_or_default();
        if link.is_empty() {
            tracing::debug!(target: "ingest", feed = feed_url, "item without link skipped");
            continue;
        }
        out.push(ArticleCandidate {
            title: normalize_text(it.title.as_deref().unwrap_or_default()),
            url: link.to_string(),
            published_date: it
                .pub_date
                .as_deref()
                .map(normalize_pub_date)
                .unwrap_or_default(),
            source: source.to_string(),
            source_url: feed_url.to_string(),
            collection_time: collected_at.clone(),
            content: normalize_text(it.description.as_deref().unwrap_or_default()),
            ..ArticleCandidate::default()
        });
    }
    Ok(out)
}

pub struct RssFeed {
    url: String,
    source: String,
    limit: usize,
    client: reqwest::Client,
}

impl RssFeed {
    pub fn new(url: &str, limit: usize, client: reqwest::Client) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("feed url {url}"))?;
        Ok(Self {
            url: url.to_string(),
            source: domain_of(&parsed),
            limit,
            client,
        })
    }

    pub fn default_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("Mozilla/5.0 (compatible; trustfeed/0.1)")
            .build()
            .context("building feed http client")
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch_candidates(&self) -> Result<Vec<ArticleCandidate>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;
        if !resp.status().is_success() {
            counter!("collector_errors_total", "stage" => "feed").increment(1);
            return Err(anyhow!("GET {}: http status {}", self.url, resp.status().as_u16()));
        }
        let body = resp.text().await.context("feed .text()")?;
        parse_feed(&body, &self.url, &self.source, self.limit)
    }

    fn name(&self) -> &str {
        &self.source
    }
}
