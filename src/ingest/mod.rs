// src/ingest/mod.rs
pub mod batch;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use metrics::{counter, gauge};
use once_cell::sync::OnceCell;

use crate::config::PipelineConfig;
use crate::extract::Extractor;
use crate::ingest::providers::{NewsApiSource, RssFeed};
use crate::ingest::types::{ArticleCandidate, FeedSource};

/// Normalize feed text: decode entities, strip tags, straighten quotes,
/// collapse whitespace. Punctuation is kept (titles end in `?` legitimately).
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Result of one collector pass.
#[derive(Debug, Clone)]
pub struct BatchArtifact {
    pub path: PathBuf,
    pub items: usize,
    pub enriched: usize,
}

pub struct Collector {
    sources: Vec<Box<dyn FeedSource>>,
    extractor: Option<Arc<Extractor>>,
    data_dir: PathBuf,
    enrich_limit: usize,
    enrich_delay: Duration,
}

impl Collector {
    pub fn new(
        sources: Vec<Box<dyn FeedSource>>,
        extractor: Option<Arc<Extractor>>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources,
            extractor,
            data_dir: data_dir.into(),
            enrich_limit: 20,
            enrich_delay: Duration::from_secs(1),
        }
    }

    pub fn with_enrichment(mut self, limit: usize, delay: Duration) -> Self {
        self.enrich_limit = limit;
        self.enrich_delay = delay;
        self
    }

    /// RSS feeds from config, NewsAPI when a key is set, HTTP extractor.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let client = RssFeed::default_client()?;
        let mut sources: Vec<Box<dyn FeedSource>> = Vec::new();
        for url in &cfg.collector.feeds {
            match RssFeed::new(url, cfg.collector.per_feed_limit, client.clone()) {
                Ok(feed) => sources.push(Box::new(feed)),
                Err(e) => tracing::warn!(target: "ingest", feed = %url, "feed skipped: {e:#}"),
            }
        }
        if cfg.collector.newsapi_key.trim().is_empty() {
            tracing::info!(target: "ingest", "NEWSAPI_KEY not set; aggregator source disabled");
        } else {
            sources.push(Box::new(NewsApiSource::new(&cfg.collector.newsapi_key, client)));
        }
        let extractor = Extractor::http(&cfg.paths.cache_dir)?;
        Ok(Self::new(sources, Some(Arc::new(extractor)), &cfg.paths.data_dir).with_enrichment(
            cfg.collector.enrich_limit,
            Duration::from_millis(cfg.collector.enrich_delay_ms),
        ))
    }

    /// All sources in order; a failing source is logged and skipped.
    pub async fn fetch_all(&self) -> Vec<ArticleCandidate> {
        let mut all = Vec::new();
        for source in &self.sources {
            match source.fetch_candidates().await {
                Ok(mut items) => {
                    tracing::info!(target: "ingest", source = source.name(), items = items.len(), "fetched");
                    all.append(&mut items);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, source = source.name(), "source error");
                    counter!("collector_errors_total", "stage" => "feed").increment(1);
                }
            }
        }
        all
    }

    /// Enrich each candidate in place through the extraction cascade, with
    /// `enrich_delay` between the end of one call and the start of the next.
    /// Returns how many were enriched.
    pub async fn enrich(&self, items: &mut [ArticleCandidate]) -> usize {
        let Some(extractor) = &self.extractor else {
            return 0;
        };

        let mut enriched = 0;
        for (idx, item) in items.iter_mut().enumerate() {
            if idx > 0 && !self.enrich_delay.is_zero() {
                tokio::time::sleep(self.enrich_delay).await;
            }
            match extractor.extract_uncached(&item.url).await {
                Ok(article) => {
                    item.full_text = Some(article.content.clone());
                    item.content = article.content;
                    if !article.authors.is_empty() {
                        item.authors = article.authors;
                    }
                    if article.summary.is_some() {
                        item.summary = article.summary;
                    }
                    if !article.keywords.is_empty() {
                        item.keywords = article.keywords;
                    }
                    enriched += 1;
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", url = %item.url, error = %e, "enrichment failed");
                    counter!("collector_errors_total", "stage" => "enrich").increment(1);
                }
            }
        }
        enriched
    }

    /// Fetch, enrich the first `enrich_limit` items, write the artifact.
    /// The artifact holds the enrichment window only.
    pub async fn collect(&self) -> Result<BatchArtifact> {
        tracing::info!(target: "ingest", sources = self.sources.len(), "collection started");
        let mut items = self.fetch_all().await;
        items.truncate(self.enrich_limit);
        let enriched = self.enrich(&mut items).await;

        let path = batch::write_batch(&self.data_dir, &items, Utc::now())?;
        counter!("collector_items_total").increment(items.len() as u64);
        gauge!("collector_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "ingest",
            path = %path.display(),
            items = items.len(),
            enriched,
            "batch written"
        );
        Ok(BatchArtifact {
            path,
            items: items.len(),
            enriched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn normalize_text_collapses_ws_and_keeps_punct() {
        let s = "  Hello,&nbsp;&nbsp; <b>world</b>?  ";
        assert_eq!(normalize_text(s), "Hello, world ?");
        assert_eq!(normalize_text("“Quoted” ‘x’"), "\"Quoted\" 'x'");
    }

    struct Fixed(Vec<ArticleCandidate>);
    struct Broken;

    #[async_trait]
    impl FeedSource for Fixed {
        async fn fetch_candidates(&self) -> Result<Vec<ArticleCandidate>> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[async_trait]
    impl FeedSource for Broken {
        async fn fetch_candidates(&self) -> Result<Vec<ArticleCandidate>> {
            Err(anyhow::anyhow!("boom"))
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    fn cand(n: usize) -> ArticleCandidate {
        ArticleCandidate {
            title: format!("t{n}"),
            url: format!("https://example.com/{n}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn failing_source_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let c = Collector::new(
            vec![
                Box::new(Broken),
                Box::new(Fixed((0..3).map(cand).collect())),
            ],
            None,
            dir.path(),
        );
        let art = c.collect().await.unwrap();
        assert_eq!(art.items, 3);
        assert_eq!(art.enriched, 0);
        let loaded = batch::load_batch(&art.path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0]["title"], "t0");
    }

    /// Every fetch takes `latency`; records when each one started.
    struct SlowFetcher {
        latency: Duration,
        started: parking_lot::Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl crate::extract::PageFetcher for SlowFetcher {
        async fn fetch(&self, _url: &url::Url) -> Result<String> {
            self.started.lock().push(tokio::time::Instant::now());
            tokio::time::sleep(self.latency).await;
            Ok("<html><body><p>short</p></body></html>".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_enrichment_still_waits_the_full_delay_between_calls() {
        let fetcher = Arc::new(SlowFetcher {
            latency: Duration::from_secs(2),
            started: parking_lot::Mutex::new(Vec::new()),
        });
        let extractor = Extractor::with_strategies(
            fetcher.clone(),
            crate::extract::default_strategies(),
            None,
        );
        let dir = tempfile::tempdir().unwrap();
        let c = Collector::new(Vec::new(), Some(Arc::new(extractor)), dir.path())
            .with_enrichment(20, Duration::from_secs(1));

        let mut items: Vec<ArticleCandidate> = (0..3).map(cand).collect();
        let begin = tokio::time::Instant::now();
        c.enrich(&mut items).await;
        let elapsed = begin.elapsed();

        let started = fetcher.started.lock().clone();
        assert_eq!(started.len(), 3);
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3), "call + delay between starts");
        }
        // no trailing delay after the last call
        assert!(elapsed >= Duration::from_secs(8) && elapsed < Duration::from_secs(9));
    }

    #[tokio::test]
    async fn artifact_is_capped_to_enrichment_window() {
        let dir = tempfile::tempdir().unwrap();
        let c = Collector::new(
            vec![Box::new(Fixed((0..30).map(cand).collect()))],
            None,
            dir.path(),
        )
        .with_enrichment(20, Duration::ZERO);
        assert_eq!(c.collect().await.unwrap().items, 20);
    }
}
