// tests/extract_cache.rs
//
// Cache in front of the cascade: second call is served from disk without a
// fetch, stale entries are re-extracted and overwritten.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use trustfeed::extract::{ExtractCache, Extractor, PageFetcher};

const PAGE: &str = r#"<html><head><title>Council approves budget</title></head><body>
<article>
<p>The city council approved the annual budget on Tuesday after a long debate.</p>
<p>Spending on public transport rises by ten percent, the largest increase in a decade.</p>
</article></body></html>"#;

#[derive(Default)]
struct CountingFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl PageFetcher for CountingFetcher {
    async fn fetch(&self, _url: &Url) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PAGE.to_string())
    }
}

#[tokio::test]
async fn second_extraction_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let extractor = Extractor::new(fetcher.clone(), ExtractCache::new(dir.path()));
    let url = "https://www.theguardian.com/city/budget";

    let first = extractor.extract(url).await.expect("first extraction");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(extractor.cache().unwrap().path_for(url).exists());

    let second = extractor.extract(url).await.expect("cached extraction");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1, "no fetch on a cache hit");
    assert_eq!(first, second);
    assert_eq!(second.domain, "theguardian.com");
}

#[tokio::test]
async fn stale_entry_is_re_extracted_and_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let extractor = Extractor::new(fetcher.clone(), ExtractCache::new(dir.path()));
    let url = "https://www.npr.org/2024/03/05/budget";

    let mut article = extractor.extract(url).await.unwrap();
    let cache = extractor.cache().unwrap();

    // age the stored entry past the 24h TTL
    article.cache_time = chrono::Utc::now() - chrono::Duration::hours(25);
    cache.put(&article).await.unwrap();
    assert!(cache.get(url).await.is_none());

    let fresh = extractor.extract(url).await.unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert!(chrono::Utc::now() - fresh.cache_time < chrono::Duration::minutes(1));
    assert!(cache.get(url).await.is_some(), "refreshed entry replaces the stale one");
}

#[tokio::test]
async fn uncached_extraction_leaves_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::default());
    let extractor = Extractor::new(fetcher.clone(), ExtractCache::new(dir.path()));
    let url = "https://example.com/enrich-only";

    extractor.extract_uncached(url).await.unwrap();
    assert!(!extractor.cache().unwrap().path_for(url).exists());
}
