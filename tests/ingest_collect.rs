// tests/ingest_collect.rs
//
// Collector end to end against a local mock server: RSS feed + NewsAPI →
// enrichment through the real HTTP extractor → batch artifact on disk.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trustfeed::extract::{ExtractCache, Extractor, HttpFetcher};
use trustfeed::ingest::batch;
use trustfeed::ingest::providers::{NewsApiSource, RssFeed};
use trustfeed::ingest::types::FeedSource;
use trustfeed::Collector;

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    let feed = fixture("feed.xml").replace("{{BASE}}", &server.uri());

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/budget"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(fixture("article_budget.html"), "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/harbor"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(fixture("article_harbor.html"), "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn http_extractor(cache_dir: &std::path::Path) -> Arc<Extractor> {
    Arc::new(Extractor::new(
        Arc::new(HttpFetcher::new().unwrap()),
        ExtractCache::new(cache_dir),
    ))
}

#[tokio::test]
async fn rss_items_are_parsed_and_normalized() {
    let server = mock_site().await;
    let feed = RssFeed::new(
        &format!("{}/feed.xml", server.uri()),
        10,
        RssFeed::default_client().unwrap(),
    )
    .unwrap();

    let items = feed.fetch_candidates().await.unwrap();
    assert_eq!(items.len(), 3, "linkless item is dropped");
    assert_eq!(items[0].title, "Council approves annual budget");
    assert_eq!(items[0].content, "The council approved the budget.");
    assert_eq!(items[0].published_date, "2024-03-05T09:00:00Z");
    assert_eq!(items[1].title, "Harbor reopens & traffic returns");
    assert_eq!(items[1].content, "Short teaser text");
    assert_eq!(items[2].published_date, "not a date");
    assert!(items.iter().all(|i| i.source_url.ends_with("/feed.xml")));
}

#[tokio::test]
async fn feed_limit_caps_items() {
    let server = mock_site().await;
    let feed = RssFeed::new(
        &format!("{}/feed.xml", server.uri()),
        1,
        RssFeed::default_client().unwrap(),
    )
    .unwrap();
    assert_eq!(feed.fetch_candidates().await.unwrap().len(), 1);
}

#[tokio::test]
async fn collect_enriches_and_writes_artifact() {
    let server = mock_site().await;
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");

    let feed = RssFeed::new(
        &format!("{}/feed.xml", server.uri()),
        10,
        RssFeed::default_client().unwrap(),
    )
    .unwrap();
    let sources: Vec<Box<dyn FeedSource>> = vec![Box::new(feed)];
    let collector = Collector::new(
        sources,
        Some(http_extractor(&tmp.path().join("cache"))),
        &data_dir,
    )
    .with_enrichment(20, Duration::ZERO);

    let artifact = collector.collect().await.unwrap();
    assert_eq!(artifact.items, 3);
    assert_eq!(artifact.enriched, 2, "the 404 page keeps its teaser");
    assert_eq!(batch::latest_batch(&data_dir).unwrap(), Some(artifact.path.clone()));

    let items: Vec<Value> = batch::load_batch(&artifact.path).unwrap();
    let budget = &items[0];
    assert!(budget["content"].as_str().unwrap().starts_with("The city council approved"));
    assert_eq!(budget["full_text"], budget["content"]);
    assert_eq!(budget["authors"][0], "Jane Reporter");
    assert_eq!(budget["keywords"][2], "transport");

    let harbor = &items[1];
    assert!(harbor["content"].as_str().unwrap().contains("ferry traffic"));
    assert!(!harbor["content"].as_str().unwrap().contains("Copyright"));
    assert_eq!(harbor["authors"][0], "Sam Editor");

    let missing = &items[2];
    assert_eq!(missing["content"], "Teaser only");
    assert!(missing.get("full_text").is_none());

    // enrichment bypasses the extraction cache
    let cache_entries = std::fs::read_dir(tmp.path().join("cache"))
        .map(|rd| rd.count())
        .unwrap_or(0);
    assert_eq!(cache_entries, 0);
}

#[tokio::test]
async fn newsapi_and_failing_feed_together() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("language", "en"))
        .and(query_param("apiKey", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "articles": [
                {"title": "Wire story", "url": "https://example.com/wire",
                 "publishedAt": "2024-03-05T10:00:00Z", "source": {"name": "Example"},
                 "description": "A wire story."},
                {"title": "No url", "url": null}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down.xml"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = RssFeed::default_client().unwrap();
    let sources: Vec<Box<dyn FeedSource>> = vec![
        Box::new(RssFeed::new(&format!("{}/down.xml", server.uri()), 10, client.clone()).unwrap()),
        Box::new(NewsApiSource::with_base_url("k", &server.uri(), client)),
    ];
    let tmp = tempfile::tempdir().unwrap();
    let collector = Collector::new(sources, None, tmp.path());

    let artifact = collector.collect().await.unwrap();
    assert_eq!(artifact.items, 1);
    let items = batch::load_batch(&artifact.path).unwrap();
    assert_eq!(items[0]["source"], "Example");
    assert_eq!(items[0]["source_url"], "");
    assert_eq!(items[0]["published_date"], "2024-03-05T10:00:00Z");
}
