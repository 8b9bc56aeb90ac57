// tests/producer_publish.rs
//
// Producer: newest artifact → one stream entry per item, flattened to strings.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use trustfeed::broker::{
    Fields, GroupCursor, MemoryBroker, PendingEntry, SharedBroker, StreamBroker, StreamId,
    StreamMessage,
};
use trustfeed::error::PipelineError;
use trustfeed::Producer;

const STREAM: &str = "news_articles";
const FIXTURE: &str = "tests/fixtures/articles_sample.json";

fn stage(dir: &Path, name: &str) {
    std::fs::copy(FIXTURE, dir.join(name)).expect("copy fixture");
}

/// Memory broker whose `fail_on`-th append (0-based) is refused.
struct RefusesOneAppend {
    inner: MemoryBroker,
    appends: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl StreamBroker for RefusesOneAppend {
    async fn ping(&self) -> Result<(), PipelineError> {
        self.inner.ping().await
    }

    async fn append(&self, stream: &str, fields: &Fields) -> Result<StreamId, PipelineError> {
        if self.appends.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(PipelineError::BrokerUnavailable("connection reset".into()));
        }
        self.inner.append(stream, fields).await
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), PipelineError> {
        self.inner.ensure_group(stream, group).await
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: GroupCursor,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        self.inner
            .read_group(stream, group, consumer, cursor, count, block)
            .await
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        self.inner
            .claim_stale(stream, group, consumer, min_idle, count)
            .await
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<bool, PipelineError> {
        self.inner.ack(stream, group, id).await
    }

    async fn read(
        &self,
        stream: &str,
        after: StreamId,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        self.inner.read(stream, after, count, block).await
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, PipelineError> {
        self.inner.pending(stream, group).await
    }
}

#[tokio::test]
async fn publishes_every_item_of_the_latest_artifact() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("articles_20240101_000000.json"), "[{\"title\":\"old\"}]").unwrap();
    // newer name and (at least equal) mtime
    stage(dir.path(), "articles_20240305_093000.json");

    let broker: SharedBroker = Arc::new(MemoryBroker::new());
    let producer = Producer::new(broker.clone(), STREAM, dir.path());
    let n = producer.publish_latest().await.unwrap();
    assert_eq!(n, 5);

    let entries = broker.read(STREAM, StreamId::ZERO, 100, None).await.unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0].field("title"), "Council approves annual budget");
    assert_eq!(entries[4].field("title"), "Markets close higher");
    assert!(!entries.iter().any(|m| m.field("title") == "old"));

    // ids strictly increase in file order
    assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn structured_values_are_serialized_and_timestamp_added() {
    let dir = tempfile::tempdir().unwrap();
    stage(dir.path(), "articles_20240305_093000.json");
    let broker: SharedBroker = Arc::new(MemoryBroker::new());
    Producer::new(broker.clone(), STREAM, dir.path())
        .publish_latest()
        .await
        .unwrap();

    let entries = broker.read(STREAM, StreamId::ZERO, 100, None).await.unwrap();
    let first = &entries[0];
    assert_eq!(first.field("authors"), r#"["Jane Reporter"]"#);
    assert_eq!(first.field("keywords"), r#"["budget","council"]"#);
    assert!(chrono::DateTime::parse_from_rfc3339(first.field("timestamp")).is_ok());

    // null becomes the empty string
    assert_eq!(entries[1].field("summary"), "");
    assert_eq!(
        entries[2].field("full_text"),
        "Researchers documented three previously unknown frog species during a two-month survey."
    );
}

#[tokio::test]
async fn no_artifact_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let broker: SharedBroker = Arc::new(MemoryBroker::new());
    let producer = Producer::new(broker.clone(), STREAM, dir.path().join("missing"));
    assert_eq!(producer.publish_latest().await.unwrap(), 0);
    assert!(broker.read(STREAM, StreamId::ZERO, 10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_artifact_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("articles_20240305_093000.json"), "{not json").unwrap();
    let broker: SharedBroker = Arc::new(MemoryBroker::new());
    let producer = Producer::new(broker, STREAM, dir.path());
    assert!(producer.publish_latest().await.is_err());
}

#[tokio::test]
async fn non_object_items_are_skipped() {
    let broker: SharedBroker = Arc::new(MemoryBroker::new());
    let producer = Producer::new(broker.clone(), STREAM, "unused");
    let items = vec![
        serde_json::json!({"title": "ok"}),
        serde_json::json!(42),
        serde_json::json!({"title": "also ok"}),
    ];
    assert_eq!(producer.publish(&items).await, 2);
}

#[tokio::test]
async fn failed_append_is_skipped_and_the_rest_still_publish() {
    let dir = tempfile::tempdir().unwrap();
    stage(dir.path(), "articles_20240305_093000.json");
    let broker = Arc::new(RefusesOneAppend {
        inner: MemoryBroker::new(),
        appends: AtomicUsize::new(0),
        fail_on: 2,
    });
    let shared: SharedBroker = broker.clone();

    let n = Producer::new(shared.clone(), STREAM, dir.path())
        .publish_latest()
        .await
        .expect("one refused append does not fail the batch");
    assert_eq!(n, 4);
    assert_eq!(broker.appends.load(Ordering::SeqCst), 5, "every item was attempted");

    let titles: Vec<String> = shared
        .read(STREAM, StreamId::ZERO, 100, None)
        .await
        .unwrap()
        .iter()
        .map(|m| m.field("title").to_string())
        .collect();
    assert_eq!(titles.len(), 4);
    assert!(!titles.iter().any(|t| t == "New species found in rainforest survey"));
    assert_eq!(titles[3], "Markets close higher");
}
