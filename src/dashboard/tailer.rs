use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::state::DashboardArticle;
use super::DashboardHandle;
use crate::broker::{SharedBroker, StreamId, StreamMessage};

const READ_COUNT: usize = 10;

fn field_or(msg: &StreamMessage, name: &str, default: &str) -> String {
    let v = msg.field(name).trim();
    if v.is_empty() {
        default.to_string()
    } else {
        v.to_string()
    }
}

/// Stream entry → dashboard row. Missing fields fall back to
/// `Untitled`/`Unknown`/`#`/now, score 0 and `UNKNOWN`.
pub fn decode_article(msg: &StreamMessage) -> DashboardArticle {
    let analysis: Value = serde_json::from_str(msg.field("analysis")).unwrap_or(Value::Null);
    let trust_score = analysis
        .get("score")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);
    let prediction = analysis
        .get("prediction")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or("UNKNOWN")
        .to_string();

    DashboardArticle {
        title: field_or(msg, "title", "Untitled"),
        source: field_or(msg, "source", "Unknown"),
        url: field_or(msg, "url", "#"),
        timestamp: field_or(msg, "timestamp", &Utc::now().to_rfc3339()),
        trust_score,
        prediction,
    }
}

/// Plain reads from the start of history; every batch goes to the owner as
/// one ingest. Broker errors back off and resume.
pub async fn run_tailer(
    broker: SharedBroker,
    stream: String,
    handle: DashboardHandle,
    block: Duration,
    backoff: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(target: "dashboard", stream = %stream, "stream tailer started");
    let mut last = StreamId::ZERO;
    loop {
        let res = tokio::select! {
            _ = cancel.cancelled() => break,
            res = broker.read(&stream, last, READ_COUNT, Some(block)) => res,
        };
        match res {
            Ok(batch) => {
                let Some(tail) = batch.last() else {
                    continue;
                };
                last = tail.id;
                let articles = batch.iter().map(decode_article).collect();
                if handle.ingest_batch(articles).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(target: "dashboard", error = %e, "tailer read failed; backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
    tracing::info!(target: "dashboard", "stream tailer stopped");
}
