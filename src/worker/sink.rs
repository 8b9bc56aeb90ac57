use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::oracle::OracleVerdict;
use crate::broker::{StreamId, StreamMessage};
use crate::error::PipelineError;

/// Article fields carried into the result document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleMeta {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_date: String,
    pub collection_time: String,
}

impl ArticleMeta {
    pub fn from_message(msg: &StreamMessage) -> Self {
        Self {
            title: msg.field("title").to_string(),
            url: msg.field("url").to_string(),
            source: msg.field("source").to_string(),
            published_date: msg.field("published_date").to_string(),
            collection_time: msg.field("collection_time").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub message_id: StreamId,
    pub article: ArticleMeta,
    pub analysis: OracleVerdict,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Written(PathBuf),
    /// A document for this message id already exists (redelivery after a crash).
    AlreadyPresent(PathBuf),
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, result: &AnalysisResult) -> Result<Persisted, PipelineError>;
}

/// One pretty JSON document per message: `result_<id>.json`, with the
/// processing time inside. The name alone answers "already written?".
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(id: StreamId) -> String {
        format!("result_{id}.json")
    }

    pub fn path_for(&self, id: StreamId) -> PathBuf {
        self.dir.join(Self::file_name(id))
    }

    async fn write(&self, result: &AnalysisResult) -> io::Result<Persisted> {
        let path = self.path_for(result.message_id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(Persisted::AlreadyPresent(path));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(result).map_err(io::Error::other)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(Persisted::Written(path))
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, result: &AnalysisResult) -> Result<Persisted, PipelineError> {
        self.write(result)
            .await
            .map_err(|e| PipelineError::SinkWriteFailure(format!("{}: {e}", self.dir.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::oracle::Prediction;
    use chrono::TimeZone;
    use std::fs;

    fn result(id: StreamId) -> AnalysisResult {
        AnalysisResult {
            message_id: id,
            article: ArticleMeta {
                title: "T".into(),
                ..Default::default()
            },
            analysis: OracleVerdict {
                score: 72,
                prediction: Prediction::Real,
                factors: serde_json::json!({}),
                details: serde_json::json!({}),
            },
            processed_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 20, 30).unwrap(),
        }
    }

    #[tokio::test]
    async fn writes_named_document_once_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("results"));
        let r = result(StreamId::new(1717237230000, 0));

        let first = sink.persist(&r).await.unwrap();
        let Persisted::Written(path) = &first else {
            panic!("expected a write, got {first:?}");
        };
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "result_1717237230000-0.json"
        );
        let back: AnalysisResult =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, r);

        // later redelivery of the same id, different processing time
        let mut again = r.clone();
        again.processed_at = again.processed_at + chrono::Duration::seconds(90);
        assert!(matches!(
            sink.persist(&again).await.unwrap(),
            Persisted::AlreadyPresent(_)
        ));
        assert_eq!(fs::read_dir(sink.dir()).unwrap().count(), 1);
        let kept: AnalysisResult =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(kept.processed_at, r.processed_at, "first document is kept");
    }

    #[tokio::test]
    async fn other_results_do_not_mask_a_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        for ms in 1..=50 {
            sink.persist(&result(StreamId::new(ms, 0))).await.unwrap();
        }
        // same ms, different seq: a distinct message
        let next = sink.persist(&result(StreamId::new(1, 1))).await.unwrap();
        assert_eq!(next, Persisted::Written(sink.path_for(StreamId::new(1, 1))));
        assert_eq!(fs::read_dir(sink.dir()).unwrap().count(), 51);
    }

    #[tokio::test]
    async fn unwritable_dir_is_sink_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let sink = FileSink::new(blocker.join("results"));
        let err = sink.persist(&result(StreamId::new(1, 0))).await.unwrap_err();
        assert!(matches!(err, PipelineError::SinkWriteFailure(_)));
    }
}
