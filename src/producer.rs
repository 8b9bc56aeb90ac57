//! # Producer
//! Newest batch artifact → one stream entry per item.
//!
//! Items are flattened to `string → string`: strings as-is, `null` → `""`,
//! arrays/objects → compact JSON text, numbers/bools → display form. A
//! `timestamp` field (RFC 3339, now) is added when the item lacks one.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Value;

use crate::broker::{Fields, SharedBroker};
use crate::ingest::batch;

pub fn flatten_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => v.to_string(),
    }
}

/// Flat record for one artifact item; `None` when the item is not a JSON object.
pub fn flatten_record(item: &Value, now: DateTime<Utc>) -> Option<Fields> {
    let obj = item.as_object()?;
    let mut fields: Fields = obj
        .iter()
        .map(|(k, v)| (k.clone(), flatten_value(v)))
        .collect();
    fields
        .entry("timestamp".to_string())
        .or_insert_with(|| now.to_rfc3339());
    Some(fields)
}

pub struct Producer {
    broker: SharedBroker,
    stream: String,
    data_dir: PathBuf,
}

impl Producer {
    pub fn new(broker: SharedBroker, stream: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            broker,
            stream: stream.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Publish the most recently modified artifact. No artifact → `Ok(0)`.
    pub async fn publish_latest(&self) -> Result<usize> {
        let Some(path) = batch::latest_batch(&self.data_dir)? else {
            tracing::warn!(target: "producer", dir = %self.data_dir.display(), "no batch artifact found");
            return Ok(0);
        };
        let items = batch::load_batch(&path)?;
        tracing::info!(target: "producer", path = %path.display(), items = items.len(), "publishing batch");
        Ok(self.publish(&items).await)
    }

    /// Append every item; per-item failures are logged and skipped.
    pub async fn publish(&self, items: &[Value]) -> usize {
        let mut published = 0;
        for (idx, item) in items.iter().enumerate() {
            let Some(fields) = flatten_record(item, Utc::now()) else {
                tracing::warn!(target: "producer", idx, "skipping non-object item");
                counter!("producer_errors_total").increment(1);
                continue;
            };
            match self.broker.append(&self.stream, &fields).await {
                Ok(id) => {
                    published += 1;
                    counter!("producer_published_total").increment(1);
                    tracing::debug!(target: "producer", id = %id, title = fields.get("title").map(String::as_str).unwrap_or(""), "appended");
                }
                Err(e) => {
                    counter!("producer_errors_total").increment(1);
                    tracing::warn!(target: "producer", idx, error = %e, "append failed");
                }
            }
        }
        tracing::info!(target: "producer", published, total = items.len(), stream = %self.stream, "batch published");
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn flattens_every_json_kind() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let item = json!({
            "title": "T",
            "authors": ["a", "b"],
            "meta": {"k": 1},
            "summary": null,
            "score": 7,
            "flag": true
        });
        let f = flatten_record(&item, now).unwrap();
        assert_eq!(f["title"], "T");
        assert_eq!(f["authors"], r#"["a","b"]"#);
        assert_eq!(f["meta"], r#"{"k":1}"#);
        assert_eq!(f["summary"], "");
        assert_eq!(f["score"], "7");
        assert_eq!(f["flag"], "true");
        assert_eq!(f["timestamp"], "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn existing_timestamp_is_kept() {
        let f = flatten_record(&json!({"timestamp": "then"}), Utc::now()).unwrap();
        assert_eq!(f["timestamp"], "then");
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(flatten_record(&json!([1, 2]), Utc::now()).is_none());
        assert!(flatten_record(&json!("x"), Utc::now()).is_none());
    }
}
