//! # Stream Broker
//! Append-only ordered log with consumer groups (Redis Streams semantics).
//!
//! - Ids are broker-assigned `"<ms>-<seq>"`, strictly increasing in append order.
//! - Payloads are flat `string → string` maps; structured values are pre-serialized.
//! - A group tracks a delivery cursor plus pending (delivered, unacked) ids.
//!   An id leaves the pending set only through [`StreamBroker::ack`]; an id
//!   whose owner went away is moved with [`StreamBroker::claim_stale`].
//!
//! [`MemoryBroker`] is the in-process implementation used by tests and
//! single-process runs; [`RedisBroker`] talks to a real Redis server.

pub mod memory;
pub mod redis;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::BrokerConfig;
use crate::error::PipelineError;

pub use self::memory::MemoryBroker;
pub use self::redis::RedisBroker;

/// Flat record payload.
pub type Fields = BTreeMap<String, String>;

/// Broker-assigned entry id. Ordering is `(ms, seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    /// `"0"`: before every entry; reading after it observes full history.
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = PipelineError;

    /// Accepts `"ms-seq"` and the shorthand `"ms"` (seq 0).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || PipelineError::BrokerUnavailable(format!("malformed stream id '{s}'"));
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };
        Ok(Self {
            ms: ms.trim().parse().map_err(|_| bad())?,
            seq: seq.trim().parse().map_err(|_| bad())?,
        })
    }
}

impl Serialize for StreamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: StreamId,
    pub fields: Fields,
}

impl StreamMessage {
    /// Field value, or `""` when absent.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCursor {
    /// `>`: entries never delivered to the group.
    New,
    /// `0`: entries already delivered to this consumer and still pending.
    OwnPending,
}

/// One row of the group's pending-entries list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: StreamId,
    pub consumer: String,
    pub deliveries: u64,
}

#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Liveness check; used as the startup readiness check.
    async fn ping(&self) -> Result<(), PipelineError>;

    /// Append one entry and return its id.
    async fn append(&self, stream: &str, fields: &Fields) -> Result<StreamId, PipelineError>;

    /// Create the stream and group if missing. "Already exists" is success.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), PipelineError>;

    /// Group read. `block` applies to [`GroupCursor::New`] only.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: GroupCursor,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamMessage>, PipelineError>;

    /// Take over up to `count` entries that have sat in the group's pending
    /// set for at least `min_idle`, whoever owns them (`XAUTOCLAIM`).
    /// Claimed entries become `consumer`'s own pending and count as a delivery.
    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamMessage>, PipelineError>;

    /// Remove `id` from the group's pending set. Returns whether it was pending.
    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<bool, PipelineError>;

    /// Plain (non-group) read of entries after `after`.
    async fn read(
        &self,
        stream: &str,
        after: StreamId,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamMessage>, PipelineError>;

    /// The group's whole pending-entries list in id order.
    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, PipelineError>;
}

pub type SharedBroker = Arc<dyn StreamBroker>;

/// Build the broker named by `cfg.url`: `memory://` or a `redis://` URL.
pub async fn connect(cfg: &BrokerConfig) -> Result<SharedBroker, PipelineError> {
    if cfg.url.starts_with("memory://") {
        tracing::warn!(target: "broker", "using in-process broker; entries live only as long as this process");
        return Ok(Arc::new(MemoryBroker::new()));
    }
    let broker = RedisBroker::connect(&cfg.url).await?;
    Ok(Arc::new(broker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_display_and_order() {
        let a: StreamId = "1700000000000-0".parse().unwrap();
        let b: StreamId = "1700000000000-1".parse().unwrap();
        let c: StreamId = "1700000000001".parse().unwrap();
        assert!(a < b && b < c);
        assert_eq!(a.to_string(), "1700000000000-0");
        assert_eq!(c, StreamId::new(1_700_000_000_001, 0));
        assert_eq!("0".parse::<StreamId>().unwrap(), StreamId::ZERO);
        assert!("abc-1".parse::<StreamId>().is_err());
    }

    #[test]
    fn ids_serialize_as_strings() {
        let id = StreamId::new(5, 7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"5-7\"");
        let back: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
