use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId as RawEntry, StreamReadReply};
use redis::{Client, RedisError, Value};
use tokio::sync::OnceCell;

use super::{Fields, GroupCursor, PendingEntry, StreamBroker, StreamId, StreamMessage};
use crate::error::PipelineError;

/// `XPENDING` page size; [`StreamBroker::pending`] walks every page.
const PENDING_PAGE: usize = 1000;

/// Redis Streams broker over a managed multiplexed connection, opened lazily
/// on first use (normally the startup `ping`).
///
/// A dropped socket fails the command in flight and makes the manager dial
/// again, so callers that back off and retry see the broker come back.
pub struct RedisBroker {
    client: Client,
    conn: OnceCell<ConnectionManager>,
}

fn unavailable(op: &str, e: RedisError) -> PipelineError {
    PipelineError::BrokerUnavailable(format!("{op}: {e}"))
}

impl RedisBroker {
    /// Parses the URL only; no network traffic until the first command.
    pub async fn connect(url: &str) -> Result<Self, PipelineError> {
        let client = Client::open(url).map_err(|e| unavailable("open", e))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn conn(&self) -> Result<ConnectionManager, PipelineError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                self.client
                    .get_connection_manager()
                    .await
                    .map_err(|e| unavailable("connect", e))
            })
            .await?;
        Ok(conn.clone())
    }
}

fn block_arg(cmd: &mut redis::Cmd, block: Option<Duration>) {
    if let Some(d) = block {
        cmd.arg("BLOCK").arg(d.as_millis().max(1) as u64);
    }
}

fn decode_entry(entry: RawEntry) -> Result<StreamMessage, PipelineError> {
    let id: StreamId = entry.id.parse()?;
    let mut fields = Fields::new();
    for (name, value) in entry.map {
        // nil values show up for entries trimmed while pending
        let text: String = redis::from_redis_value(&value).unwrap_or_default();
        fields.insert(name, text);
    }
    Ok(StreamMessage { id, fields })
}

fn decode_reply(reply: Option<StreamReadReply>) -> Result<Vec<StreamMessage>, PipelineError> {
    let Some(reply) = reply else {
        return Ok(Vec::new());
    };
    reply
        .keys
        .into_iter()
        .flat_map(|key| key.ids)
        .map(decode_entry)
        .collect()
}

/// `XAUTOCLAIM` reply: `[next-cursor, entries, (deleted ids)]`. Entries
/// deleted from the stream come back as nil on Redis 6.2 and are skipped.
fn decode_autoclaim(reply: &[Value]) -> Result<Vec<StreamMessage>, PipelineError> {
    let Some(entries) = reply.get(1) else {
        return Ok(Vec::new());
    };
    let entries: Vec<Value> =
        redis::from_redis_value(entries).map_err(|e| unavailable("XAUTOCLAIM", e))?;
    entries
        .iter()
        .filter(|v| !matches!(v, Value::Nil))
        .map(|v| {
            let (id, map): (String, std::collections::HashMap<String, Value>) =
                redis::from_redis_value(v).map_err(|e| unavailable("XAUTOCLAIM", e))?;
            decode_entry(RawEntry { id, map })
        })
        .collect()
}

#[async_trait]
impl StreamBroker for RedisBroker {
    async fn ping(&self) -> Result<(), PipelineError> {
        let mut con = self.conn().await?;
        let _pong: String = redis::cmd("PING")
            .query_async(&mut con)
            .await
            .map_err(|e| unavailable("PING", e))?;
        Ok(())
    }

    async fn append(&self, stream: &str, fields: &Fields) -> Result<StreamId, PipelineError> {
        let mut con = self.conn().await?;
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (k, v) in fields {
            cmd.arg(k).arg(v);
        }
        let id: String = cmd
            .query_async(&mut con)
            .await
            .map_err(|e| unavailable("XADD", e))?;
        id.parse()
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), PipelineError> {
        let mut con = self.conn().await?;
        let res: Result<(), RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut con)
            .await;
        match res {
            Ok(()) => {
                tracing::info!(target: "broker", stream, group, "created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(unavailable("XGROUP CREATE", e)),
        }
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
        let mut con = self.conn().await?;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count);
        let from = match cursor {
            GroupCursor::New => {
                block_arg(&mut cmd, block);
                ">"
            }
            GroupCursor::OwnPending => "0",
        };
        cmd.arg("STREAMS").arg(stream).arg(from);
        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut con)
            .await
            .map_err(|e| unavailable("XREADGROUP", e))?;
        decode_reply(reply)
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        let mut con = self.conn().await?;
        let reply: Vec<Value> = redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut con)
            .await
            .map_err(|e| unavailable("XAUTOCLAIM", e))?;
        let claimed = decode_autoclaim(&reply)?;
        if !claimed.is_empty() {
            tracing::info!(target: "broker", stream, group, consumer, claimed = claimed.len(), "claimed stale entries");
        }
        Ok(claimed)
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<bool, PipelineError> {
        let mut con = self.conn().await?;
        let n: u64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id.to_string())
            .query_async(&mut con)
            .await
            .map_err(|e| unavailable("XACK", e))?;
        Ok(n > 0)
    }

    async fn read(
        &self,
        stream: &str,
        after: StreamId,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        let mut con = self.conn().await?;
        let mut cmd = redis::cmd("XREAD");
        cmd.arg("COUNT").arg(count);
        block_arg(&mut cmd, block);
        cmd.arg("STREAMS").arg(stream).arg(after.to_string());
        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut con)
            .await
            .map_err(|e| unavailable("XREAD", e))?;
        decode_reply(reply)
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, PipelineError> {
        let mut con = self.conn().await?;
        let mut out = Vec::new();
        let mut start = "-".to_string();
        loop {
            // id, consumer, idle ms, delivery count
            let rows: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
                .arg(stream)
                .arg(group)
                .arg(&start)
                .arg("+")
                .arg(PENDING_PAGE)
                .query_async(&mut con)
                .await
                .map_err(|e| unavailable("XPENDING", e))?;
            let full_page = rows.len() == PENDING_PAGE;
            for (id, consumer, _idle, deliveries) in rows {
                out.push(PendingEntry {
                    id: id.parse()?,
                    consumer,
                    deliveries,
                });
            }
            match out.last() {
                // exclusive start: the next page begins after the last id seen
                Some(last) if full_page => start = format!("({}", last.id),
                _ => break,
            }
        }
        Ok(out)
    }
}
