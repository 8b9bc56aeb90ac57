use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Fields, GroupCursor, PendingEntry, StreamBroker, StreamId, StreamMessage};
use crate::error::PipelineError;

struct Delivery {
    consumer: String,
    count: u64,
    at: Instant,
}

impl Delivery {
    fn first(consumer: &str) -> Self {
        Self {
            consumer: consumer.to_string(),
            count: 1,
            at: Instant::now(),
        }
    }

    fn redeliver(&mut self, consumer: &str) {
        if self.consumer != consumer {
            self.consumer = consumer.to_string();
        }
        self.count += 1;
        self.at = Instant::now();
    }
}

#[derive(Default)]
struct Group {
    last_delivered: StreamId,
    pending: BTreeMap<StreamId, Delivery>,
}

#[derive(Default)]
struct Stream {
    entries: Vec<StreamMessage>,
    last_id: StreamId,
    groups: HashMap<String, Group>,
}

impl Stream {
    fn next_id(&mut self) -> StreamId {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let id = if now > self.last_id.ms {
            StreamId::new(now, 0)
        } else {
            StreamId::new(self.last_id.ms, self.last_id.seq + 1)
        };
        self.last_id = id;
        id
    }

    fn after(&self, id: StreamId) -> &[StreamMessage] {
        let start = self.entries.partition_point(|m| m.id <= id);
        &self.entries[start..]
    }

    fn get(&self, id: StreamId) -> Option<&StreamMessage> {
        self.entries
            .binary_search_by(|m| m.id.cmp(&id))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Hand pending `ids` to `consumer` again, bumping delivery count and time.
/// Ids whose entry is gone from the log are dropped from the pending set.
fn redeliver(
    entries: &[StreamMessage],
    g: &mut Group,
    ids: &[StreamId],
    consumer: &str,
) -> Vec<StreamMessage> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match entries.binary_search_by(|m| m.id.cmp(id)) {
            Ok(i) => {
                if let Some(d) = g.pending.get_mut(id) {
                    d.redeliver(consumer);
                }
                out.push(entries[i].clone());
            }
            Err(_) => {
                g.pending.remove(id);
            }
        }
    }
    out
}

/// In-process broker with the same delivery semantics as the Redis one.
///
/// State sits behind a std `Mutex` (never held across an await); blocking
/// reads park on a `Notify` that every append wakes.
#[derive(Default)]
pub struct MemoryBroker {
    inner: Mutex<HashMap<String, Stream>>,
    appended: Notify,
}

fn no_group(stream: &str, group: &str) -> PipelineError {
    PipelineError::BrokerUnavailable(format!(
        "NOGROUP no such key '{stream}' or consumer group '{group}'"
    ))
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in `stream` (0 when missing).
    pub fn len(&self, stream: &str) -> usize {
        let streams = self.inner.lock().expect("broker mutex poisoned");
        streams.get(stream).map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, stream: &str) -> bool {
        self.len(stream) == 0
    }

    fn try_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: GroupCursor,
        count: usize,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        let mut streams = self.inner.lock().expect("broker mutex poisoned");
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let Stream { entries, groups, .. } = s;
        let g = groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let mut out = Vec::new();
        match cursor {
            GroupCursor::New => {
                let start = entries.partition_point(|m| m.id <= g.last_delivered);
                for msg in entries[start..].iter().take(count) {
                    g.last_delivered = msg.id;
                    g.pending.insert(msg.id, Delivery::first(consumer));
                    out.push(msg.clone());
                }
            }
            GroupCursor::OwnPending => {
                let own: Vec<StreamId> = g
                    .pending
                    .iter()
                    .filter(|(_, d)| d.consumer == consumer)
                    .map(|(id, _)| *id)
                    .take(count)
                    .collect();
                out = redeliver(entries, g, &own, consumer);
            }
        }
        Ok(out)
    }

    fn try_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        let mut streams = self.inner.lock().expect("broker mutex poisoned");
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let Stream { entries, groups, .. } = s;
        let g = groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        let stale: Vec<StreamId> = g
            .pending
            .iter()
            .filter(|(_, d)| now.duration_since(d.at) >= min_idle)
            .map(|(id, _)| *id)
            .take(count)
            .collect();
        Ok(redeliver(entries, g, &stale, consumer))
    }

    fn try_read(&self, stream: &str, after: StreamId, count: usize) -> Vec<StreamMessage> {
        let streams = self.inner.lock().expect("broker mutex poisoned");
        streams
            .get(stream)
            .map(|s| s.after(after).iter().take(count).cloned().collect())
            .unwrap_or_default()
    }

    /// Re-run `attempt` until it yields something or `block` elapses.
    /// `None` means a single non-blocking attempt.
    async fn wait_for<F>(
        &self,
        block: Option<Duration>,
        mut attempt: F,
    ) -> Result<Vec<StreamMessage>, PipelineError>
    where
        F: FnMut() -> Result<Vec<StreamMessage>, PipelineError>,
    {
        let deadline = block.map(|d| Instant::now() + d);
        loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            // register before checking so an append in between is not missed
            notified.as_mut().enable();

            let batch = attempt()?;
            let Some(deadline) = deadline else {
                return Ok(batch);
            };
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return attempt();
            }
        }
    }
}

#[async_trait]
impl StreamBroker for MemoryBroker {
    async fn ping(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn append(&self, stream: &str, fields: &Fields) -> Result<StreamId, PipelineError> {
        let id = {
            let mut streams = self.inner.lock().expect("broker mutex poisoned");
            let s = streams.entry(stream.to_string()).or_default();
            let id = s.next_id();
            s.entries.push(StreamMessage {
                id,
                fields: fields.clone(),
            });
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), PipelineError> {
        let mut streams = self.inner.lock().expect("broker mutex poisoned");
        let s = streams.entry(stream.to_string()).or_default();
        s.groups.entry(group.to_string()).or_default();
        Ok(())
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
        match cursor {
            GroupCursor::OwnPending => self.try_read_group(stream, group, consumer, cursor, count),
            GroupCursor::New => {
                self.wait_for(block, || {
                    self.try_read_group(stream, group, consumer, cursor, count)
                })
                .await
            }
        }
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        self.try_claim(stream, group, consumer, min_idle, count)
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<bool, PipelineError> {
        let mut streams = self.inner.lock().expect("broker mutex poisoned");
        let removed = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .map(|g| g.pending.remove(&id).is_some())
            .unwrap_or(false);
        Ok(removed)
    }

    async fn read(
        &self,
        stream: &str,
        after: StreamId,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamMessage>, PipelineError> {
        self.wait_for(block, || Ok(self.try_read(stream, after, count)))
            .await
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<PendingEntry>, PipelineError> {
        let streams = self.inner.lock().expect("broker mutex poisoned");
        let s = streams.get(stream).ok_or_else(|| no_group(stream, group))?;
        let g = s.groups.get(group).ok_or_else(|| no_group(stream, group))?;
        Ok(g.pending
            .iter()
            .filter(|(id, _)| s.get(**id).is_some())
            .map(|(id, d)| PendingEntry {
                id: *id,
                consumer: d.consumer.clone(),
                deliveries: d.count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("title".into(), title.into());
        f
    }

    #[tokio::test]
    async fn ids_strictly_increase() {
        let b = MemoryBroker::new();
        let mut last = StreamId::ZERO;
        for i in 0..50 {
            let id = b.append("s", &fields(&i.to_string())).await.unwrap();
            assert!(id > last, "{id} should follow {last}");
            last = id;
        }
        assert_eq!(b.len("s"), 50);
    }

    #[tokio::test]
    async fn group_read_before_group_exists_is_nogroup() {
        let b = MemoryBroker::new();
        let err = b
            .read_group("s", "g", "c", GroupCursor::New, 1, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOGROUP"));
    }

    #[tokio::test]
    async fn ensure_group_is_idempotent() {
        let b = MemoryBroker::new();
        b.append("s", &fields("a")).await.unwrap();
        b.ensure_group("s", "g").await.unwrap();
        let first = b
            .read_group("s", "g", "c", GroupCursor::New, 10, None)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        // second create must not reset the cursor
        b.ensure_group("s", "g").await.unwrap();
        let again = b
            .read_group("s", "g", "c", GroupCursor::New, 10, None)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn own_pending_is_per_consumer_and_counts_deliveries() {
        let b = MemoryBroker::new();
        b.ensure_group("s", "g").await.unwrap();
        let id = b.append("s", &fields("a")).await.unwrap();
        b.read_group("s", "g", "alice", GroupCursor::New, 1, None)
            .await
            .unwrap();

        let bob = b
            .read_group("s", "g", "bob", GroupCursor::OwnPending, 10, None)
            .await
            .unwrap();
        assert!(bob.is_empty());

        let alice = b
            .read_group("s", "g", "alice", GroupCursor::OwnPending, 10, None)
            .await
            .unwrap();
        assert_eq!(alice[0].id, id);

        let pending = b.pending("s", "g").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].consumer, "alice");
        assert_eq!(pending[0].deliveries, 2);

        assert!(b.ack("s", "g", id).await.unwrap());
        assert!(!b.ack("s", "g", id).await.unwrap());
        assert!(b.pending("s", "g").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_move_to_the_claiming_consumer() {
        let b = MemoryBroker::new();
        b.ensure_group("s", "g").await.unwrap();
        let id = b.append("s", &fields("a")).await.unwrap();
        b.read_group("s", "g", "gone", GroupCursor::New, 1, None)
            .await
            .unwrap();

        let idle = Duration::from_secs(30);
        assert!(b.claim_stale("s", "g", "heir", idle, 10).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;
        let claimed = b.claim_stale("s", "g", "heir", idle, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);

        let pending = b.pending("s", "g").await.unwrap();
        assert_eq!(pending[0].consumer, "heir");
        assert_eq!(pending[0].deliveries, 2);

        // the claim reset the idle clock and the entry is now heir's own
        assert!(b.claim_stale("s", "g", "other", idle, 10).await.unwrap().is_empty());
        let own = b
            .read_group("s", "g", "heir", GroupCursor::OwnPending, 10, None)
            .await
            .unwrap();
        assert_eq!(own[0].id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_read_times_out_empty() {
        let b = MemoryBroker::new();
        let got = b
            .read("s", StreamId::ZERO, 10, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn blocking_read_wakes_on_append() {
        let b = std::sync::Arc::new(MemoryBroker::new());
        let reader = {
            let b = b.clone();
            tokio::spawn(async move {
                b.read("s", StreamId::ZERO, 10, Some(Duration::from_secs(5)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        b.append("s", &fields("late")).await.unwrap();
        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].field("title"), "late");
    }
}
