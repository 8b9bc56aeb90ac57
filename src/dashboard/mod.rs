//! # Dashboard broadcast service
//! One owner task holds [`DashboardState`] and the client registry; feeds
//! (stream tailer, demo generator) and HTTP handlers talk to it only through
//! a command channel.
//!
//! - Snapshots are published as `Arc<DashboardSnapshot>` on a `watch` channel
//!   after every update, so readers never see a half-applied update.
//! - A new client gets its `init` event queued by the owner at registration,
//!   before any later `update` can reach it.
//! - Broadcast is `try_send` per client; a full or closed queue drops that
//!   client only.

pub mod api;
pub mod generator;
pub mod state;
pub mod tailer;

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::response::sse::Event as SseEvent;
use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::SharedBroker;
use crate::config::DashboardConfig;

pub use state::{
    DashboardArticle, DashboardPayload, DashboardSnapshot, DashboardState, DashboardStats,
    TrustBucket, TrustHistogram,
};

const COMMAND_BUFFER: usize = 256;

pub type ClientId = u64;

#[derive(Debug, thiserror::Error)]
#[error("dashboard service stopped")]
pub struct ServiceStopped;

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Init(DashboardPayload),
    Update(DashboardPayload),
}

impl DashboardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DashboardEvent::Init(_) => "init",
            DashboardEvent::Update(_) => "update",
        }
    }

    pub fn payload(&self) -> &DashboardPayload {
        match self {
            DashboardEvent::Init(p) | DashboardEvent::Update(p) => p,
        }
    }

    pub fn to_sse(&self) -> SseEvent {
        match serde_json::to_string(self.payload()) {
            Ok(json) => SseEvent::default().event(self.name()).data(json),
            Err(e) => {
                tracing::warn!(target: "dashboard", "serializing event: {e}");
                SseEvent::default().event("error").data(r#"{"error":"serialize"}"#)
            }
        }
    }
}

pub enum Command {
    /// Fold articles (oldest first) into the state and broadcast one update.
    Ingest(Vec<DashboardArticle>),
    Connect {
        reply: oneshot::Sender<(ClientId, mpsc::Receiver<DashboardEvent>)>,
    },
    Disconnect(ClientId),
}

/// Cheap, cloneable access to a running service.
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Arc<DashboardSnapshot>>,
}

impl DashboardHandle {
    pub async fn ingest(&self, article: DashboardArticle) -> Result<(), ServiceStopped> {
        self.ingest_batch(vec![article]).await
    }

    pub async fn ingest_batch(&self, articles: Vec<DashboardArticle>) -> Result<(), ServiceStopped> {
        if articles.is_empty() {
            return Ok(());
        }
        self.commands
            .send(Command::Ingest(articles))
            .await
            .map_err(|_| ServiceStopped)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Register a client. The first item of the returned stream is `init`.
    pub async fn subscribe(&self) -> Result<ClientStream, ServiceStopped> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect { reply })
            .await
            .map_err(|_| ServiceStopped)?;
        let (id, events) = rx.await.map_err(|_| ServiceStopped)?;
        Ok(ClientStream {
            events,
            guard: DisconnectGuard {
                id,
                commands: self.commands.clone(),
            },
        })
    }
}

/// Sends `Disconnect` when the client's stream is dropped.
struct DisconnectGuard {
    id: ClientId,
    commands: mpsc::Sender<Command>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        // a full command queue is fine: the owner prunes closed queues on broadcast
        if self.commands.try_send(Command::Disconnect(self.id)).is_err() {
            tracing::debug!(target: "dashboard", client = self.id, "disconnect notice not delivered");
        }
    }
}

/// One observer's event feed.
pub struct ClientStream {
    events: mpsc::Receiver<DashboardEvent>,
    guard: DisconnectGuard,
}

impl ClientStream {
    pub fn id(&self) -> ClientId {
        self.guard.id
    }

    pub async fn next_event(&mut self) -> Option<DashboardEvent> {
        self.events.recv().await
    }
}

impl futures::Stream for ClientStream {
    type Item = DashboardEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

struct Owner {
    state: DashboardState,
    clients: BTreeMap<ClientId, mpsc::Sender<DashboardEvent>>,
    next_id: ClientId,
    client_buffer: usize,
    snapshot_tx: watch::Sender<Arc<DashboardSnapshot>>,
}

impl Owner {
    fn publish(&self) {
        self.snapshot_tx.send_replace(Arc::new(self.state.snapshot()));
    }

    fn ingest(&mut self, articles: Vec<DashboardArticle>) {
        let n = articles.len();
        for a in &articles {
            self.state.update(a.clone());
        }
        counter!("dashboard_articles_total").increment(n as u64);
        self.publish();

        let mut fresh = articles;
        fresh.reverse(); // newest first, like the list
        let event = DashboardEvent::Update(self.state.update_payload(fresh));
        self.broadcast(&event);
    }

    fn broadcast(&mut self, event: &DashboardEvent) {
        let mut dead = Vec::new();
        for (id, tx) in &self.clients {
            if let Err(e) = tx.try_send(event.clone()) {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "lagging",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                tracing::info!(target: "dashboard", client = *id, reason, "dropping client");
                dead.push(*id);
            }
        }
        for id in dead {
            self.clients.remove(&id);
        }
        gauge!("dashboard_clients").set(self.clients.len() as f64);
    }

    fn connect(&mut self, reply: oneshot::Sender<(ClientId, mpsc::Receiver<DashboardEvent>)>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = mpsc::channel(self.client_buffer.max(1));
        let init = DashboardEvent::Init(self.state.snapshot().init_payload());
        if tx.try_send(init).is_err() {
            return;
        }
        if reply.send((id, rx)).is_err() {
            // subscriber went away before registration finished
            return;
        }
        self.clients.insert(id, tx);
        gauge!("dashboard_clients").set(self.clients.len() as f64);
        tracing::info!(target: "dashboard", client = id, clients = self.clients.len(), "client connected");
    }

    fn disconnect(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            gauge!("dashboard_clients").set(self.clients.len() as f64);
            tracing::info!(target: "dashboard", client = id, clients = self.clients.len(), "client disconnected");
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        loop {
            let cmd = tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = commands.recv() => cmd,
            };
            match cmd {
                Some(Command::Ingest(articles)) => self.ingest(articles),
                Some(Command::Connect { reply }) => self.connect(reply),
                Some(Command::Disconnect(id)) => self.disconnect(id),
                None => break,
            }
        }
        // dropping the senders ends every client stream
        self.clients.clear();
        gauge!("dashboard_clients").set(0.0);
    }
}

/// Where the tailer reads from.
#[derive(Clone)]
pub struct TailSource {
    pub broker: SharedBroker,
    pub stream: String,
}

/// Owns the owner task and its feeds; nothing runs until [`DashboardService::start`].
pub struct DashboardService {
    handle: DashboardHandle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DashboardService {
    /// Spawn the owner plus the feeds enabled in `cfg` (tailer needs `tail`).
    pub fn start(cfg: &DashboardConfig, tail: Option<TailSource>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(DashboardSnapshot::default()));
        let cancel = CancellationToken::new();
        let handle = DashboardHandle {
            commands: cmd_tx,
            snapshot: snapshot_rx,
        };

        let owner = Owner {
            state: DashboardState::new(),
            clients: BTreeMap::new(),
            next_id: 1,
            client_buffer: cfg.client_buffer,
            snapshot_tx,
        };
        let mut tasks = vec![tokio::spawn(owner.run(cmd_rx, cancel.child_token()))];

        match tail {
            Some(src) if cfg.tail_stream => {
                tasks.push(tokio::spawn(tailer::run_tailer(
                    src.broker,
                    src.stream,
                    handle.clone(),
                    Duration::from_millis(cfg.tail_block_ms),
                    Duration::from_secs(cfg.backoff_secs),
                    cancel.child_token(),
                )));
            }
            _ => tracing::info!(target: "dashboard", "stream tailer disabled"),
        }

        if cfg.demo {
            tasks.push(tokio::spawn(generator::run_generator(
                handle.clone(),
                Duration::from_secs(cfg.demo_interval_secs.max(1)),
                cancel.child_token(),
            )));
        }

        tracing::info!(target: "dashboard", tasks = tasks.len(), "dashboard service started");
        Self {
            handle,
            cancel,
            tasks,
        }
    }

    pub fn handle(&self) -> DashboardHandle {
        self.handle.clone()
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(target: "dashboard", "task ended abnormally: {e}");
            }
        }
        tracing::info!(target: "dashboard", "dashboard service stopped");
    }
}
