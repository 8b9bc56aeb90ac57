//! # Consumer worker
//! Group-reads the article stream, scores each article with the oracle,
//! persists the result and only then acknowledges.
//!
//! Delivery is at-least-once: anything short of a persisted result leaves the
//! message pending, and this consumer's own pending entries are re-read
//! before any new entry, so a failed message is retried ahead of newer ones.
//! Entries left pending by a consumer that is gone (a restart picks a new
//! name) are claimed once idle for `claim_idle`, then handled the same way.

pub mod oracle;
pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio_util::sync::CancellationToken;

use crate::broker::{GroupCursor, SharedBroker, StreamMessage};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

pub use oracle::{HttpOracle, OracleVerdict, Prediction, ScoringOracle};
pub use sink::{AnalysisResult, ArticleMeta, FileSink, Persisted, ResultSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Polling,
    Processing,
    Acking,
    PendingRetry,
}

/// What happened to one delivered message.
#[derive(Debug)]
pub enum Outcome {
    Acked,
    /// Nothing to score; acknowledged without an oracle call.
    NoContent,
    /// Left pending for redelivery.
    Retry(PipelineError),
}

/// One loop iteration.
#[derive(Debug)]
pub enum Step {
    Empty,
    Handled(StreamMessage, Outcome),
}

pub struct Worker {
    broker: SharedBroker,
    oracle: Arc<dyn ScoringOracle>,
    sink: Arc<dyn ResultSink>,
    stream: String,
    group: String,
    consumer: String,
    block: Duration,
    backoff: Duration,
    claim_idle: Duration,
    state: WorkerState,
}

/// Text to score: `content`, else `full_text`.
pub fn message_text(msg: &StreamMessage) -> &str {
    let content = msg.field("content").trim();
    if !content.is_empty() {
        return content;
    }
    msg.field("full_text").trim()
}

impl Worker {
    pub fn new(
        broker: SharedBroker,
        oracle: Arc<dyn ScoringOracle>,
        sink: Arc<dyn ResultSink>,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            oracle,
            sink,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            block: Duration::from_secs(5),
            backoff: Duration::from_secs(5),
            claim_idle: Duration::from_secs(60),
            state: WorkerState::Idle,
        }
    }

    pub fn with_timing(mut self, block: Duration, backoff: Duration) -> Self {
        self.block = block;
        self.backoff = backoff;
        self
    }

    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    /// HTTP oracle and file sink as configured.
    pub fn from_config(cfg: &PipelineConfig, broker: SharedBroker) -> Result<Self, PipelineError> {
        let oracle = HttpOracle::new(
            &cfg.worker.api_base_url,
            Duration::from_secs(cfg.worker.oracle_timeout_secs),
        )?;
        Ok(Self::new(
            broker,
            Arc::new(oracle),
            Arc::new(FileSink::new(&cfg.paths.results_dir)),
            &cfg.broker.stream,
            &cfg.broker.group,
            cfg.worker.consumer(),
        )
        .with_timing(cfg.worker.block(), cfg.worker.backoff())
        .with_claim_idle(cfg.worker.claim_idle()))
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    fn set_state(&mut self, next: WorkerState) {
        if self.state != next {
            tracing::trace!(target: "worker", from = ?self.state, to = ?next, "state");
            self.state = next;
        }
    }

    /// Readiness: broker reachable and group present. Errors here are fatal.
    pub async fn start(&self) -> Result<(), PipelineError> {
        self.broker.ping().await?;
        self.broker.ensure_group(&self.stream, &self.group).await?;
        tracing::info!(
            target: "worker",
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer,
            "worker ready"
        );
        Ok(())
    }

    /// Own pending entries first, then stale ones claimed from other
    /// consumers, then (blocking) new ones. At most one message.
    pub async fn poll_once(&mut self) -> Result<Option<StreamMessage>, PipelineError> {
        self.set_state(WorkerState::Polling);
        let mut batch = self
            .broker
            .read_group(&self.stream, &self.group, &self.consumer, GroupCursor::OwnPending, 1, None)
            .await?;
        if batch.is_empty() {
            batch = self
                .broker
                .claim_stale(&self.stream, &self.group, &self.consumer, self.claim_idle, 1)
                .await?;
            if let Some(msg) = batch.first() {
                counter!("worker_claimed_total").increment(1);
                tracing::info!(target: "worker", id = %msg.id, consumer = %self.consumer, "claimed stale pending entry");
            }
        }
        if batch.is_empty() {
            batch = self
                .broker
                .read_group(
                    &self.stream,
                    &self.group,
                    &self.consumer,
                    GroupCursor::New,
                    1,
                    Some(self.block),
                )
                .await?;
        }
        Ok(batch.into_iter().next())
    }

    pub async fn process_message(&mut self, msg: &StreamMessage) -> Outcome {
        self.set_state(WorkerState::Processing);
        counter!("worker_processed_total").increment(1);
        let title = msg.field("title");

        let text = message_text(msg);
        if text.is_empty() {
            tracing::warn!(target: "worker", id = %msg.id, title, "no content; acknowledging");
            counter!("worker_no_content_total").increment(1);
            return match self.ack(msg).await {
                Ok(()) => Outcome::NoContent,
                Err(e) => Outcome::Retry(e),
            };
        }

        let verdict = match self.oracle.score(text).await {
            Ok(v) => v,
            Err(e) => {
                counter!("worker_oracle_failures_total").increment(1);
                tracing::warn!(target: "worker", id = %msg.id, error = %e, "oracle failed; leaving pending");
                self.set_state(WorkerState::PendingRetry);
                return Outcome::Retry(e);
            }
        };

        let result = AnalysisResult {
            message_id: msg.id,
            article: ArticleMeta::from_message(msg),
            analysis: verdict,
            processed_at: Utc::now(),
        };
        match self.sink.persist(&result).await {
            Ok(Persisted::Written(path)) => {
                tracing::debug!(target: "worker", id = %msg.id, path = %path.display(), "result written");
            }
            Ok(Persisted::AlreadyPresent(path)) => {
                tracing::info!(target: "worker", id = %msg.id, path = %path.display(), "result already present; redelivery");
            }
            Err(e) => {
                tracing::warn!(target: "worker", id = %msg.id, error = %e, "persist failed; leaving pending");
                self.set_state(WorkerState::PendingRetry);
                return Outcome::Retry(e);
            }
        }

        match self.ack(msg).await {
            Ok(()) => {
                tracing::info!(
                    target: "worker",
                    id = %msg.id,
                    title,
                    score = result.analysis.score,
                    prediction = result.analysis.prediction.as_str(),
                    "processed"
                );
                Outcome::Acked
            }
            Err(e) => Outcome::Retry(e),
        }
    }

    async fn ack(&mut self, msg: &StreamMessage) -> Result<(), PipelineError> {
        self.set_state(WorkerState::Acking);
        let was_pending = self.broker.ack(&self.stream, &self.group, msg.id).await?;
        if !was_pending {
            tracing::debug!(target: "worker", id = %msg.id, "ack for id that was not pending");
        }
        counter!("worker_acked_total").increment(1);
        Ok(())
    }

    /// Poll once and process what came back.
    pub async fn step(&mut self) -> Result<Step, PipelineError> {
        let Some(msg) = self.poll_once().await? else {
            self.set_state(WorkerState::Idle);
            return Ok(Step::Empty);
        };
        let outcome = self.process_message(&msg).await;
        Ok(Step::Handled(msg, outcome))
    }

    /// Ready check, then loop until `cancel` fires. Only the ready check can fail.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PipelineError> {
        self.start().await?;

        while !cancel.is_cancelled() {
            let step = tokio::select! {
                _ = cancel.cancelled() => break,
                step = self.step() => step,
            };
            let failed = match step {
                Ok(Step::Handled(_, Outcome::Retry(_))) => true,
                Ok(_) => false,
                Err(e) => {
                    tracing::warn!(target: "worker", error = %e, "broker error; backing off");
                    true
                }
            };
            if failed {
                self.set_state(WorkerState::PendingRetry);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
        }
        self.set_state(WorkerState::Idle);
        tracing::info!(target: "worker", consumer = %self.consumer, "worker stopped");
        Ok(())
    }
}
