// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::ingest::Collector;
use crate::producer::Producer;

/// A periodic batch job. Errors are reported, never fatal to the scheduler.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self) -> Result<()>;
}

#[async_trait]
impl ScheduledJob for Collector {
    fn name(&self) -> &'static str {
        "collector"
    }

    async fn run(&self) -> Result<()> {
        self.collect().await.map(|_| ())
    }
}

#[async_trait]
impl ScheduledJob for Producer {
    fn name(&self) -> &'static str {
        "producer"
    }

    async fn run(&self) -> Result<()> {
        self.publish_latest().await.map(|_| ())
    }
}

/// Collector and producer on independent intervals, after one startup pass
/// of each (collector first).
pub struct Scheduler {
    collector: Arc<dyn ScheduledJob>,
    producer: Arc<dyn ScheduledJob>,
    collector_every: Duration,
    producer_every: Duration,
}

impl Scheduler {
    pub fn new(
        collector: Arc<dyn ScheduledJob>,
        producer: Arc<dyn ScheduledJob>,
        collector_every: Duration,
        producer_every: Duration,
    ) -> Self {
        Self {
            collector,
            producer,
            collector_every,
            producer_every,
        }
    }

    pub fn from_config(
        cfg: &SchedulerConfig,
        collector: Arc<dyn ScheduledJob>,
        producer: Arc<dyn ScheduledJob>,
    ) -> Self {
        Self::new(
            collector,
            producer,
            Duration::from_secs(cfg.collector_interval_minutes.max(1) * 60),
            Duration::from_secs(cfg.producer_interval_minutes.max(1) * 60),
        )
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            target: "scheduler",
            collector_every_s = self.collector_every.as_secs(),
            producer_every_s = self.producer_every.as_secs(),
            "scheduler started"
        );

        run_job(self.collector.as_ref()).await;
        run_job(self.producer.as_ref()).await;

        let start = Instant::now();
        let mut collector_tick = interval_at(start + self.collector_every, self.collector_every);
        collector_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut producer_tick = interval_at(start + self.producer_every, self.producer_every);
        producer_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = collector_tick.tick() => run_job(self.collector.as_ref()).await,
                _ = producer_tick.tick() => run_job(self.producer.as_ref()).await,
            }
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    }
}

async fn run_job(job: &dyn ScheduledJob) {
    let name = job.name();
    counter!("scheduler_runs_total", "job" => name).increment(1);
    match job.run().await {
        Ok(()) => {
            gauge!("scheduler_last_success_ts", "job" => name)
                .set(chrono::Utc::now().timestamp() as f64);
            tracing::info!(target: "scheduler", job = name, "job finished");
        }
        Err(e) => {
            counter!("scheduler_failures_total", "job" => name).increment(1);
            tracing::warn!(target: "scheduler", job = name, "job failed: {e:#}");
        }
    }
}
