//! Runs the collector and producer on their configured intervals.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use trustfeed::ingest::scheduler::Scheduler;
use trustfeed::{broker, config, telemetry, Collector, Producer};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default()?;
    let broker = broker::connect(&cfg.broker).await?;
    let collector = Arc::new(Collector::from_config(&cfg)?);
    let producer = Arc::new(Producer::new(broker, &cfg.broker.stream, &cfg.paths.data_dir));

    let cancel = CancellationToken::new();
    let task = Scheduler::from_config(&cfg.scheduler, collector, producer).spawn(cancel.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!(target: "scheduler", "ctrl-c received; stopping");
    cancel.cancel();
    task.await?;
    Ok(())
}
