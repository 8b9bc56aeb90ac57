//! Long-running consumer worker; stops on ctrl-c.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use trustfeed::{broker, config, telemetry, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default()?;
    let broker = broker::connect(&cfg.broker).await?;
    let worker = Worker::from_config(&cfg, broker)?;

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "worker", "ctrl-c received; finishing current message");
        }
        stop.cancel();
    });

    // readiness failures (broker down, group creation refused) end the process
    worker.run(cancel).await?;
    Ok(())
}
