//! Publish the newest batch artifact to the article stream, once.

use anyhow::Result;

use trustfeed::{broker, config, telemetry, Producer};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default()?;
    let broker = broker::connect(&cfg.broker).await?;
    broker.ping().await?;
    let producer = Producer::new(broker, &cfg.broker.stream, &cfg.paths.data_dir);
    let n = producer.publish_latest().await?;
    tracing::info!(target: "producer", published = n, "producer finished");
    Ok(())
}
