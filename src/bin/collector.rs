//! One collector pass: feeds → enrichment → batch artifact.

use anyhow::Result;

use trustfeed::{config, telemetry, Collector};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default()?;
    let collector = Collector::from_config(&cfg)?;
    let artifact = collector.collect().await?;
    tracing::info!(
        target: "ingest",
        path = %artifact.path.display(),
        items = artifact.items,
        enriched = artifact.enriched,
        "collection finished"
    );
    Ok(())
}
