//! Pre-deployment readiness check. Prints one line per check and exits
//! non-zero if any check fails.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use trustfeed::broker::{self, Fields, StreamId};
use trustfeed::config::{self, PipelineConfig};
use trustfeed::telemetry;

const SCRATCH_STREAM: &str = "trustfeed:deploy_check";

async fn check_broker(cfg: &PipelineConfig) -> Result<()> {
    let broker = broker::connect(&cfg.broker).await?;
    broker.ping().await?;

    let nonce = chrono::Utc::now().timestamp_millis().to_string();
    let mut fields = Fields::new();
    fields.insert("nonce".to_string(), nonce.clone());
    let id = broker.append(SCRATCH_STREAM, &fields).await?;

    let back = broker
        .read(SCRATCH_STREAM, StreamId::ZERO, 1_000, None)
        .await?
        .into_iter()
        .find(|m| m.id == id)
        .ok_or_else(|| anyhow!("entry {id} not readable after append"))?;
    if back.field("nonce") != nonce {
        return Err(anyhow!("entry {id} came back with different fields"));
    }
    Ok(())
}

async fn check_oracle(cfg: &PipelineConfig) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    // any HTTP answer means the service is up; only transport errors fail
    let resp = client
        .get(&cfg.worker.api_base_url)
        .send()
        .await
        .with_context(|| format!("GET {}", cfg.worker.api_base_url))?;
    tracing::debug!(status = %resp.status(), "oracle answered");
    Ok(())
}

fn check_writable(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let marker = dir.join(".deploy_check");
    std::fs::write(&marker, b"ok").with_context(|| format!("writing {}", marker.display()))?;
    std::fs::remove_file(&marker).with_context(|| format!("removing {}", marker.display()))?;
    Ok(())
}

fn report(name: &str, res: &Result<()>) -> bool {
    match res {
        Ok(()) => {
            println!("[ok]   {name}");
            true
        }
        Err(e) => {
            println!("[FAIL] {name}: {e:#}");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default()?;
    let mut ok = true;
    ok &= report("broker", &check_broker(&cfg).await);
    ok &= report("oracle", &check_oracle(&cfg).await);
    for dir in [&cfg.paths.data_dir, &cfg.paths.results_dir, &cfg.paths.cache_dir] {
        ok &= report(&format!("writable {}", dir.display()), &check_writable(dir));
    }

    if !ok {
        std::process::exit(1);
    }
    println!("all checks passed");
    Ok(())
}
