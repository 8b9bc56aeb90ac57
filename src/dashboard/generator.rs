use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::state::DashboardArticle;
use super::DashboardHandle;

const DEMO_SOURCES: &[&str] = &["CNN", "BBC", "Reuters", "AP News", "The Guardian"];
const DEMO_TITLES: &[&str] = &[
    "Breaking News: Major Policy Change Announced",
    "Scientists Discover New Species in Amazon Rainforest",
    "Tech Company Launches Revolutionary Product",
    "Global Summit Addresses Climate Change Concerns",
    "Sports Team Wins Championship in Dramatic Fashion",
];

/// Random demo row: score 30–95, `REAL` above 60.
pub fn fabricate_article<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> DashboardArticle {
    let source = DEMO_SOURCES.choose(rng).copied().unwrap_or("BBC");
    let title = DEMO_TITLES.choose(rng).copied().unwrap_or("Untitled");
    let score: u8 = rng.random_range(30..=95);
    DashboardArticle {
        title: title.to_string(),
        source: source.to_string(),
        url: format!(
            "https://example.com/{}/{}",
            source.to_lowercase().replace(' ', "-"),
            now.timestamp()
        ),
        timestamp: now.to_rfc3339(),
        trust_score: score,
        prediction: if score > 60 { "REAL" } else { "FAKE" }.to_string(),
    }
}

pub async fn run_generator(handle: DashboardHandle, every: Duration, cancel: CancellationToken) {
    tracing::info!(target: "dashboard", every_s = every.as_secs(), "demo generator started");
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                // ThreadRng is !Send; keep it out of the await below
                let article = fabricate_article(&mut rand::rng(), Utc::now());
                if handle.ingest(article).await.is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!(target: "dashboard", "demo generator stopped");
}
