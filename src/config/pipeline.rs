// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "TRUSTFEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

/// Whole-pipeline configuration. Every section has defaults, so an empty
/// TOML file (or no file at all) yields a runnable local setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub broker: BrokerConfig,
    pub paths: PathsConfig,
    pub worker: WorkerConfig,
    pub dashboard: DashboardConfig,
    pub scheduler: SchedulerConfig,
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// `redis://host:port/db`, or `memory://` for the in-process broker.
    pub url: String,
    pub stream: String,
    pub group: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            stream: "news_articles".to_string(),
            group: "news_processors".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            results_dir: PathBuf::from("results"),
            cache_dir: PathBuf::from("cache/extract"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Empty means `consumer-<pid>`.
    pub consumer_name: String,
    pub api_base_url: String,
    pub oracle_timeout_secs: u64,
    pub block_ms: u64,
    pub backoff_secs: u64,
    /// Pending entries idle this long are claimed from whichever consumer holds them.
    pub claim_idle_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_name: String::new(),
            api_base_url: "http://localhost:8000".to_string(),
            oracle_timeout_secs: 30,
            block_ms: 5_000,
            backoff_secs: 5,
            claim_idle_secs: 60,
        }
    }
}

impl WorkerConfig {
    pub fn consumer(&self) -> String {
        if self.consumer_name.trim().is_empty() {
            format!("consumer-{}", std::process::id())
        } else {
            self.consumer_name.trim().to_string()
        }
    }

    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn claim_idle(&self) -> Duration {
        Duration::from_secs(self.claim_idle_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
    /// Feed the synthetic article generator.
    pub demo: bool,
    pub demo_interval_secs: u64,
    /// Tail the broker stream from the beginning of history.
    pub tail_stream: bool,
    pub tail_block_ms: u64,
    pub backoff_secs: u64,
    /// Per-observer queue depth; a client that falls this far behind is dropped.
    pub client_buffer: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            demo: true,
            demo_interval_secs: 10,
            tail_stream: true,
            tail_block_ms: 1_000,
            backoff_secs: 5,
            client_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub collector_interval_minutes: u64,
    pub producer_interval_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            collector_interval_minutes: 30,
            producer_interval_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub feeds: Vec<String>,
    pub per_feed_limit: usize,
    pub enrich_limit: usize,
    pub enrich_delay_ms: u64,
    /// Secondary aggregator key; empty disables the source.
    pub newsapi_key: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            feeds: crate::ingest::providers::rss::DEFAULT_FEEDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            per_feed_limit: 10,
            enrich_limit: 20,
            enrich_delay_ms: 1_000,
            newsapi_key: String::new(),
        }
    }
}

/// Load from an explicit TOML path, then apply environment overrides.
pub fn load_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config from {}", path.display()))?;
    let mut cfg: PipelineConfig =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    apply_env(&mut cfg);
    Ok(cfg)
}

/// Load using env var + fallbacks:
/// 1) $TRUSTFEED_CONFIG_PATH (must exist)
/// 2) config/pipeline.toml
/// 3) built-in defaults
///
/// Environment overrides are applied in every case.
pub fn load_default() -> Result<PipelineConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return load_from(&default_path);
    }
    let mut cfg = PipelineConfig::default();
    apply_env(&mut cfg);
    Ok(cfg)
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_str(name).and_then(|v| v.parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    env_str(name).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn apply_env(cfg: &mut PipelineConfig) {
    if let Some(url) = env_str("REDIS_URL") {
        cfg.broker.url = url;
    } else if let Some(host) = env_str("REDIS_HOST") {
        let port = env_parse::<u16>("REDIS_PORT").unwrap_or(6379);
        let db = env_parse::<u32>("REDIS_DB").unwrap_or(0);
        cfg.broker.url = match env_str("REDIS_PASSWORD") {
            Some(pass) => format!("redis://:{pass}@{host}:{port}/{db}"),
            None => format!("redis://{host}:{port}/{db}"),
        };
    }
    if let Some(v) = env_str("REDIS_STREAM_NAME") {
        cfg.broker.stream = v;
    }
    if let Some(v) = env_str("REDIS_CONSUMER_GROUP") {
        cfg.broker.group = v;
    }
    if let Some(v) = env_str("REDIS_CONSUMER_NAME") {
        cfg.worker.consumer_name = v;
    }
    if let Some(v) = env_parse("CLAIM_IDLE_SECONDS") {
        cfg.worker.claim_idle_secs = v;
    }
    if let Some(v) = env_str("API_BASE_URL") {
        cfg.worker.api_base_url = v;
    }
    if let Some(v) = env_str("NEWSAPI_KEY") {
        cfg.collector.newsapi_key = v;
    }
    if let Some(v) = env_parse("COLLECTOR_INTERVAL_MINUTES") {
        cfg.scheduler.collector_interval_minutes = v;
    }
    if let Some(v) = env_parse("PRODUCER_INTERVAL_MINUTES") {
        cfg.scheduler.producer_interval_minutes = v;
    }
    if let Some(v) = env_parse("PORT") {
        cfg.dashboard.port = v;
    }
    if let Some(v) = env_flag("DASHBOARD_DEMO") {
        cfg.dashboard.demo = v;
    }
    sanitize(cfg);
}

/// Zero intervals would make `tokio::time::interval` panic.
fn sanitize(cfg: &mut PipelineConfig) {
    let sched = &mut cfg.scheduler;
    sched.collector_interval_minutes = sched.collector_interval_minutes.max(1);
    sched.producer_interval_minutes = sched.producer_interval_minutes.max(1);
    cfg.dashboard.demo_interval_secs = cfg.dashboard.demo_interval_secs.max(1);
    cfg.dashboard.client_buffer = cfg.dashboard.client_buffer.max(1);
}
