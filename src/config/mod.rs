// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{
    load_default, load_from, BrokerConfig, CollectorConfig, DashboardConfig, PathsConfig,
    PipelineConfig, SchedulerConfig, WorkerConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH,
};
