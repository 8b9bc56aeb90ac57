// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod broker;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod metrics;
pub mod producer;
pub mod telemetry;
pub mod worker;

// ---- Re-exports for stable public API ----
pub use crate::broker::{SharedBroker, StreamBroker, StreamId, StreamMessage};
pub use crate::dashboard::{DashboardHandle, DashboardService};
pub use crate::error::PipelineError;
pub use crate::extract::{ExtractedArticle, Extractor};
pub use crate::ingest::Collector;
pub use crate::producer::Producer;
pub use crate::worker::Worker;
