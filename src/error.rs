//! # Pipeline errors
//! Failure taxonomy shared by the extractor, broker, worker and sink.
//!
//! Batch jobs (collector, producer) log and skip these per item; long-running
//! loops (worker, dashboard tailer) log, back off and resume. Only a broker
//! failure at worker startup is surfaced to the caller as fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed URL, or every extraction strategy came up short.
    #[error("extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    /// Connect, timeout or protocol failure talking to the stream broker.
    #[error("stream broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Transport failure or non-2xx answer from the scoring oracle.
    #[error("scoring oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Result persistence failed; the message must not be acknowledged.
    #[error("result sink write failed: {0}")]
    SinkWriteFailure(String),
}

impl PipelineError {
    pub fn extraction(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether the message that caused this error should stay pending.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BrokerUnavailable(_) | Self::OracleUnavailable(_) | Self::SinkWriteFailure(_)
        )
    }
}
