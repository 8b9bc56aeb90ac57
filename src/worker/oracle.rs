use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    Real,
    Fake,
}

impl Prediction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prediction::Real => "REAL",
            Prediction::Fake => "FAKE",
        }
    }
}

/// Scoring oracle answer. `score` is clamped into 0–100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    #[serde(deserialize_with = "score_0_100")]
    pub score: u8,
    pub prediction: Prediction,
    #[serde(default)]
    pub factors: Value,
    #[serde(default)]
    pub details: Value,
}

fn score_0_100<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(d)?;
    if !raw.is_finite() {
        return Err(serde::de::Error::custom("score is not a finite number"));
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score(&self, text: &str) -> Result<OracleVerdict, PipelineError>;
}

/// `POST {base}/trust-score` with `{"text": …}`. Any non-2xx is a failure.
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::OracleUnavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/trust-score", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ScoringOracle for HttpOracle {
    async fn score(&self, text: &str) -> Result<OracleVerdict, PipelineError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| PipelineError::OracleUnavailable(format!("POST {}: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PipelineError::OracleUnavailable(format!(
                "status {}: {snippet}",
                status.as_u16()
            )));
        }
        resp.json::<OracleVerdict>()
            .await
            .map_err(|e| PipelineError::OracleUnavailable(format!("bad response body: {e}")))
    }
}
