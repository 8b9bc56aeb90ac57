//! Live dashboard state: rolling article list, per-source counters and a
//! three-bucket trust histogram. Single writer (the service owner task).

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Rolling list bound.
pub const MAX_ARTICLES: usize = 100;
/// Articles carried in `init` events and `/api/data`.
pub const INIT_ARTICLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustBucket {
    High,
    Medium,
    Low,
}

impl TrustBucket {
    /// High ≥70, Medium 50–69, Low <50.
    pub fn from_score(score: u8) -> Self {
        match score {
            70.. => TrustBucket::High,
            50..=69 => TrustBucket::Medium,
            _ => TrustBucket::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrustBucket::High => "High Trust (70-100)",
            TrustBucket::Medium => "Medium Trust (50-69)",
            TrustBucket::Low => "Low Trust (0-49)",
        }
    }
}

/// Bucket counts; serialized under the bucket labels the page charts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustHistogram {
    #[serde(rename = "High Trust (70-100)")]
    pub high: u64,
    #[serde(rename = "Medium Trust (50-69)")]
    pub medium: u64,
    #[serde(rename = "Low Trust (0-49)")]
    pub low: u64,
}

impl TrustHistogram {
    pub fn record(&mut self, bucket: TrustBucket) {
        match bucket {
            TrustBucket::High => self.high += 1,
            TrustBucket::Medium => self.medium += 1,
            TrustBucket::Low => self.low += 1,
        }
    }

    pub fn get(&self, bucket: TrustBucket) -> u64 {
        match bucket {
            TrustBucket::High => self.high,
            TrustBucket::Medium => self.medium,
            TrustBucket::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardArticle {
    pub title: String,
    pub source: String,
    pub url: String,
    pub timestamp: String,
    pub trust_score: u8,
    pub prediction: String,
}

/// Wire body of `init`/`update` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPayload {
    pub articles: Vec<DashboardArticle>,
    pub sources: BTreeMap<String, u64>,
    pub trust_scores: TrustHistogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_articles: usize,
    pub fake_news_count: usize,
    pub avg_trust_score: f64,
}

/// Immutable copy of the whole state, published after every update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    /// Newest first, at most [`MAX_ARTICLES`].
    pub articles: Vec<DashboardArticle>,
    pub sources: BTreeMap<String, u64>,
    pub trust_scores: TrustHistogram,
}

impl DashboardSnapshot {
    /// `init` body: the newest [`INIT_ARTICLES`] plus counters.
    pub fn init_payload(&self) -> DashboardPayload {
        DashboardPayload {
            articles: self.articles.iter().take(INIT_ARTICLES).cloned().collect(),
            sources: self.sources.clone(),
            trust_scores: self.trust_scores,
        }
    }

    /// Stats over the rolling list (not the lifetime counters).
    pub fn stats(&self) -> DashboardStats {
        let total = self.articles.len();
        let fake = self
            .articles
            .iter()
            .filter(|a| a.prediction == "FAKE")
            .count();
        let sum: u64 = self.articles.iter().map(|a| u64::from(a.trust_score)).sum();
        DashboardStats {
            total_articles: total,
            fake_news_count: fake,
            avg_trust_score: sum as f64 / total.max(1) as f64,
        }
    }
}

#[derive(Debug, Default)]
pub struct DashboardState {
    articles: VecDeque<DashboardArticle>,
    sources: BTreeMap<String, u64>,
    trust: TrustHistogram,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend, evicting the oldest beyond [`MAX_ARTICLES`]; bump counters.
    pub fn update(&mut self, article: DashboardArticle) {
        *self.sources.entry(article.source.clone()).or_insert(0) += 1;
        self.trust.record(TrustBucket::from_score(article.trust_score));
        self.articles.push_front(article);
        self.articles.truncate(MAX_ARTICLES);
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            articles: self.articles.iter().cloned().collect(),
            sources: self.sources.clone(),
            trust_scores: self.trust,
        }
    }

    /// `update` body for articles just folded in (newest first).
    pub fn update_payload(&self, fresh: Vec<DashboardArticle>) -> DashboardPayload {
        DashboardPayload {
            articles: fresh,
            sources: self.sources.clone(),
            trust_scores: self.trust,
        }
    }
}
