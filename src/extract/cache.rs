//! File cache for extracted articles: one JSON document per URL under
//! `cache/extract/<sha256(url)>.json`, expiring 24h after `cache_time`.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};

use super::ExtractedArticle;

pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct ExtractCache {
    dir: PathBuf,
    ttl: Duration,
}

/// Deterministic cache key: lowercase hex SHA-256 of the URL.
pub fn cache_key(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(url.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

impl ExtractCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_ttl(dir, Duration::hours(DEFAULT_TTL_HOURS))
    }

    /// The directory is created on first [`put`](Self::put).
    pub fn with_ttl(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(url)))
    }

    /// Fresh entry for `url`, if any. Unreadable or expired entries count as absent.
    pub async fn get(&self, url: &str) -> Option<ExtractedArticle> {
        let path = self.path_for(url);
        let buf = tokio::fs::read_to_string(&path).await.ok()?;
        let article: ExtractedArticle = match serde_json::from_str(&buf) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(target: "extract", path = %path.display(), error = %e, "corrupt cache entry ignored");
                return None;
            }
        };
        if Utc::now() - article.cache_time > self.ttl {
            tracing::debug!(target: "extract", url, "cache entry expired");
            return None;
        }
        Some(article)
    }

    /// Store `article` under its own URL; tmp file then rename.
    pub async fn put(&self, article: &ExtractedArticle) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&article.url);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(article).map_err(io::Error::other)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(tmp, path).await
    }
}
