//! Batch artifacts: `articles_YYYYmmdd_HHMMSS.json` arrays in the data dir.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::ArticleCandidate;

pub const PREFIX: &str = "articles_";

pub fn artifact_name(at: DateTime<Utc>) -> String {
    format!("{PREFIX}{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Write `items` as a pretty JSON array; returns the artifact path.
pub fn write_batch(dir: &Path, items: &[ArticleCandidate], at: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(artifact_name(at));
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(items).context("serializing batch")?;
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("renaming to {}", path.display()))?;
    Ok(path)
}

/// Most recently modified `articles_*.json` in `dir`, if any.
pub fn latest_batch(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !(name.starts_with(PREFIX) && name.ends_with(".json")) {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        // ties broken by name, which embeds the timestamp
        let newer = match &best {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if newer {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

/// Load an artifact as raw JSON items; producers treat records generically.
pub fn load_batch(path: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
