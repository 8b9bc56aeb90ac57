use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use url::Url;

/// Downloads a page body. The seam tests replace to count or script fetches.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; trustfeed/0.1)")
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url}: http status {}", status.as_u16()));
        }
        resp.text().await.context("reading response body")
    }
}

/// One page as seen by the strategy cascade. The body is downloaded on
/// first access and shared by every later strategy, failures included.
pub struct Page {
    url: Url,
    fetcher: Arc<dyn PageFetcher>,
    body: OnceCell<Result<String, String>>,
}

impl Page {
    pub fn new(url: Url, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            url,
            fetcher,
            body: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn body(&self) -> Result<&str> {
        let res = self
            .body
            .get_or_init(|| async { self.fetcher.fetch(&self.url).await.map_err(|e| format!("{e:#}")) })
            .await;
        match res {
            Ok(body) => Ok(body.as_str()),
            Err(msg) => Err(anyhow!("{msg}")),
        }
    }
}
