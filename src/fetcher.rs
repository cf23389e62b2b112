use crate::config::SourceConfig;
use crate::error::Result;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub struct Fetcher {
    client: Client,
    feed_url: String,
}

impl Fetcher {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(source.user_agent.as_str())
            .timeout(Duration::from_secs(source.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            feed_url: feed_url(&source.base_url, &source.feed_path),
        })
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Download the station page.
    ///
    /// A fresh cache-buster goes on every request so intermediaries never
    /// serve a stale page. Failures are returned as-is; the scheduler's next
    /// tick is the retry.
    pub async fn fetch_feed(&self) -> Result<String> {
        let cache_buster = Utc::now().timestamp_millis().to_string();
        debug!("Fetching feed from {} (r={})", self.feed_url, cache_buster);

        let response = self
            .client
            .get(&self.feed_url)
            .query(&[("t", "all"), ("r", cache_buster.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        debug!("Received {} bytes from feed", body.len());
        Ok(body)
    }
}

fn feed_url(base_url: &str, feed_path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        feed_path.trim_start_matches('/')
    )
}
