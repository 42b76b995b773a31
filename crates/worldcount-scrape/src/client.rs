//! HTTP side of the scraper.

use std::time::Duration;

use reqwest::Client;
use worldcount_core::sample::WorldObservation;

use crate::{
  Error, Result,
  parse::{parse_global_count, parse_world_list},
};

/// Where the status pages live and how to ask for them.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
  /// Page carrying the site-wide "people playing" counter.
  pub global_url: String,
  /// Page carrying the per-world server list.
  pub worlds_url: String,
  pub user_agent: String,
  pub timeout:    Duration,
}

/// Downloads and parses the status pages.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct Scraper {
  client:     Client,
  global_url: String,
  worlds_url: String,
}

impl Scraper {
  pub fn new(config: ScrapeConfig) -> Result<Self> {
    let client = Client::builder()
      .user_agent(config.user_agent)
      .timeout(config.timeout)
      .build()?;
    Ok(Self {
      client,
      global_url: config.global_url,
      worlds_url: config.worlds_url,
    })
  }

  async fn fetch(&self, url: &str) -> Result<String> {
    let resp = self.client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Status { url: url.to_owned(), status });
    }
    Ok(resp.text().await?)
  }

  /// The current global player count. `Ok(None)` means the page loaded but
  /// no counter was found on it.
  pub async fn fetch_global_count(&self) -> Result<Option<u32>> {
    let page = self.fetch(&self.global_url).await?;
    let count = parse_global_count(&page);
    if count.is_none() {
      tracing::warn!(url = %self.global_url, "no player count found on page");
    }
    Ok(count)
  }

  /// Every world row that could be parsed from the server list.
  pub async fn fetch_worlds(&self) -> Result<Vec<WorldObservation>> {
    let page = self.fetch(&self.worlds_url).await?;
    let worlds = parse_world_list(&page);
    if worlds.is_empty() {
      tracing::warn!(url = %self.worlds_url, "no worlds found on page");
    } else {
      tracing::debug!(worlds = worlds.len(), "parsed world list");
    }
    Ok(worlds)
  }
}
