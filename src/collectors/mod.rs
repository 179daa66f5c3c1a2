//! Feed collectors for the tech article sources.
//!
//! Each source module wraps one feed URL and applies that source's selection
//! rules to the parsed entries.
//!
//! # Supported Sources
//!
//! | Source | Module | Format | Notes |
//! |--------|--------|--------|-------|
//! | Qiita | [`qiita`] | Atom | Popular items, capped at `max_articles_per_source` |
//! | Zenn | [`zenn`] | RSS 2.0 | Trending, capped at `max_articles_per_source` |
//! | Hacker News | [`hackernews`] | RSS 2.0 | hnrss front page |
//! | Hatena Bookmark | [`hatena`] | RSS 1.0 | IT hot entries, Qiita/Zenn links dropped, sorted by bookmarks |
//!
//! # Common Patterns
//!
//! Collectors never fail: fetch or parse errors are logged and an empty list
//! is returned, so one broken source never stops the others.

pub mod feed;
pub mod hackernews;
pub mod hatena;
pub mod qiita;
pub mod zenn;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::error::Result;
use crate::models::{Article, Source};
use feed::FeedEntry;

/// User agent sent with every outgoing request.
pub const USER_AGENT: &str = concat!("TechTrendCollector/", env!("CARGO_PKG_VERSION"));

/// A source of articles.
#[async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch the current articles. Returns an empty list on any failure.
    async fn fetch(&self) -> Vec<Article>;
}

/// Build the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// One feed endpoint.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    url: String,
}

impl FeedClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Download and parse the feed.
    #[instrument(level = "info", skip(self), fields(url = %self.url))]
    pub async fn fetch_entries(&self) -> Result<Vec<FeedEntry>> {
        let t0 = Instant::now();
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let entries = feed::parse_feed(&body)?;

        info!(
            count = entries.len(),
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched feed"
        );
        Ok(entries)
    }
}

/// The collectors in collection order.
pub fn default_collectors(settings: &Settings, client: &Client) -> Vec<Box<dyn Collector>> {
    let max = settings.max_articles_per_source;
    vec![
        Box::new(qiita::QiitaCollector::new(
            FeedClient::new(client.clone(), &settings.feeds.qiita),
            max,
        )),
        Box::new(zenn::ZennCollector::new(
            FeedClient::new(client.clone(), &settings.feeds.zenn),
            max,
        )),
        Box::new(hackernews::HackerNewsCollector::new(FeedClient::new(
            client.clone(),
            &settings.feeds.hackernews,
        ))),
        Box::new(hatena::HatenaCollector::new(FeedClient::new(
            client.clone(),
            &settings.feeds.hatena,
        ))),
    ]
}
