//! Hacker News front page via hnrss.
//!
//! `https://hnrss.org/frontpage` links each item to the story's target URL,
//! not to the HN discussion page. Titles are English; the pipeline hands
//! them to the translator when one is configured.

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use super::feed::FeedEntry;
use super::{Collector, FeedClient};
use crate::models::{Article, Source};

#[derive(Debug, Clone)]
pub struct HackerNewsCollector {
    feed: FeedClient,
}

impl HackerNewsCollector {
    pub fn new(feed: FeedClient) -> Self {
        Self { feed }
    }
}

pub fn select(entries: Vec<FeedEntry>) -> Vec<Article> {
    entries
        .into_iter()
        .map(|e| Article {
            tags: Vec::new(),
            ..e.into_article(Source::Hackernews)
        })
        .collect()
}

#[async_trait]
impl Collector for HackerNewsCollector {
    fn source(&self) -> Source {
        Source::Hackernews
    }

    #[instrument(level = "info", skip_all, fields(source = "hackernews"))]
    async fn fetch(&self) -> Vec<Article> {
        match self.feed.fetch_entries().await {
            Ok(entries) if entries.is_empty() => {
                warn!(url = %self.feed.url(), "Hacker News feed had no items");
                Vec::new()
            }
            Ok(entries) => {
                let articles = select(entries);
                info!(count = articles.len(), "Collected Hacker News articles");
                articles
            }
            Err(e) => {
                error!(error = %e, url = %self.feed.url(), "Hacker News feed failed");
                Vec::new()
            }
        }
    }
}
