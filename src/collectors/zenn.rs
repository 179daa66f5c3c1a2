//! Zenn trending articles.
//!
//! RSS 2.0 at `https://zenn.dev/feed`. The feed carries no tags.

use async_trait::async_trait;
use tracing::{error, info, instrument};

use super::feed::FeedEntry;
use super::{Collector, FeedClient};
use crate::models::{Article, Source};

#[derive(Debug, Clone)]
pub struct ZennCollector {
    feed: FeedClient,
    max_articles: usize,
}

impl ZennCollector {
    pub fn new(feed: FeedClient, max_articles: usize) -> Self {
        Self { feed, max_articles }
    }
}

pub fn select(entries: Vec<FeedEntry>, max: usize) -> Vec<Article> {
    entries
        .into_iter()
        .take(max)
        .map(|e| Article {
            tags: Vec::new(),
            ..e.into_article(Source::Zenn)
        })
        .collect()
}

#[async_trait]
impl Collector for ZennCollector {
    fn source(&self) -> Source {
        Source::Zenn
    }

    #[instrument(level = "info", skip_all, fields(source = "zenn"))]
    async fn fetch(&self) -> Vec<Article> {
        match self.feed.fetch_entries().await {
            Ok(entries) => {
                let articles = select(entries, self.max_articles);
                info!(count = articles.len(), "Collected Zenn articles");
                articles
            }
            Err(e) => {
                error!(error = %e, url = %self.feed.url(), "Zenn feed failed");
                Vec::new()
            }
        }
    }
}
