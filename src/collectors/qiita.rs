//! Qiita popular items.
//!
//! The Atom feed at `https://qiita.com/popular-items/feed.atom` lists the
//! currently trending posts. Categories carry the post's tags.

use async_trait::async_trait;
use tracing::{error, info, instrument};

use super::feed::FeedEntry;
use super::{Collector, FeedClient};
use crate::models::{Article, Source};

#[derive(Debug, Clone)]
pub struct QiitaCollector {
    feed: FeedClient,
    max_articles: usize,
}

impl QiitaCollector {
    pub fn new(feed: FeedClient, max_articles: usize) -> Self {
        Self { feed, max_articles }
    }
}

/// Keep the first `max` entries in feed order.
pub fn select(entries: Vec<FeedEntry>, max: usize) -> Vec<Article> {
    entries
        .into_iter()
        .take(max)
        .map(|e| e.into_article(Source::Qiita))
        .collect()
}

#[async_trait]
impl Collector for QiitaCollector {
    fn source(&self) -> Source {
        Source::Qiita
    }

    #[instrument(level = "info", skip_all, fields(source = "qiita"))]
    async fn fetch(&self) -> Vec<Article> {
        match self.feed.fetch_entries().await {
            Ok(entries) => {
                let articles = select(entries, self.max_articles);
                info!(count = articles.len(), "Collected Qiita articles");
                articles
            }
            Err(e) => {
                error!(error = %e, url = %self.feed.url(), "Qiita feed failed");
                Vec::new()
            }
        }
    }
}
