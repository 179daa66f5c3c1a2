//! Hatena Bookmark IT hot entries.
//!
//! RSS 1.0 (RDF) at `https://b.hatena.ne.jp/hotentry/it.rss`. Links to Qiita
//! and Zenn are dropped since those sites are collected directly. The rest is
//! ordered by bookmark count, highest first.

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};
use url::Url;

use super::feed::FeedEntry;
use super::{Collector, FeedClient};
use crate::models::{Article, Source};

/// Hosts already covered by their own collectors.
pub const EXCLUDED_DOMAINS: [&str; 2] = ["qiita.com", "zenn.dev"];

#[derive(Debug, Clone)]
pub struct HatenaCollector {
    feed: FeedClient,
}

impl HatenaCollector {
    pub fn new(feed: FeedClient) -> Self {
        Self { feed }
    }
}

/// Whether `link` points at an excluded domain or one of its subdomains.
pub fn is_excluded(link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    EXCLUDED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

pub fn select(entries: Vec<FeedEntry>) -> Vec<Article> {
    let mut articles: Vec<Article> = entries
        .into_iter()
        .filter(|e| {
            let excluded = is_excluded(&e.link);
            if excluded {
                debug!(url = %e.link, "Skipping excluded domain");
            }
            !excluded
        })
        .map(|e| {
            let bookmarks = e.bookmark_count.unwrap_or(0);
            Article {
                bookmarks: Some(bookmarks),
                ..e.into_article(Source::Hatena)
            }
        })
        .collect();

    // Stable, so equal counts keep feed order.
    articles.sort_by(|a, b| b.bookmarks.cmp(&a.bookmarks));
    articles
}

#[async_trait]
impl Collector for HatenaCollector {
    fn source(&self) -> Source {
        Source::Hatena
    }

    #[instrument(level = "info", skip_all, fields(source = "hatena"))]
    async fn fetch(&self) -> Vec<Article> {
        match self.feed.fetch_entries().await {
            Ok(entries) => {
                let articles = select(entries);
                info!(count = articles.len(), "Collected Hatena Bookmark articles");
                articles
            }
            Err(e) => {
                error!(error = %e, url = %self.feed.url(), "Hatena Bookmark feed failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::feed::{fixtures, parse_feed};

    #[test]
    fn test_is_excluded() {
        assert!(is_excluded("https://qiita.com/a/items/b"));
        assert!(is_excluded("https://zenn.dev/a/articles/b"));
        assert!(is_excluded("https://static.zenn.dev/x.png"));
        assert!(!is_excluded("https://notqiita.com/a"));
        assert!(!is_excluded("https://example.com/?ref=qiita.com"));
        assert!(!is_excluded("not a url"));
    }

    #[test]
    fn test_select_filters_and_sorts_by_bookmarks() {
        let articles = select(parse_feed(fixtures::RDF).unwrap());

        let urls: Vec<&str> = articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/high",
                "https://example.com/low",
                "https://example.com/unknown",
            ]
        );
        assert_eq!(articles[0].bookmarks, Some(250));
        // Unparsable counts sort as zero.
        assert_eq!(articles[2].bookmarks, Some(0));
        assert!(articles.iter().all(|a| a.source == Source::Hatena));
    }
}
