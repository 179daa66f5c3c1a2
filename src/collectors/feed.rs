//! Feed document parsing.
//!
//! One serde model covers the three formats the sources publish:
//!
//! | Format | Root | Entries | Used by |
//! |--------|------|---------|---------|
//! | RSS 2.0 | `<rss>` | `channel/item` | Zenn, Hacker News |
//! | RSS 1.0 (RDF) | `<rdf:RDF>` | `item` | Hatena Bookmark |
//! | Atom | `<feed>` | `entry` | Qiita |
//!
//! Namespaced elements (`dc:creator`, `hatena:bookmarkcount`) are matched
//! both with and without their prefix.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Article, Source};

#[derive(Debug, Default, Deserialize)]
struct FeedDocument {
    #[serde(default)]
    channel: Option<Channel>,
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
    #[serde(default, rename = "entry")]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct Channel {
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "date", alias = "dc:date")]
    dc_date: Option<String>,
    #[serde(rename = "creator", alias = "dc:creator")]
    creator: Option<String>,
    #[serde(default, rename = "category")]
    categories: Vec<String>,
    #[serde(default, rename = "subject", alias = "dc:subject")]
    subjects: Vec<String>,
    #[serde(rename = "bookmarkcount", alias = "hatena:bookmarkcount")]
    bookmark_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(default, rename = "link")]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    author: Option<AtomAuthor>,
    #[serde(default, rename = "category")]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

/// A feed entry normalized across formats.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub author: String,
    pub published: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub bookmark_count: Option<u32>,
}

impl FeedEntry {
    pub fn into_article(self, source: Source) -> Article {
        Article {
            title: self.title,
            url: self.link,
            author: self.author,
            published: self.published,
            tags: self.tags,
            source,
            bookmarks: self.bookmark_count,
        }
    }
}

/// Parse an RSS 2.0, RDF or Atom document into normalized entries.
///
/// Entries without a title or link are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let doc: FeedDocument = quick_xml::de::from_str(xml)?;

    let rss = doc
        .channel
        .map(|c| c.items)
        .unwrap_or_default()
        .into_iter()
        .chain(doc.items)
        .filter_map(RssItem::normalize);
    let atom = doc.entries.into_iter().filter_map(AtomEntry::normalize);

    Ok(rss.chain(atom).collect())
}

impl RssItem {
    fn normalize(self) -> Option<FeedEntry> {
        let (title, link) = match required(self.title, self.link) {
            Some(pair) => pair,
            None => {
                warn!("Skipping feed item without title or link");
                return None;
            }
        };

        let published = self
            .pub_date
            .as_deref()
            .or(self.dc_date.as_deref())
            .and_then(parse_date);

        let bookmark_count = self.bookmark_count.as_deref().and_then(|raw| {
            raw.trim()
                .parse::<u32>()
                .inspect_err(|e| debug!(raw, error = %e, "Ignoring unparsable bookmark count"))
                .ok()
        });

        Some(FeedEntry {
            title,
            link,
            author: clean(self.creator).unwrap_or_default(),
            published,
            tags: self
                .categories
                .into_iter()
                .chain(self.subjects)
                .filter_map(|t| clean(Some(t)))
                .collect(),
            bookmark_count,
        })
    }
}

impl AtomEntry {
    fn normalize(self) -> Option<FeedEntry> {
        let link = self
            .links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or(self.links.first())
            .and_then(|l| l.href.clone());

        let (title, link) = match required(self.title, link) {
            Some(pair) => pair,
            None => {
                warn!("Skipping feed entry without title or link");
                return None;
            }
        };

        let published = self
            .published
            .as_deref()
            .or(self.updated.as_deref())
            .and_then(parse_date);

        Some(FeedEntry {
            title,
            link,
            author: clean(self.author.and_then(|a| a.name)).unwrap_or_default(),
            published,
            tags: self
                .categories
                .into_iter()
                .filter_map(|c| clean(c.term))
                .collect(),
            bookmark_count: None,
        })
    }
}

fn required(title: Option<String>, link: Option<String>) -> Option<(String, String)> {
    Some((clean(title)?, clean(link)?))
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse RFC 2822 (`pubDate`) or RFC 3339 (Atom, `dc:date`) timestamps.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .inspect_err(|e| debug!(raw, error = %e, "Unparsable feed date"))
        .ok()
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xml:lang="ja-JP" xmlns="http://www.w3.org/2005/Atom">
  <id>tag:qiita.com,2005:/popular-items/feed</id>
  <link rel="alternate" type="text/html" href="https://qiita.com/popular-items"/>
  <link rel="self" type="application/atom+xml" href="https://qiita.com/popular-items/feed.atom"/>
  <title>Qiita - 人気の記事</title>
  <updated>2025-05-06T12:00:00+09:00</updated>
  <entry>
    <id>tag:qiita.com,2005:PublicArticle/1</id>
    <published>2025-05-06T09:00:00+09:00</published>
    <updated>2025-05-06T10:00:00+09:00</updated>
    <link rel="alternate" type="text/html" href="https://qiita.com/alice/items/aaa"/>
    <url>https://qiita.com/alice/items/aaa</url>
    <title>Rustで始める非同期処理</title>
    <content type="html">概要</content>
    <author><name>alice</name></author>
    <category term="Rust"/>
    <category term="tokio"/>
  </entry>
  <entry>
    <id>tag:qiita.com,2005:PublicArticle/2</id>
    <published>2025-05-05T09:00:00+09:00</published>
    <link rel="alternate" type="text/html" href="https://qiita.com/bob/items/bbb"/>
    <title>型で守る設計</title>
    <author><name>bob</name></author>
  </entry>
  <entry>
    <id>tag:qiita.com,2005:PublicArticle/3</id>
    <link rel="alternate" type="text/html" href="https://qiita.com/carol/items/ccc"/>
    <title>三本目</title>
  </entry>
</feed>"#;

    pub const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Zennのトレンド</title>
    <link>https://zenn.dev</link>
    <item>
      <title><![CDATA[Axumで作るAPIサーバー]]></title>
      <description><![CDATA[説明]]></description>
      <link>https://zenn.dev/dave/articles/axum</link>
      <guid isPermaLink="true">https://zenn.dev/dave/articles/axum</guid>
      <pubDate>Tue, 06 May 2025 01:00:00 GMT</pubDate>
      <dc:creator>dave</dc:creator>
    </item>
    <item>
      <title>Show HN: A tiny database</title>
      <link>https://example.com/tiny-db</link>
      <pubDate>Tue, 06 May 2025 02:30:00 +0000</pubDate>
      <category>databases</category>
    </item>
    <item>
      <description>no title here</description>
      <link>https://example.com/untitled</link>
    </item>
  </channel>
</rss>"#;

    pub const RDF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns="http://purl.org/rss/1.0/"
         xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dc="http://purl.org/dc/elements/1.1/"
         xmlns:hatena="http://www.hatena.ne.jp/info/xmlns#">
  <channel rdf:about="https://b.hatena.ne.jp/hotentry/it">
    <title>はてなブックマーク - 人気エントリー - テクノロジー</title>
    <link>https://b.hatena.ne.jp/hotentry/it</link>
    <items>
      <rdf:Seq>
        <rdf:li rdf:resource="https://example.com/low"/>
        <rdf:li rdf:resource="https://qiita.com/someone/items/xyz"/>
        <rdf:li rdf:resource="https://example.com/high"/>
      </rdf:Seq>
    </items>
  </channel>
  <item rdf:about="https://example.com/low">
    <title>少しだけ話題の記事</title>
    <link>https://example.com/low</link>
    <dc:date>2025-05-06T08:00:00+09:00</dc:date>
    <dc:subject>テクノロジー</dc:subject>
    <hatena:bookmarkcount>12</hatena:bookmarkcount>
  </item>
  <item rdf:about="https://qiita.com/someone/items/xyz">
    <title>Qiitaの記事</title>
    <link>https://qiita.com/someone/items/xyz</link>
    <hatena:bookmarkcount>300</hatena:bookmarkcount>
  </item>
  <item rdf:about="https://example.com/high">
    <title>大人気の記事</title>
    <link>https://example.com/high</link>
    <dc:date>2025-05-06T07:00:00+09:00</dc:date>
    <hatena:bookmarkcount>250</hatena:bookmarkcount>
  </item>
  <item rdf:about="https://zenn.dev/x/articles/y">
    <title>Zennの記事</title>
    <link>https://zenn.dev/x/articles/y</link>
    <hatena:bookmarkcount>90</hatena:bookmarkcount>
  </item>
  <item rdf:about="https://example.com/unknown">
    <title>数が読めない記事</title>
    <link>https://example.com/unknown</link>
    <hatena:bookmarkcount>n/a</hatena:bookmarkcount>
  </item>
</rdf:RDF>"#;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_atom() {
        let entries = parse_feed(fixtures::ATOM).unwrap();
        assert_eq!(entries.len(), 3);

        let first = &entries[0];
        assert_eq!(first.title, "Rustで始める非同期処理");
        assert_eq!(first.link, "https://qiita.com/alice/items/aaa");
        assert_eq!(first.author, "alice");
        assert_eq!(first.tags, vec!["Rust", "tokio"]);
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2025, 5, 6, 0, 0, 0).unwrap())
        );

        assert_eq!(entries[2].author, "");
        assert_eq!(entries[2].published, None);
    }

    #[test]
    fn test_parse_rss() {
        let entries = parse_feed(fixtures::RSS).unwrap();
        // The untitled item is skipped.
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].title, "Axumで作るAPIサーバー");
        assert_eq!(entries[0].author, "dave");
        assert_eq!(
            entries[0].published,
            Some(Utc.with_ymd_and_hms(2025, 5, 6, 1, 0, 0).unwrap())
        );
        assert_eq!(entries[1].tags, vec!["databases"]);
        assert_eq!(entries[1].bookmark_count, None);
    }

    #[test]
    fn test_parse_rdf() {
        let entries = parse_feed(fixtures::RDF).unwrap();
        assert_eq!(entries.len(), 5);

        assert_eq!(entries[0].bookmark_count, Some(12));
        assert_eq!(entries[0].tags, vec!["テクノロジー"]);
        assert_eq!(
            entries[0].published,
            Some(Utc.with_ymd_and_hms(2025, 5, 5, 23, 0, 0).unwrap())
        );
        assert_eq!(entries[4].bookmark_count, None);
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse_feed("<rss><channel><item><title>broken").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 6, 1, 0, 0).unwrap();
        assert_eq!(parse_date("Tue, 06 May 2025 01:00:00 GMT"), Some(expected));
        assert_eq!(parse_date("2025-05-06T10:00:00+09:00"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }
}
