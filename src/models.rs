//! Data models shared by collectors, the history store and the pipeline.
//!
//! - [`Article`]: a normalized feed entry as returned by a collector
//! - [`Source`]: the feed an article came from
//! - [`HistoryEntry`]: one record of the persisted history
//! - [`RunStats`] / [`SourceStats`]: per-run counters

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The feed an article came from.
///
/// Serialized lowercase. Values this build does not know about deserialize
/// to [`Source::Unknown`] so an old or foreign history file still loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Qiita,
    Zenn,
    Hackernews,
    Hatena,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Source {
    /// Collection order used by the pipeline.
    pub const ALL: [Source; 4] = [Source::Qiita, Source::Zenn, Source::Hackernews, Source::Hatena];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Qiita => "qiita",
            Source::Zenn => "zenn",
            Source::Hackernews => "hackernews",
            Source::Hatena => "hatena",
            Source::Unknown => "unknown",
        }
    }

    /// Human-readable name used in Markdown and email output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Qiita => "Qiita",
            Source::Zenn => "Zenn",
            Source::Hackernews => "Hacker News",
            Source::Hatena => "Hatena Bookmark",
            Source::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized article as returned by a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    /// Empty when the feed does not name an author.
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: Source,
    /// Hatena bookmark count, the only source-specific popularity metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<u32>,
}

impl Article {
    pub fn new(source: Source, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            author: String::new(),
            published: None,
            tags: Vec::new(),
            source,
            bookmarks: None,
        }
    }
}

/// One processed article in the persisted history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default = "Utc::now", with = "timestamp")]
    pub collected_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Entry for `article`, stamped with the current time.
    pub fn from_article(article: &Article) -> Self {
        Self {
            url: article.url.clone(),
            title: article.title.clone(),
            source: article.source,
            collected_at: Utc::now(),
        }
    }
}

/// `collected_at` is written as RFC 3339. Older files carry naive ISO-8601
/// timestamps without an offset; those are read as local time.
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Counters for one source during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub fetched: usize,
    pub duplicates: usize,
    pub new: usize,
}

/// Counters for a whole run, kept in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub per_source: Vec<(Source, SourceStats)>,
}

impl RunStats {
    /// Mutable counters for `source`, inserted on first use.
    pub fn source_mut(&mut self, source: Source) -> &mut SourceStats {
        let pos = match self.per_source.iter().position(|(s, _)| *s == source) {
            Some(pos) => pos,
            None => {
                self.per_source.push((source, SourceStats::default()));
                self.per_source.len() - 1
            }
        };
        &mut self.per_source[pos].1
    }

    pub fn get(&self, source: Source) -> SourceStats {
        self.per_source
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, stats)| *stats)
            .unwrap_or_default()
    }

    pub fn total_fetched(&self) -> usize {
        self.per_source.iter().map(|(_, s)| s.fetched).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.per_source.iter().map(|(_, s)| s.duplicates).sum()
    }

    pub fn total_new(&self) -> usize {
        self.per_source.iter().map(|(_, s)| s.new).sum()
    }

    /// Sources that returned no articles at all.
    pub fn failed_sources(&self) -> Vec<Source> {
        self.per_source
            .iter()
            .filter(|(_, s)| s.fetched == 0)
            .map(|(source, _)| *source)
            .collect()
    }
}
