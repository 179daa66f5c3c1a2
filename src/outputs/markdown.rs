//! Markdown rendering of collected articles.
//!
//! Each new article becomes one file:
//!
//! ```text
//! articles/
//! └── 2025-05-06/
//!     ├── Rustで始める非同期処理.md
//!     └── Show HN A tiny database.md
//! ```
//!
//! The file name is the sanitized title. Writing the same title twice on the
//! same day overwrites the earlier file.

use std::fmt::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{error, info, instrument};

use crate::error::Result;
use crate::models::Article;

/// Longest file stem, in characters.
pub const MAX_FILENAME_CHARS: usize = 200;

const UNKNOWN: &str = "不明";
const MISSING_SUMMARY: &str = "（要約の取得に失敗しました）";

static FORBIDDEN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Writes one article to durable output.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `article` with its `summary` and return the written path.
    async fn render(&self, article: &Article, summary: &str) -> Result<PathBuf>;
}

/// Strip characters that are invalid in file names, collapse whitespace and
/// cap the length at [`MAX_FILENAME_CHARS`].
pub fn sanitize_filename(title: &str) -> String {
    let stripped = FORBIDDEN_CHARS.replace_all(title, "");
    let collapsed = WHITESPACE_RUN.replace_all(stripped.trim(), " ");
    collapsed.chars().take(MAX_FILENAME_CHARS).collect()
}

/// Build the Markdown document for one article.
pub fn article_to_markdown(article: &Article, summary: &str) -> String {
    let mut md = String::new();

    writeln!(md, "# {}\n", article.title).ok();
    writeln!(md, "## 記事情報\n").ok();
    writeln!(md, "- **URL**: {}", article.url).ok();
    writeln!(md, "- **ソース**: {}", article.source.display_name()).ok();

    let author = if article.author.is_empty() {
        UNKNOWN
    } else {
        article.author.as_str()
    };
    writeln!(md, "- **著者**: {author}").ok();

    match article.published {
        Some(published) => writeln!(md, "- **公開日時**: {}", published.to_rfc3339()).ok(),
        None => writeln!(md, "- **公開日時**: {UNKNOWN}").ok(),
    };

    if !article.tags.is_empty() {
        writeln!(md, "- **タグ**: {}", article.tags.iter().join(", ")).ok();
    }
    if let Some(bookmarks) = article.bookmarks {
        writeln!(md, "- **ブックマーク数**: {bookmarks}").ok();
    }

    let summary = summary.trim();
    let summary = if summary.is_empty() {
        MISSING_SUMMARY
    } else {
        summary
    };
    writeln!(md, "\n## 要約\n\n{summary}").ok();

    md
}

/// Renders articles to `<root>/<YYYY-MM-DD>/<title>.md`.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    root: PathBuf,
}

impl MarkdownRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Target path for `article` on `date`.
    pub fn path_for(&self, article: &Article, date: NaiveDate) -> PathBuf {
        let mut stem = sanitize_filename(&article.title);
        if stem.is_empty() {
            stem = "untitled".to_string();
        }
        self.root
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{stem}.md"))
    }

    /// Write `article` into the directory for `date`.
    #[instrument(level = "info", skip_all, fields(url = %article.url, %date))]
    pub async fn render_on(&self, article: &Article, summary: &str, date: NaiveDate) -> Result<PathBuf> {
        let path = self.path_for(article, date);
        if let Some(dir) = path.parent() {
            if let Err(e) = fs::create_dir_all(dir).await {
                error!(dir = %dir.display(), error = %e, "Failed to create article directory");
                return Err(e.into());
            }
        }

        fs::write(&path, article_to_markdown(article, summary)).await?;
        info!(path = %path.display(), "Wrote article Markdown");
        Ok(path)
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    async fn render(&self, article: &Article, summary: &str) -> Result<PathBuf> {
        self.render_on(article, summary, Local::now().date_naive()).await
    }
}
