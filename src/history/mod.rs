//! Persistent record of article URLs that were already processed.
//!
//! The store keeps the entries in insertion order together with a derived
//! URL set for constant-time duplicate checks. Both are only ever changed
//! together, so the set always equals the URLs of the entries.
//!
//! ## Files
//!
//! ```text
//! data/
//! ├── history.json       # canonical, always a complete document
//! ├── history.json.bak   # previous generation, used for recovery
//! ├── history.tmp        # write target, renamed onto history.json
//! └── history.lock       # empty marker for the advisory lock
//! ```
//!
//! ## Failure handling
//!
//! - malformed or structurally invalid history: restore from backup, else
//!   start empty; never fatal
//! - lock held by someone else: warning only, the run goes on
//! - any other I/O failure: returned to the caller

mod lock;

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AppError, Result};
use crate::models::{Article, HistoryEntry, Source, timestamp};

pub use lock::HistoryLock;

/// Default retention used by the `cleanup` command.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// What [`HistoryStore::load`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No history file yet; the store starts empty.
    Fresh,
    /// The canonical file was valid.
    Loaded(usize),
    /// The canonical file was corrupt and the backup was used.
    Restored(usize),
    /// Both the canonical file and the backup were unusable; the store is empty.
    Reset,
}

#[derive(Serialize)]
struct HistoryDocument<'a> {
    articles: &'a [HistoryEntry],
}

/// Crash-safe set of processed article URLs.
///
/// Not meant for concurrent use: one instance per run, driven through `&mut`.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    articles: Vec<HistoryEntry>,
    urls: HashSet<String>,
    lock: Option<HistoryLock>,
    /// Set while the canonical file is known bad, so `save` keeps the backup.
    keep_backup: bool,
}

impl HistoryStore {
    /// Create an empty store backed by `path` (usually `data/history.json`).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            articles: Vec::new(),
            urls: HashSet::new(),
            lock: None,
            keep_backup: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    pub fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.articles
    }

    pub fn holds_lock(&self) -> bool {
        self.lock.is_some()
    }

    /// Try to take the advisory lock without blocking.
    ///
    /// Returns `false` if another process holds it or the marker cannot be
    /// opened. Callers keep going either way.
    pub fn acquire_lock(&mut self) -> bool {
        if self.lock.is_some() {
            return true;
        }
        let lock_path = self.lock_path();
        match HistoryLock::try_acquire(&lock_path) {
            Ok(Some(lock)) => {
                self.lock = Some(lock);
                true
            }
            Ok(None) => {
                warn!(
                    path = %lock_path.display(),
                    "history lock is held by another process; continuing anyway"
                );
                false
            }
            Err(e) => {
                warn!(path = %lock_path.display(), error = %e, "could not take history lock; continuing anyway");
                false
            }
        }
    }

    /// Release the advisory lock. Safe to call any number of times.
    pub fn release_lock(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
        }
    }

    /// Load the history from disk, recovering from corruption where possible.
    ///
    /// Only I/O failures outside of parsing are returned as `Err`; the store
    /// is empty afterwards in that case.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub fn load(&mut self) -> Result<LoadOutcome> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no history file yet; starting empty");
                self.reset();
                return Ok(LoadOutcome::Fresh);
            }
            Err(e) => {
                error!(error = %e, "failed to read history file");
                self.reset();
                return Err(AppError::Io(e));
            }
        };

        match parse_history(&bytes) {
            Ok(entries) => {
                self.replace_entries(entries);
                self.keep_backup = false;
                info!(count = self.len(), "loaded history");
                Ok(LoadOutcome::Loaded(self.len()))
            }
            Err(e) => {
                error!(error = %e, "history file is unusable; trying backup");
                self.keep_backup = true;
                if self.restore_from_backup() {
                    Ok(LoadOutcome::Restored(self.len()))
                } else {
                    warn!("no usable backup; starting with empty history");
                    self.reset();
                    Ok(LoadOutcome::Reset)
                }
            }
        }
    }

    /// Replace the in-memory state with the backup, if it is valid.
    #[instrument(level = "info", skip_all)]
    pub fn restore_from_backup(&mut self) -> bool {
        let backup = self.backup_path();
        let bytes = match fs::read(&backup) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %backup.display(), "no history backup");
                return false;
            }
            Err(e) => {
                error!(path = %backup.display(), error = %e, "failed to read history backup");
                return false;
            }
        };

        match parse_history(&bytes) {
            Ok(entries) => {
                self.replace_entries(entries);
                info!(count = self.len(), path = %backup.display(), "restored history from backup");
                true
            }
            Err(e) => {
                error!(path = %backup.display(), error = %e, "history backup is unusable too");
                false
            }
        }
    }

    pub fn is_duplicate(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Record `article` as processed, stamped with the current time.
    ///
    /// A URL that is already recorded is left alone and `false` is returned.
    pub fn add(&mut self, article: &Article) -> bool {
        self.push_entry(HistoryEntry::from_article(article))
    }

    fn push_entry(&mut self, entry: HistoryEntry) -> bool {
        if !self.urls.insert(entry.url.clone()) {
            debug!(url = %entry.url, "already in history; not adding again");
            return false;
        }
        debug!(url = %entry.url, title = %entry.title, "added to history");
        self.articles.push(entry);
        true
    }

    /// Write the history to disk atomically and release the lock.
    ///
    /// The lock is released whether or not the write succeeded.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub fn save(&mut self) -> Result<()> {
        let result = self.write_atomically();
        self.release_lock();
        match &result {
            Ok(()) => {
                self.keep_backup = false;
                info!(count = self.len(), "saved history");
            }
            Err(e) => error!(error = %e, "failed to save history"),
        }
        result
    }

    fn write_atomically(&self) -> Result<()> {
        self.create_backup();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(&HistoryDocument {
            articles: &self.articles,
        })?;

        let tmp = self.temp_path();
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Copy the current canonical file to the backup. Best-effort.
    ///
    /// Skipped when the last load found the canonical file corrupt.
    fn create_backup(&self) {
        let backup = self.backup_path();
        if self.keep_backup {
            debug!(path = %backup.display(), "canonical history was corrupt; keeping existing backup");
            return;
        }
        match fs::copy(&self.path, &backup) {
            Ok(_) => debug!(path = %backup.display(), "history backup written"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %backup.display(), error = %e, "history backup failed; saving anyway"),
        }
    }

    /// Remove entries collected more than `retention_days` ago.
    ///
    /// Returns the number of removed entries.
    pub fn cleanup_old_entries(&mut self, retention_days: u32) -> usize {
        let now = Utc::now();
        let cutoff = now
            .checked_sub_signed(Duration::days(i64::from(retention_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.remove_older_than(cutoff)
    }

    /// Remove entries with `collected_at` strictly before `cutoff`.
    ///
    /// An entry stamped exactly at `cutoff` is kept.
    pub fn remove_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.articles.len();
        self.articles.retain(|entry| entry.collected_at >= cutoff);
        self.urls = self.articles.iter().map(|e| e.url.clone()).collect();

        let removed = before - self.articles.len();
        info!(removed, remaining = self.len(), %cutoff, "removed expired history entries");
        removed
    }

    fn replace_entries(&mut self, entries: Vec<HistoryEntry>) {
        self.reset();
        for entry in entries {
            self.push_entry(entry);
        }
    }

    fn reset(&mut self) {
        self.articles.clear();
        self.urls.clear();
    }
}

/// Parse and validate a serialized history.
///
/// Only the document shape and each entry's `url` are hard requirements;
/// any problem with those is reported as [`AppError::Corrupt`]. Other fields
/// that are missing or unusable fall back to their defaults.
fn parse_history(bytes: &[u8]) -> Result<Vec<HistoryEntry>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| AppError::corrupt(format!("malformed JSON: {e}")))?;

    let articles = value
        .as_object()
        .ok_or_else(|| AppError::corrupt("root is not an object"))?
        .get("articles")
        .ok_or_else(|| AppError::corrupt("missing 'articles' field"))?
        .as_array()
        .ok_or_else(|| AppError::corrupt("'articles' is not an array"))?;

    let loaded_at = Utc::now();
    articles
        .iter()
        .enumerate()
        .map(|(i, raw)| entry_from_value(i, raw, loaded_at))
        .collect()
}

fn entry_from_value(index: usize, raw: &Value, loaded_at: DateTime<Utc>) -> Result<HistoryEntry> {
    let url = raw
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::corrupt(format!("entry {index} has no url")))?;

    let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();
    let source = raw
        .get("source")
        .and_then(|v| Source::deserialize(v).ok())
        .unwrap_or_default();

    let collected_at = match raw.get("collected_at") {
        None | Some(Value::Null) => loaded_at,
        Some(v) => match v.as_str().and_then(timestamp::parse) {
            Some(at) => at,
            None => {
                warn!(index, url, raw = %v, "unparsable collected_at; using load time");
                loaded_at
            }
        },
    };

    Ok(HistoryEntry {
        url: url.to_string(),
        title: title.to_string(),
        source,
        collected_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> HistoryStore {
        HistoryStore::new(tmp.path().join("data/history.json"))
    }

    fn article(url: &str, title: &str) -> Article {
        Article::new(Source::Qiita, title, url)
    }

    fn entry_at(url: &str, at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            url: url.to_string(),
            title: url.to_string(),
            source: Source::Zenn,
            collected_at: at,
        }
    }

    fn write_valid(path: &Path, urls: &[&str]) {
        let articles: Vec<_> = urls
            .iter()
            .map(|u| {
                serde_json::json!({
                    "url": u,
                    "title": "t",
                    "source": "qiita",
                    "collected_at": "2025-05-06T12:00:00+00:00",
                })
            })
            .collect();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_vec(&serde_json::json!({ "articles": articles })).unwrap())
            .unwrap();
    }

    #[test]
    fn test_load_without_file_is_fresh() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);

        assert_eq!(store.load().unwrap(), LoadOutcome::Fresh);
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_transitions_duplicate_and_ignores_repeat() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);

        assert!(!store.is_duplicate("https://a"));
        assert!(store.add(&article("https://a", "A")));
        assert!(store.is_duplicate("https://a"));
        assert_eq!(store.len(), 1);

        assert!(!store.add(&article("https://a", "A again")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].title, "A");
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.add(&article("https://a", "A"));
        store.add(&article("https://b", "B"));
        store.add(&article("https://c", "C"));
        store.save().unwrap();

        let mut fresh = store_in(&tmp);
        assert_eq!(fresh.load().unwrap(), LoadOutcome::Loaded(3));
        let urls: HashSet<_> = fresh.entries().iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, HashSet::from(["https://a", "https://b", "https://c"]));
        assert_eq!(fresh.entries()[1].title, "B");
        assert_eq!(fresh.entries()[1].source, Source::Qiita);
    }

    #[test]
    fn test_save_creates_backup_of_previous_generation() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.add(&article("https://a", "A"));
        store.save().unwrap();
        assert!(!store.backup_path().exists());

        store.add(&article("https://b", "B"));
        store.save().unwrap();

        let backup = parse_history(&fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.len(), 1);
        assert_eq!(backup[0].url, "https://a");
    }

    #[test]
    fn test_garbled_file_recovers_from_backup() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        write_valid(&store.backup_path(), &["https://1", "https://2", "https://3", "https://4"]);
        fs::write(store.path(), b"{\"articles\": [ {\"url\": \"htt\x00\xff").unwrap();

        assert_eq!(store.load().unwrap(), LoadOutcome::Restored(4));
        assert_eq!(store.len(), 4);
        assert!(store.is_duplicate("https://3"));
    }

    #[test]
    fn test_structural_violation_recovers_from_backup() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        write_valid(&store.backup_path(), &["https://1", "https://2"]);
        fs::write(
            store.path(),
            r#"{"articles": [{"url": "https://x"}, {"title": "no url"}]}"#,
        )
        .unwrap();

        assert_eq!(store.load().unwrap(), LoadOutcome::Restored(2));
        assert!(!store.is_duplicate("https://x"));
    }

    #[test]
    fn test_bad_optional_fields_fall_back_instead_of_corrupting() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{"articles": [
                {"url": "https://ok", "title": "ok", "source": "zenn", "collected_at": "2025-05-06T12:00:00+00:00"},
                {"url": "https://null-title", "title": null, "source": 3},
                {"url": "https://bad-ts", "title": "t", "source": "qiita", "collected_at": "2025-05-06"}
            ]}"#,
        )
        .unwrap();

        let before = Utc::now();
        assert_eq!(store.load().unwrap(), LoadOutcome::Loaded(3));

        let entries = store.entries();
        assert_eq!(entries[0].source, Source::Zenn);
        assert_eq!(entries[1].title, "");
        assert_eq!(entries[1].source, Source::Unknown);
        assert!(entries[1].collected_at >= before);
        assert_eq!(entries[2].source, Source::Qiita);
        assert!(entries[2].collected_at >= before);
    }

    #[test]
    fn test_naive_timestamp_is_accepted() {
        let entries = parse_history(
            br#"{"articles": [{"url": "https://a", "collected_at": "2025-05-06T12:00:00.123456"}]}"#,
        )
        .unwrap();
        let at = entries[0].collected_at;
        assert!(at > Utc.with_ymd_and_hms(2025, 5, 5, 0, 0, 0).unwrap());
        assert!(at < Utc.with_ymd_and_hms(2025, 5, 8, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_save_after_restore_keeps_good_backup() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        write_valid(&store.backup_path(), &["https://1", "https://2"]);
        fs::write(store.path(), "not json").unwrap();

        assert_eq!(store.load().unwrap(), LoadOutcome::Restored(2));
        store.add(&article("https://3", "three"));
        store.save().unwrap();

        let backup = parse_history(&fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.len(), 2);
        let canonical = parse_history(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(canonical.len(), 3);

        // Once the canonical file is good again, backups resume.
        store.save().unwrap();
        let backup = parse_history(&fs::read(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.len(), 3);
    }

    #[test]
    fn test_wrong_shapes_are_corrupt() {
        for raw in [
            "[]",
            r#"{"items": []}"#,
            r#"{"articles": {}}"#,
            r#"{"articles": [42]}"#,
            r#"{"articles": [{"url": 7}]}"#,
        ] {
            let err = parse_history(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, AppError::Corrupt(_)), "{raw}");
        }
    }

    #[test]
    fn test_corrupt_without_backup_resets_to_empty() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not json").unwrap();
        fs::write(store.backup_path(), "also not json").unwrap();

        assert_eq!(store.load().unwrap(), LoadOutcome::Reset);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unreadable_history_is_an_error() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be: reading it is an I/O error, not corruption.
        let path = tmp.path().join("history.json");
        fs::create_dir_all(&path).unwrap();
        let mut store = HistoryStore::new(&path);

        assert!(matches!(store.load(), Err(AppError::Io(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_urls_in_file_collapse_on_load() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        write_valid(store.path(), &["https://a", "https://a", "https://b"]);

        assert_eq!(store.load().unwrap(), LoadOutcome::Loaded(2));
    }

    #[test]
    fn test_interrupted_save_leaves_canonical_intact() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        store.add(&article("https://a", "A"));
        store.add(&article("https://b", "B"));
        store.save().unwrap();
        assert!(!store.temp_path().exists());

        // Crash after writing part of the temp file, before the rename.
        fs::write(store.temp_path(), br#"{"articles": [{"url": "https://a", "ti"#).unwrap();

        let mut after_crash = store_in(&tmp);
        assert_eq!(after_crash.load().unwrap(), LoadOutcome::Loaded(2));

        // The next save replaces the stale temp file and leaves only the canonical one.
        after_crash.add(&article("https://c", "C"));
        after_crash.save().unwrap();
        assert!(!after_crash.temp_path().exists());
        let on_disk = parse_history(&fs::read(after_crash.path()).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 3);
    }

    #[test]
    fn test_save_releases_lock_even_on_failure() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        // Parent of the history path is a regular file, so create_dir_all fails.
        let mut store = HistoryStore::new(blocker.join("history.json"));
        let lock_dir = TempDir::new().unwrap();
        store.lock = HistoryLock::try_acquire(&lock_dir.path().join("history.lock")).unwrap();
        assert!(store.holds_lock());

        store.add(&article("https://a", "A"));
        assert!(store.save().is_err());
        assert!(!store.holds_lock());
    }

    #[test]
    fn test_lock_contention_is_soft() {
        let tmp = TempDir::new().unwrap();
        let mut first = store_in(&tmp);
        let mut second = store_in(&tmp);

        assert!(first.acquire_lock());
        assert!(first.acquire_lock());
        assert!(!second.acquire_lock());

        first.save().unwrap();
        first.release_lock();
        assert!(second.acquire_lock());
    }

    #[test]
    fn test_cleanup_removes_old_entries() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let now = Utc::now();
        store.push_entry(entry_at("https://old", now - Duration::days(8)));
        store.push_entry(entry_at("https://older", now - Duration::days(30)));
        store.push_entry(entry_at("https://recent", now - Duration::days(1)));

        assert_eq!(store.cleanup_old_entries(7), 2);
        assert_eq!(store.len(), 1);
        assert!(store.is_duplicate("https://recent"));
        assert!(!store.is_duplicate("https://old"));
    }

    #[test]
    fn test_cleanup_keeps_entry_exactly_at_boundary() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);
        let cutoff = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        store.push_entry(entry_at("https://boundary", cutoff));
        store.push_entry(entry_at("https://before", cutoff - Duration::seconds(1)));

        assert_eq!(store.remove_older_than(cutoff), 1);
        assert!(store.is_duplicate("https://boundary"));
        assert!(!store.is_duplicate("https://before"));
        assert_eq!(store.urls.len(), store.articles.len());
    }
}
