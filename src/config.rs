//! Runtime settings.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional YAML file (`--config settings.yaml`)
//! 3. command-line flags
//!
//! API keys and the notification address are never read from the YAML file;
//! they only come from flags or the environment (see [`crate::cli::Cli`]).
//!
//! # Example
//!
//! ```yaml
//! data_dir: ./data
//! articles_dir: ./articles
//! timeout_secs: 20
//! max_articles_per_source: 10
//! feeds:
//!   zenn: https://zenn.dev/feed
//! retry:
//!   max_attempts: 4
//! email:
//!   repository_url: https://github.com/example/tech-trend
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use crate::cli::Cli;
use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_articles_dir() -> PathBuf {
    PathBuf::from("articles")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_articles() -> usize {
    5
}

fn default_qiita_feed() -> String {
    "https://qiita.com/popular-items/feed.atom".to_string()
}

fn default_zenn_feed() -> String {
    "https://zenn.dev/feed".to_string()
}

fn default_hackernews_feed() -> String {
    "https://hnrss.org/frontpage".to_string()
}

fn default_hatena_feed() -> String {
    "https://b.hatena.ne.jp/hotentry/it.rss".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_resend_endpoint() -> String {
    "https://api.resend.com/emails".to_string()
}

fn default_sender() -> String {
    "onboarding@resend.dev".to_string()
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding `history.json` and its siblings.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root directory for rendered Markdown.
    #[serde(default = "default_articles_dir")]
    pub articles_dir: PathBuf,

    /// Timeout applied to every HTTP request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cap for the Qiita and Zenn feeds.
    #[serde(default = "default_max_articles")]
    pub max_articles_per_source: usize,

    #[serde(default)]
    pub feeds: FeedUrls,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub gemini: GeminiSettings,

    #[serde(default)]
    pub email: EmailSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            articles_dir: default_articles_dir(),
            timeout_secs: default_timeout_secs(),
            max_articles_per_source: default_max_articles(),
            feeds: FeedUrls::default(),
            retry: RetrySettings::default(),
            gemini: GeminiSettings::default(),
            email: EmailSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedUrls {
    #[serde(default = "default_qiita_feed")]
    pub qiita: String,
    #[serde(default = "default_zenn_feed")]
    pub zenn: String,
    #[serde(default = "default_hackernews_feed")]
    pub hackernews: String,
    #[serde(default = "default_hatena_feed")]
    pub hatena: String,
}

impl Default for FeedUrls {
    fn default() -> Self {
        Self {
            qiita: default_qiita_feed(),
            zenn: default_zenn_feed(),
            hackernews: default_hackernews_feed(),
            hatena: default_hatena_feed(),
        }
    }
}

/// Backoff settings shared by the summarizer and the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: 0,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .backoff_factor(self.backoff_factor)
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .max_jitter(Duration::from_millis(self.jitter_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiSettings {
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSettings {
    #[serde(default = "default_resend_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_sender")]
    pub from: String,
    /// Linked from the email footer when set.
    #[serde(default)]
    pub repository_url: Option<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            endpoint: default_resend_endpoint(),
            from: default_sender(),
            repository_url: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or the defaults when no file is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let settings = Self::from_yaml(&raw)?;
                info!(path = %path.display(), "Loaded settings file");
                Ok(settings)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply command-line overrides on top of the loaded values.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(dir) = &cli.articles_dir {
            self.articles_dir = dir.clone();
        }
        if let Some(secs) = cli.timeout_secs {
            self.timeout_secs = secs;
        }
        if let Some(max) = cli.max_articles {
            self.max_articles_per_source = max;
        }
        self
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(AppError::config("timeout_secs must be greater than zero"));
        }
        if self.max_articles_per_source == 0 {
            return Err(AppError::config(
                "max_articles_per_source must be greater than zero",
            ));
        }
        for (name, raw) in [
            ("feeds.qiita", &self.feeds.qiita),
            ("feeds.zenn", &self.feeds.zenn),
            ("feeds.hackernews", &self.feeds.hackernews),
            ("feeds.hatena", &self.feeds.hatena),
            ("gemini.base_url", &self.gemini.base_url),
            ("email.endpoint", &self.email.endpoint),
        ] {
            Url::parse(raw).map_err(|e| AppError::config(format!("{name} is not a valid URL: {e}")))?;
        }
        Ok(())
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
