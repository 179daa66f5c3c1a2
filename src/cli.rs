//! Command-line interface definitions for the collector.
//!
//! Every option is optional: a bare invocation runs one collection pass with
//! the default settings. Secrets are read from the environment when not
//! passed as flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::history::DEFAULT_RETENTION_DAYS;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Collect with defaults (data/ and articles/ in the working directory)
/// tech_trend_collector
///
/// # Collect with a settings file and a shorter timeout
/// tech_trend_collector --config settings.yaml --timeout-secs 10
///
/// # Drop history entries older than 14 days
/// tech_trend_collector cleanup --days 14
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Optional path to a YAML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding history.json
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Root directory for rendered Markdown articles
    #[arg(long, global = true)]
    pub articles_dir: Option<PathBuf>,

    /// Timeout for every HTTP request, in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Maximum articles taken from the Qiita and Zenn feeds
    #[arg(long, global = true)]
    pub max_articles: Option<usize>,

    /// Gemini API key; enables summaries and title translation
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Resend API key; enables email notifications together with --notification-email
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    /// Recipient of the notification emails
    #[arg(long, env = "NOTIFICATION_EMAIL")]
    pub notification_email: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one collection pass (the default)
    Collect,

    /// Remove history entries older than the retention period
    Cleanup {
        /// Retention period in days
        #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
        days: u32,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Collect)
    }

    pub fn gemini_api_key(&self) -> Option<&str> {
        non_blank(&self.gemini_api_key)
    }

    pub fn resend_api_key(&self) -> Option<&str> {
        non_blank(&self.resend_api_key)
    }

    pub fn notification_email(&self) -> Option<&str> {
        non_blank(&self.notification_email)
    }
}

/// Treat an empty or whitespace-only secret like an absent one.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
