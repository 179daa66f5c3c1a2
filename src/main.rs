//! # Tech Trend Collector
//!
//! Collects trending technology articles from Qiita, Zenn, Hacker News and
//! Hatena Bookmark, skips the ones collected on earlier runs, writes each new
//! article to a Markdown file and optionally emails a digest.
//!
//! ## Features
//!
//! - Feed collection (Atom, RSS 2.0, RSS 1.0) with per-source selection rules
//! - Crash-safe history of collected URLs with backup recovery and an
//!   advisory lock against overlapping runs
//! - Optional Gemini summaries and Japanese translation of Hacker News titles
//! - Optional digest and failure emails through Resend
//! - Exponential backoff on rate limits, timeouts and unavailable services
//!
//! ## Usage
//!
//! ```sh
//! tech_trend_collector                       # one collection pass
//! tech_trend_collector cleanup --days 7      # prune old history entries
//! ```
//!
//! ## Architecture
//!
//! 1. **Collect**: Fetch each feed in order (Qiita, Zenn, Hacker News, Hatena)
//! 2. **Deduplicate**: Skip URLs already in `data/history.json`
//! 3. **Render**: Write `articles/YYYY-MM-DD/<title>.md`
//! 4. **Record**: Save the history atomically
//! 5. **Notify**: Email the digest

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collectors;
mod config;
mod error;
mod history;
mod models;
mod notifier;
mod outputs;
mod pipeline;
mod retry;
mod summarizer;
mod utils;

use cli::{Cli, Command};
use config::Settings;
use error::Result;
use history::HistoryStore;
use notifier::{Notifier, ResendNotifier};
use outputs::markdown::MarkdownRenderer;
use pipeline::{Pipeline, RunOutcome};
use summarizer::GeminiClient;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "tech_trend_collector starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(command = ?args.command(), config = ?args.config, "Parsed CLI arguments");

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid settings");
            return ExitCode::FAILURE;
        }
    };

    let code = match args.command() {
        Command::Collect => collect(&args, &settings).await,
        Command::Cleanup { days } => cleanup(&settings, days),
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    code
}

fn load_settings(args: &Cli) -> Result<Settings> {
    let settings = Settings::load(args.config.as_deref())?.with_overrides(args);
    settings.validate()?;
    Ok(settings)
}

/// One collection pass.
#[instrument(level = "info", skip_all)]
async fn collect(args: &Cli, settings: &Settings) -> ExitCode {
    // Early check: ensure the articles dir is writable
    if let Err(e) = ensure_writable_dir(&settings.articles_dir).await {
        error!(
            path = %settings.articles_dir.display(),
            error = %e,
            "Articles directory is not writable (fix perms or choose a different path)"
        );
        return ExitCode::FAILURE;
    }

    let http = match collectors::http_client(settings.timeout()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let retry = settings.retry.policy();

    let notifier = ResendNotifier::new(
        http.clone(),
        args.resend_api_key(),
        args.notification_email(),
        settings.email.clone(),
        retry.clone(),
    );
    if !notifier.is_enabled() {
        info!("RESEND_API_KEY or NOTIFICATION_EMAIL not set; email notifications disabled");
    }

    let mut pipeline = Pipeline::new(
        collectors::default_collectors(settings, &http),
        Box::new(MarkdownRenderer::new(&settings.articles_dir)),
        Box::new(notifier),
    );

    let mut gemini = GeminiClient::new(http, args.gemini_api_key(), &settings.gemini, retry);
    if gemini.initialize() {
        let gemini = Arc::new(gemini);
        pipeline = pipeline
            .with_summarizer(gemini.clone())
            .with_translator(gemini);
    }

    let mut history = HistoryStore::new(settings.history_path());
    match pipeline.run(&mut history).await {
        Ok(outcome) if outcome.is_failure() => {
            error!("Collection failed: no source returned any articles");
            ExitCode::FAILURE
        }
        Ok(outcome) => {
            let new = outcome.stats().map_or(0, |s| s.total_new());
            if matches!(outcome, RunOutcome::Degraded(_)) {
                warn!(new, "Collection completed but history was not saved");
            } else {
                info!(new, "Collection completed");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Collection aborted");
            ExitCode::FAILURE
        }
    }
}

/// Remove history entries older than `days`.
#[instrument(level = "info", skip(settings))]
fn cleanup(settings: &Settings, days: u32) -> ExitCode {
    let mut history = HistoryStore::new(settings.history_path());
    history.acquire_lock();

    if let Err(e) = history.load() {
        error!(error = %e, "Failed to load history");
        history.release_lock();
        return ExitCode::FAILURE;
    }

    let removed = history.cleanup_old_entries(days);

    if let Err(e) = history.save() {
        error!(error = %e, "Failed to save history");
        return ExitCode::FAILURE;
    }

    info!(removed, remaining = history.len(), "History cleanup complete");
    ExitCode::SUCCESS
}
