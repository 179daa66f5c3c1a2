//! The collection run: fetch → dedupe → render → record → save → notify.
//!
//! Everything runs sequentially in source order, so the order of rendered
//! articles and history entries is deterministic.
//!
//! # Outcomes
//!
//! | Situation | Result |
//! |-----------|--------|
//! | at least one source produced articles, history saved | `Ok(Completed)` |
//! | at least one source produced articles, save failed | `Ok(Degraded)` |
//! | history could not be read; left untouched, not saved | `Ok(Degraded)` |
//! | every source returned nothing | `Ok(AllSourcesFailed)` |
//! | an article could not be rendered | `Err` |

use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use tracing::{debug, error, info, instrument, warn};

use crate::collectors::Collector;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::models::{Article, RunStats, Source};
use crate::notifier::Notifier;
use crate::outputs::markdown::Renderer;
use crate::summarizer::{Summarizer, Translator};

/// How a collection run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunStats),
    /// Articles were processed but the history could not be loaded or saved.
    Degraded(RunStats),
    AllSourcesFailed,
}

impl RunOutcome {
    pub fn stats(&self) -> Option<&RunStats> {
        match self {
            RunOutcome::Completed(stats) | RunOutcome::Degraded(stats) => Some(stats),
            RunOutcome::AllSourcesFailed => None,
        }
    }

    /// Whether the process should exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::AllSourcesFailed)
    }
}

/// Wires collectors, renderer and notifier around a [`HistoryStore`].
pub struct Pipeline {
    collectors: Vec<Box<dyn Collector>>,
    renderer: Box<dyn Renderer>,
    notifier: Box<dyn Notifier>,
    summarizer: Option<Arc<dyn Summarizer>>,
    translator: Option<Arc<dyn Translator>>,
}

impl Pipeline {
    pub fn new(
        collectors: Vec<Box<dyn Collector>>,
        renderer: Box<dyn Renderer>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            collectors,
            renderer,
            notifier,
            summarizer: None,
            translator: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Translator applied to Hacker News titles.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Run one collection pass against `history`.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self, history: &mut HistoryStore) -> Result<RunOutcome> {
        let t0 = Instant::now();

        history.acquire_lock();
        let loaded = match history.load() {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "History could not be loaded; continuing with empty history");
                false
            }
        };

        let (batch, mut stats) = self.collect().await;

        if batch.is_empty() {
            error!(sources = self.collectors.len(), "No source returned any articles");
            if self.notifier.is_enabled() {
                let message = format!(
                    "全てのソースから記事を取得できませんでした: {}",
                    self.collectors.iter().map(|c| c.source().display_name()).join(", ")
                );
                self.notifier.send_failure(&message).await;
            }
            history.release_lock();
            return Ok(RunOutcome::AllSourcesFailed);
        }

        let mut new_articles = Vec::new();
        for (source, article) in batch {
            if history.is_duplicate(&article.url) {
                stats.source_mut(source).duplicates += 1;
                debug!(%source, url = %article.url, "Skipping already collected article");
                continue;
            }

            let summary = match &self.summarizer {
                Some(summarizer) => summarizer.summarize(&article.url).await,
                None => String::new(),
            };

            let path = match self.renderer.render(&article, &summary).await {
                Ok(path) => path,
                Err(e) => {
                    error!(%source, url = %article.url, error = %e, "Rendering failed; aborting run");
                    history.release_lock();
                    return Err(e);
                }
            };
            info!(%source, path = %path.display(), "Saved new article");

            history.add(&article);
            stats.source_mut(source).new += 1;
            new_articles.push(article);
        }

        // An unreadable history file is left as it is rather than replaced
        // by this run's entries alone.
        let saved = if !loaded {
            error!(
                path = %history.path().display(),
                "History was not loaded; leaving it untouched and not recording this run"
            );
            history.release_lock();
            false
        } else {
            match history.save() {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "History could not be saved; next run may repeat articles");
                    false
                }
            }
        };

        if self.notifier.is_enabled() {
            self.notifier.send_success(&new_articles, &stats).await;
        }

        log_summary(&stats, t0);

        Ok(if saved {
            RunOutcome::Completed(stats)
        } else {
            RunOutcome::Degraded(stats)
        })
    }

    /// Fetch every source in order.
    async fn collect(&self) -> (Vec<(Source, Article)>, RunStats) {
        let mut stats = RunStats::default();
        let mut batch = Vec::new();

        for collector in &self.collectors {
            let source = collector.source();
            let mut articles = collector.fetch().await;

            if source == Source::Hackernews && !articles.is_empty() {
                if let Some(translator) = &self.translator {
                    articles = translator.translate_titles(articles).await;
                }
            }

            if articles.is_empty() {
                warn!(%source, "Source returned no articles");
            }
            stats.source_mut(source).fetched = articles.len();
            batch.extend(articles.into_iter().map(|a| (source, a)));
        }

        (batch, stats)
    }
}

fn log_summary(stats: &RunStats, t0: Instant) {
    for (source, s) in &stats.per_source {
        info!(
            %source,
            fetched = s.fetched,
            duplicates = s.duplicates,
            new = s.new,
            "Source summary"
        );
    }
    let failed = stats.failed_sources();
    if !failed.is_empty() {
        warn!(failed = %failed.iter().join(", "), "Some sources returned nothing");
    }
    info!(
        fetched = stats.total_fetched(),
        duplicates = stats.total_duplicates(),
        new = stats.total_new(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Run complete"
    );
}
