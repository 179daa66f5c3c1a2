//! Email notifications through the Resend HTTP API.
//!
//! A run ends with one email: a digest of the new articles on success, or an
//! error report when no source produced anything. Sending is best-effort;
//! failures are logged and reported as `false`, never propagated.
//!
//! Notifications are enabled only when both `RESEND_API_KEY` and
//! `NOTIFICATION_EMAIL` are set.

use std::fmt::Write;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::EmailSettings;
use crate::error::{AppError, Result};
use crate::models::{Article, RunStats, Source};
use crate::retry::RetryPolicy;
use crate::utils::{escape_html, truncate_for_log};

const SERVICE: &str = "resend";

/// Delivers run results to a human.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Report a completed run. Returns whether the message was accepted.
    async fn send_success(&self, articles: &[Article], stats: &RunStats) -> bool;

    /// Report a failed run. Returns whether the message was accepted.
    async fn send_failure(&self, message: &str) -> bool;
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Build the digest email body.
pub fn success_html(
    articles: &[Article],
    stats: &RunStats,
    date: &str,
    repository_url: Option<&str>,
) -> String {
    let mut html = String::new();

    writeln!(html, "<h2>📰 本日のトレンド記事</h2>").ok();

    let fetched = stats
        .per_source
        .iter()
        .map(|(source, s)| format!("{} {}件", source.display_name(), s.fetched))
        .collect::<Vec<_>>()
        .join(" / ");
    writeln!(html, "<p><strong>取得件数:</strong> {fetched}</p>").ok();
    writeln!(html, "<p><strong>新規保存:</strong> {}件</p>", stats.total_new()).ok();

    for source in Source::ALL {
        let group: Vec<&Article> = articles.iter().filter(|a| a.source == source).collect();
        if group.is_empty() {
            continue;
        }
        writeln!(html, "<h3>{}</h3>", source.display_name()).ok();
        writeln!(html, "<ul>").ok();
        for article in group {
            writeln!(
                html,
                "  <li><a href=\"{}\">{}</a></li>",
                escape_html(&article.url),
                escape_html(&article.title)
            )
            .ok();
        }
        writeln!(html, "</ul>").ok();
    }

    if let Some(repo) = repository_url {
        writeln!(html, "<hr>").ok();
        writeln!(
            html,
            "<p><a href=\"{}/tree/main/articles/{date}\">📁 GitHubで詳細を見る</a></p>",
            escape_html(repo.trim_end_matches('/'))
        )
        .ok();
    }

    html
}

/// Build the error report email body.
pub fn failure_html(message: &str, date: &str, repository_url: Option<&str>) -> String {
    let mut html = String::new();

    writeln!(html, "<h2>⚠️ TechTrendCollector 実行エラー</h2>").ok();
    writeln!(html, "<p><strong>日時:</strong> {date}</p>").ok();
    writeln!(html, "<p><strong>エラー内容:</strong></p>").ok();
    writeln!(html, "<pre>{}</pre>", escape_html(message)).ok();

    if let Some(repo) = repository_url {
        writeln!(html, "<hr>").ok();
        writeln!(
            html,
            "<p><a href=\"{}/actions\">GitHub Actionsログを確認する</a></p>",
            escape_html(repo.trim_end_matches('/'))
        )
        .ok();
    }

    html
}

/// Sends notifications through `POST https://api.resend.com/emails`.
#[derive(Debug, Clone)]
pub struct ResendNotifier {
    http: Client,
    api_key: Option<String>,
    recipient: Option<String>,
    settings: EmailSettings,
    retry: RetryPolicy,
}

impl ResendNotifier {
    pub fn new(
        http: Client,
        api_key: Option<&str>,
        recipient: Option<&str>,
        settings: EmailSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            api_key: api_key.map(str::to_string),
            recipient: recipient.map(str::to_string),
            settings,
            retry,
        }
    }

    async fn send_once(&self, request: &EmailRequest<'_>) -> Result<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::config("Resend API key missing"))?;

        let resp = self
            .http
            .post(&self.settings.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::api(SERVICE, status.as_u16(), truncate_for_log(&text, 300)));
        }
        Ok(())
    }

    #[instrument(level = "info", skip(self, html))]
    async fn send(&self, subject: &str, html: &str) -> bool {
        let Some(recipient) = self.recipient.as_deref() else {
            return false;
        };
        let request = EmailRequest {
            from: &self.settings.from,
            to: [recipient],
            subject,
            html,
        };

        let t0 = Instant::now();
        match self.retry.run("resend.send", || self.send_once(&request)).await {
            Ok(()) => {
                info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Notification sent");
                true
            }
            Err(e) => {
                let exhausted = e.is_exhausted();
                let e = e.into_inner();
                error!(
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    exhausted,
                    error = %e,
                    "Notification failed"
                );
                false
            }
        }
    }
}

fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

#[async_trait]
impl Notifier for ResendNotifier {
    fn is_enabled(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.api_key) && set(&self.recipient)
    }

    async fn send_success(&self, articles: &[Article], stats: &RunStats) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let date = today();
        let subject = format!("[TechTrend] {date} のトレンド記事");
        let html = success_html(articles, stats, &date, self.settings.repository_url.as_deref());
        self.send(&subject, &html).await
    }

    async fn send_failure(&self, message: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let date = today();
        let subject = format!("[TechTrend] {date} 実行エラー");
        let html = failure_html(message, &date, self.settings.repository_url.as_deref());
        self.send(&subject, &html).await
    }
}
