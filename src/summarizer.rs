//! Article summaries and title translation through the Gemini API.
//!
//! [`GeminiClient`] implements both [`Summarizer`] and [`Translator`]. It is
//! built by `main`, explicitly initialized, and then shared with the pipeline.
//! Every request goes through the configured [`RetryPolicy`]; when the policy
//! gives up the caller gets an empty summary or the untranslated titles.
//!
//! # Request Shape
//!
//! ```text
//! POST {base_url}/models/{model}:generateContent
//! x-goog-api-key: <key>
//! {"contents":[{"parts":[{"text":"<prompt>"}]}]}
//! ```

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::GeminiSettings;
use crate::error::{AppError, Result};
use crate::models::Article;
use crate::retry::RetryPolicy;
use crate::utils::truncate_for_log;

const SERVICE: &str = "gemini";

/// Produces a short summary for an article URL.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summary text, or an empty string on failure.
    async fn summarize(&self, url: &str) -> String;
}

/// Translates article titles in bulk.
#[async_trait]
pub trait Translator: Send + Sync {
    /// The same articles with translated titles, or unchanged on failure.
    async fn translate_titles(&self, articles: Vec<Article>) -> Vec<Article>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect::<String>())
            .unwrap_or_default()
    }
}

fn summary_prompt(url: &str) -> String {
    format!("以下の技術記事を要約してください。\n\n【記事URL】\n{url}\n")
}

fn translation_prompt(titles_json: &str) -> String {
    format!(
        "以下の英語の記事タイトルを自然な日本語に翻訳してください。\n\
         JSON配列形式で、翻訳後のタイトルのみを入力と同じ順序で返してください。\n\
         余計な説明やコードブロックは不要です。JSON配列のみを出力してください。\n\n\
         {titles_json}"
    )
}

/// Parse a translation reply into exactly `expected` titles.
///
/// Accepts a bare JSON array or one wrapped in a Markdown code fence.
/// Returns `None` for anything else, including a count mismatch.
pub fn parse_translation(text: &str, expected: usize) -> Option<Vec<String>> {
    let mut cleaned = text.trim();
    if cleaned.starts_with("```") {
        // Drop the opening fence line (with any language tag) and the closing fence.
        cleaned = cleaned.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        cleaned = cleaned.trim_end().trim_end_matches("```").trim();
    }

    let values: Vec<serde_json::Value> = match serde_json::from_str(cleaned) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, reply = %truncate_for_log(cleaned, 200), "Translation reply is not a JSON array");
            return None;
        }
    };

    if values.len() != expected {
        warn!(expected, actual = values.len(), "Translation count mismatch");
        return None;
    }

    Some(
        values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    )
}

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    endpoint: String,
    retry: RetryPolicy,
    ready: bool,
}

impl GeminiClient {
    pub fn new(
        http: Client,
        api_key: Option<&str>,
        settings: &GeminiSettings,
        retry: RetryPolicy,
    ) -> Self {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            settings.base_url.trim_end_matches('/'),
            settings.model
        );
        Self {
            http,
            api_key: api_key.map(str::to_string),
            endpoint,
            retry,
            ready: false,
        }
    }

    /// Prepare the client for use. Returns `false` when no API key is set.
    ///
    /// Calls on a client that is not initialized are no-ops.
    pub fn initialize(&mut self) -> bool {
        self.ready = self.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if self.ready {
            info!(endpoint = %self.endpoint, "Gemini client initialized");
        } else {
            warn!("GEMINI_API_KEY is not set; summaries and translation are disabled");
        }
        self.ready
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// One request, no retries.
    async fn generate_once(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::config("Gemini API key missing"))?;

        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::api(SERVICE, status.as_u16(), truncate_for_log(&text, 300)));
        }

        let parsed: GenerateResponse = resp.json().await?;
        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(AppError::response(SERVICE, "no candidate text"));
        }
        Ok(text)
    }

    #[instrument(level = "info", skip_all, fields(operation = %operation))]
    async fn generate(&self, operation: &str, prompt: &str) -> Result<String> {
        let t0 = Instant::now();
        let res = self
            .retry
            .run(operation, || self.generate_once(prompt))
            .await
            .map_err(|e| e.into_inner());

        match &res {
            Ok(text) => debug!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                bytes = text.len(),
                "Gemini request succeeded"
            ),
            Err(e) => error!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                error = %e,
                "Gemini request failed"
            ),
        }
        res
    }
}

#[async_trait]
impl Summarizer for GeminiClient {
    #[instrument(level = "info", skip(self))]
    async fn summarize(&self, url: &str) -> String {
        if !self.ready {
            return String::new();
        }
        match self.generate("gemini.summarize", &summary_prompt(url)).await {
            Ok(text) => text.trim().to_string(),
            Err(_) => String::new(),
        }
    }
}

#[async_trait]
impl Translator for GeminiClient {
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    async fn translate_titles(&self, mut articles: Vec<Article>) -> Vec<Article> {
        if !self.ready || articles.is_empty() {
            return articles;
        }

        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
        let titles_json = match serde_json::to_string(&titles) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Could not encode titles; keeping originals");
                return articles;
            }
        };

        let reply = match self
            .generate("gemini.translate", &translation_prompt(&titles_json))
            .await
        {
            Ok(reply) => reply,
            Err(_) => {
                warn!("Title translation failed; keeping original titles");
                return articles;
            }
        };

        match parse_translation(&reply, articles.len()) {
            Some(translated) => {
                for (article, title) in articles.iter_mut().zip(translated) {
                    article.title = title;
                }
                info!(count = articles.len(), "Translated titles");
            }
            None => warn!("Unusable translation reply; keeping original titles"),
        }
        articles
    }
}
