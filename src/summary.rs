// Natural-language change summaries with a deterministic fallback.
use crate::config::LlmConfig;
use crate::diff::truncate_chars;
use crate::model::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

pub const NO_CHANGES_SUMMARY: &str = "No changes detected";
pub const LIMIT_REACHED_SUMMARY: &str =
    "Free tier limit reached (0 remaining). Subscribe for unlimited AI summaries.";
const FALLBACK_SUMMARY: &str = "Content changed";

/// Preview caps for the prompt, keeping it inside small-model budgets.
const CONTENT_PREVIEW: usize = 2000;
const DIFF_PREVIEW: usize = 3000;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// OpenAI-compatible chat-completions backend.
pub struct ChatBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ChatBackend {
    pub fn new(config: &LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build LLM HTTP client");
        Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl LlmBackend for ChatBackend {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::NoCredentials);
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: 150,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_else(|_| "unknown".into());
            return Err(LlmError::Api(format!("{status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(answer.trim().to_string())
    }
}

/// Per-process summary budget. Resets only on restart; callers treat it
/// as best-effort rate limiting.
#[derive(Debug)]
pub struct SummaryQuota {
    limit: u32,
    used: u32,
}

impl SummaryQuota {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Consumes one unit if available.
    pub fn try_consume(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }
}

pub struct SummaryGenerator {
    backend: Option<Arc<dyn LlmBackend>>,
    quota: Mutex<SummaryQuota>,
}

impl SummaryGenerator {
    pub fn new(backend: Option<Arc<dyn LlmBackend>>, quota: u32) -> Self {
        Self {
            backend,
            quota: Mutex::new(SummaryQuota::new(quota)),
        }
    }

    pub async fn quota_remaining(&self) -> u32 {
        self.quota.lock().await.remaining()
    }

    /// Turns a line diff into a summary. Without a diff this is the fixed
    /// no-changes notice; with an exhausted quota it is the fixed limit
    /// notice and the backend is never called.
    pub async fn summarize(
        &self,
        old_content: Option<&str>,
        new_content: &str,
        line_diff: Option<&str>,
    ) -> String {
        let Some(diff) = line_diff else {
            return NO_CHANGES_SUMMARY.to_string();
        };

        let Some(backend) = &self.backend else {
            return fallback_summary(diff);
        };

        {
            let mut quota = self.quota.lock().await;
            if !quota.try_consume() {
                return LIMIT_REACHED_SUMMARY.to_string();
            }
        }

        let prompt = build_prompt(old_content, new_content, diff);
        match backend.complete(&prompt).await {
            Ok(summary) if !summary.is_empty() => summary,
            Ok(_) => fallback_summary(diff),
            Err(e) => {
                warn!("Summary backend failed, using fallback: {e}");
                fallback_summary(diff)
            }
        }
    }
}

fn build_prompt(old_content: Option<&str>, new_content: &str, diff: &str) -> String {
    let old_preview = match old_content {
        Some(old) => preview(old, CONTENT_PREVIEW),
        None => "No previous content".to_string(),
    };
    let new_preview = preview(new_content, CONTENT_PREVIEW);

    format!(
        "You are analyzing website changes. Compare the PREVIOUS version and CURRENT version \
         of a webpage, then summarize what changed in 2-3 sentences. Include specific HTML \
         snippets or elements as proof of the changes. Format your response in markdown.\n\n\
         PREVIOUS VERSION:\n{old_preview}\n\n\
         CURRENT VERSION:\n{new_preview}\n\n\
         DIFF (for reference):\n{}\n\n\
         Summary of changes with proof (in markdown):",
        truncate_chars(diff, DIFF_PREVIEW)
    )
}

fn preview(content: &str, max: usize) -> String {
    if content.chars().count() > max {
        format!("{}...", truncate_chars(content, max))
    } else {
        content.to_string()
    }
}

/// Deterministic summary: up to 3 added/removed excerpts from the diff.
pub fn fallback_summary(diff: &str) -> String {
    let mut changes = Vec::new();
    for line in diff.lines() {
        if let Some(added) = line.strip_prefix('+') {
            if !line.starts_with("+++") {
                changes.push(format!("Added: {}", truncate_chars(added.trim(), 100)));
            }
        } else if let Some(removed) = line.strip_prefix('-') {
            if !line.starts_with("---") {
                changes.push(format!("Removed: {}", truncate_chars(removed.trim(), 100)));
            }
        }
        if changes.len() == 3 {
            break;
        }
    }

    if changes.is_empty() {
        FALLBACK_SUMMARY.to_string()
    } else {
        changes.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticBackend {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for StaticBackend {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(LlmError::Api("boom".into())),
            }
        }
    }

    const DIFF: &str = "--- previous\n+++ current\n@@ -1 +1 @@\n-Price: $10\n+Price: $15";

    #[tokio::test]
    async fn no_diff_is_no_changes() {
        let generator = SummaryGenerator::new(None, 5);
        assert_eq!(
            generator.summarize(None, "anything", None).await,
            NO_CHANGES_SUMMARY
        );
    }

    #[tokio::test]
    async fn without_backend_uses_fallback_without_consuming_quota() {
        let generator = SummaryGenerator::new(None, 5);
        let summary = generator.summarize(Some("a"), "b", Some(DIFF)).await;
        assert_eq!(summary, "Removed: Price: $10; Added: Price: $15");
        assert_eq!(generator.quota_remaining().await, 5);
    }

    #[tokio::test]
    async fn backend_reply_consumes_one_quota_unit() {
        let backend = Arc::new(StaticBackend {
            reply: Ok("The price went up.".into()),
            calls: AtomicUsize::new(0),
        });
        let generator = SummaryGenerator::new(Some(backend.clone()), 5);
        let summary = generator.summarize(Some("a"), "b", Some(DIFF)).await;
        assert_eq!(summary, "The price went up.");
        assert_eq!(generator.quota_remaining().await, 4);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_quota_returns_fixed_notice_without_backend_call() {
        let backend = Arc::new(StaticBackend {
            reply: Ok("unused".into()),
            calls: AtomicUsize::new(0),
        });
        let generator = SummaryGenerator::new(Some(backend.clone()), 0);
        let summary = generator.summarize(Some("a"), "b", Some(DIFF)).await;
        assert_eq!(summary, LIMIT_REACHED_SUMMARY);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.quota_remaining().await, 0);
    }

    #[tokio::test]
    async fn backend_failure_degrades_to_fallback() {
        let backend = Arc::new(StaticBackend {
            reply: Err(()),
            calls: AtomicUsize::new(0),
        });
        let generator = SummaryGenerator::new(Some(backend), 5);
        let summary = generator.summarize(Some("a"), "b", Some(DIFF)).await;
        assert!(summary.contains("Price: $15"));
    }

    #[test]
    fn fallback_without_change_lines_is_generic() {
        assert_eq!(fallback_summary("--- previous\n+++ current"), FALLBACK_SUMMARY);
    }

    #[test]
    fn fallback_caps_excerpts_at_three() {
        let diff = "+one\n+two\n+three\n+four";
        let summary = fallback_summary(diff);
        assert_eq!(summary.matches("Added:").count(), 3);
        assert!(!summary.contains("four"));
    }
}
