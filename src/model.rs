// Core structs: Target, snapshots, history entries, check outcomes.
use chrono::{DateTime, Utc};

/// A monitored resource.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub tag: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// First captured observation for a target. Immutable except for the
/// screenshot backfill.
#[derive(Debug, Clone)]
pub struct BaselineSnapshot {
    pub id: i64,
    pub target_id: i64,
    pub full_content: String,
    pub content_hash: String,
    pub screenshot: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A later observation, diffed against its predecessor. `predecessor_id`
/// is None for the first change snapshot (its logical predecessor is the
/// baseline).
#[derive(Debug, Clone)]
pub struct ChangeSnapshot {
    pub id: i64,
    pub target_id: i64,
    pub predecessor_id: Option<i64>,
    pub full_content: String,
    pub content_hash: String,
    pub diff: Option<String>,
    pub summary: Option<String>,
    pub price: Option<String>,
    pub price_amount: Option<String>,
    pub price_currency: Option<String>,
    pub screenshot: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Entry of the bounded per-target history window. Pruned independently
/// of the change-snapshot chain.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: i64,
    pub target_id: i64,
    pub content: String,
    pub content_hash: String,
    pub summary: Option<String>,
    pub price: Option<String>,
    pub price_amount: Option<String>,
    pub price_currency: Option<String>,
    pub screenshot: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Best-guess price pulled out of raw page content.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceInfo {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub raw: Option<String>,
    pub text: String,
}

/// Structured result of one check cycle. Fetch failures land here with
/// `success == false`; only persistence failures escape as errors.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub success: bool,
    pub message: String,
    pub has_changes: bool,
    pub snapshot_id: Option<i64>,
    pub is_baseline: bool,
    pub price: Option<PriceInfo>,
}

impl CheckOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            has_changes: false,
            snapshot_id: None,
            is_baseline: false,
            price: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(String),
    #[error("fetch timed out")]
    Timeout,
    #[error("unexpected status: {0}")]
    InvalidStatus(u16),
    #[error("browser fetch failed: {0}")]
    Browser(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("not found")]
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// No api key configured; not a transient failure.
    #[error("no credentials configured")]
    NoCredentials,
    /// Transient backend failure (network, quota, 5xx).
    #[error("llm api error: {0}")]
    Api(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("screenshot process failed: {0}")]
    Process(String),
    #[error("screenshot timed out")]
    Timeout,
}
