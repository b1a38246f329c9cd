// Assembles the full comparison view for one history entry.
use crate::diff::code::generate_code_diff;
use crate::diff::html::compute_html_diff;
use crate::diff::image::{ImageDiff, compute_image_diff};
use crate::diff::line::compute_diff;
use crate::diff::paragraph::generate_paragraph_diff;
use crate::model::{HistoryEntry, StorageError};
use crate::normalizer::segment;
use crate::storage::SqliteStorage;
use reqwest::Client;
use tokio::sync::Mutex;

/// One history entry compared against its predecessor in the window,
/// rendered at every diff granularity.
#[derive(Debug)]
pub struct HistoryView {
    pub entry: HistoryEntry,
    pub previous: Option<HistoryEntry>,
    /// Oldest retained entry for its target; nothing to compare against.
    pub is_initial: bool,
    pub line_diff: Option<String>,
    pub html_diff: Option<String>,
    pub paragraph_diff: Option<String>,
    pub code_diff: Option<String>,
    pub image_diff: ImageDiff,
    /// Rough magnitude of the change as a percentage, capped at 100.
    pub change_percent: Option<f64>,
}

pub async fn build_history_view(
    storage: &Mutex<SqliteStorage>,
    client: &Client,
    history_id: i64,
) -> Result<Option<HistoryView>, StorageError> {
    let (entry, previous, is_initial, url) = {
        let storage = storage.lock().await;
        let Some(entry) = storage.get_history_entry(history_id)? else {
            return Ok(None);
        };
        let url = storage.get_target(entry.target_id)?.map(|t| t.url);
        let is_initial = storage.is_oldest_history_entry(entry.target_id, history_id)?;
        let previous = storage.previous_history_entry(entry.target_id, history_id)?;
        (entry, previous, is_initial, url)
    };

    let Some(previous) = previous.filter(|_| !is_initial) else {
        return Ok(Some(HistoryView {
            entry,
            previous: None,
            is_initial: true,
            line_diff: None,
            html_diff: None,
            paragraph_diff: None,
            code_diff: None,
            image_diff: ImageDiff::default(),
            change_percent: None,
        }));
    };

    if previous.content_hash == entry.content_hash {
        return Ok(Some(HistoryView {
            entry,
            previous: Some(previous),
            is_initial: false,
            line_diff: None,
            html_diff: None,
            paragraph_diff: None,
            code_diff: None,
            image_diff: ImageDiff::default(),
            change_percent: Some(0.0),
        }));
    }

    let url = url.as_deref();
    let old_segments = segment(&previous.content, url);
    let new_segments = segment(&entry.content, url);

    let line_diff = compute_diff(Some(&old_segments.body_text), &new_segments.body_text);
    let paragraph_diff = generate_paragraph_diff(&previous.content, &entry.content, url);
    let code_diff = Some(generate_code_diff(&previous.content, &entry.content));
    let image_diff = compute_image_diff(&previous.content, &entry.content, url);
    let change_percent = Some(change_percent(&previous.content, &entry.content));

    // CSS download inside needs the network; degrades to unstyled markup.
    let html_diff = compute_html_diff(client, Some(&previous.content), &entry.content, url).await;

    Ok(Some(HistoryView {
        entry,
        previous: Some(previous),
        is_initial: false,
        line_diff,
        html_diff,
        paragraph_diff,
        code_diff,
        image_diff,
        change_percent,
    }))
}

/// Relative size delta of the raw captures, capped at 100.
fn change_percent(old_content: &str, new_content: &str) -> f64 {
    let old_len = old_content.chars().count();
    let new_len = new_content.chars().count();
    if old_len == 0 {
        return if new_len == 0 { 0.0 } else { 100.0 };
    }
    let delta = old_len.abs_diff(new_len) as f64;
    (delta / old_len as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const OLD: &str = "<html><body><p>Price: $10</p></body></html>";
    const NEW: &str = "<html><body><p>Price: $15</p></body></html>";

    async fn seeded() -> (Arc<Mutex<SqliteStorage>>, i64, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        // Unroutable target so CSS download fails fast instead of hanging.
        let target = storage
            .upsert_target("http://127.0.0.1:1/", "A", None)
            .unwrap();
        let (first, _) = storage
            .create_history_entry(target.id, OLD, "h1", None, None, None, None)
            .unwrap();
        let (second, _) = storage
            .create_history_entry(target.id, NEW, "h2", None, None, None, None)
            .unwrap();
        (Arc::new(Mutex::new(storage)), first.id, second.id)
    }

    #[tokio::test]
    async fn missing_entry_yields_none() {
        let (storage, _, _) = seeded().await;
        let view = build_history_view(&storage, &Client::new(), 999)
            .await
            .unwrap();
        assert!(view.is_none());
    }

    #[tokio::test]
    async fn oldest_entry_is_initial_with_no_diffs() {
        let (storage, first, _) = seeded().await;
        let view = build_history_view(&storage, &Client::new(), first)
            .await
            .unwrap()
            .unwrap();
        assert!(view.is_initial);
        assert!(view.previous.is_none());
        assert!(view.line_diff.is_none());
        assert!(view.change_percent.is_none());
    }

    #[tokio::test]
    async fn changed_entry_carries_all_granularities() {
        let (storage, _, second) = seeded().await;
        let view = build_history_view(&storage, &Client::new(), second)
            .await
            .unwrap()
            .unwrap();
        assert!(!view.is_initial);

        let line_diff = view.line_diff.unwrap();
        assert!(line_diff.contains("-Price: $10"));
        assert!(line_diff.contains("+Price: $15"));
        assert!(view.paragraph_diff.is_some());
        assert!(view.code_diff.unwrap().contains("Price: $15"));
        assert!(view.html_diff.is_some());
        assert!(view.image_diff.is_empty());
        assert_eq!(view.change_percent, Some(0.0));
    }

    #[tokio::test]
    async fn identical_hashes_short_circuit_to_no_change() {
        let mut raw = SqliteStorage::new_in_memory().unwrap();
        let target = raw.upsert_target("http://127.0.0.1:1/", "A", None).unwrap();
        raw.create_history_entry(target.id, OLD, "same", None, None, None, None)
            .unwrap();
        let (second, _) = raw
            .create_history_entry(target.id, OLD, "same", None, None, None, None)
            .unwrap();
        let storage = Mutex::new(raw);

        let view = build_history_view(&storage, &Client::new(), second.id)
            .await
            .unwrap()
            .unwrap();
        assert!(view.line_diff.is_none());
        assert_eq!(view.change_percent, Some(0.0));
    }

    #[test]
    fn change_percent_is_capped() {
        assert_eq!(change_percent("ab", "ab"), 0.0);
        assert_eq!(change_percent("", "anything"), 100.0);
        let grown = "x".repeat(500);
        assert_eq!(change_percent("x", &grown), 100.0);
    }
}
