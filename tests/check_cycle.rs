// End-to-end check cycles against an in-memory database.
use async_trait::async_trait;
use pagewatch::check::{ChainState, CheckRunner};
use pagewatch::fetcher::Fetcher;
use pagewatch::model::{FetchError, LlmError};
use pagewatch::storage::SqliteStorage;
use pagewatch::storage::sqlite::HISTORY_WINDOW;
use pagewatch::summary::{LIMIT_REACHED_SUMMARY, LlmBackend, NO_CHANGES_SUMMARY, SummaryGenerator};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serves a scripted sequence of pages; the last one repeats.
struct ScriptedFetcher {
    pages: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedFetcher {
    fn new(pages: &[&str]) -> Self {
        Self {
            pages: Mutex::new(pages.iter().map(|p| p.to_string()).collect()),
            last: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
        let mut pages = self.pages.lock().await;
        match pages.pop_front() {
            Some(page) => {
                *self.last.lock().await = page.clone();
                Ok(page)
            }
            None => Ok(self.last.lock().await.clone()),
        }
    }
}

struct EchoBackend;

#[async_trait]
impl LlmBackend for EchoBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok("Summary from the model.".to_string())
    }
}

fn page(body: &str) -> String {
    format!("<html><head><title>Shop</title></head><body><p>{body}</p></body></html>")
}

async fn setup(
    pages: &[&str],
    summarizer: SummaryGenerator,
) -> (CheckRunner, Arc<Mutex<SqliteStorage>>, i64) {
    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let target_id = {
        let storage = storage.lock().await;
        storage
            .upsert_target("https://shop.example.com/item", "Item", Some("shop"))
            .unwrap()
            .id
    };
    let runner = CheckRunner::new(
        storage.clone(),
        Arc::new(ScriptedFetcher::new(pages)),
        Arc::new(summarizer),
        None,
        std::env::temp_dir(),
    );
    (runner, storage, target_id)
}

#[tokio::test]
async fn first_check_baselines_and_extracts_price() {
    let (runner, storage, target_id) = setup(
        &[&page("Price: $10")],
        SummaryGenerator::new(None, 5),
    )
    .await;

    let outcome = runner.run_check(target_id).await.unwrap();
    assert!(outcome.success);
    assert!(outcome.is_baseline);
    let price = outcome.price.unwrap();
    assert_eq!(price.amount, Some(10.0));
    assert_eq!(price.currency.as_deref(), Some("$"));
    assert_eq!(price.text, "$10");

    let storage = storage.lock().await;
    let baseline = storage.get_baseline(target_id).unwrap().unwrap();
    assert!(!baseline.content_hash.is_empty());
    assert!(storage.latest_snapshot(target_id).unwrap().is_none());

    let history = storage.recent_history(target_id, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price.as_deref(), Some("$10"));
}

#[tokio::test]
async fn unchanged_page_records_snapshot_without_diff() {
    let content = page("Price: $10");
    let (runner, storage, target_id) =
        setup(&[&content, &content], SummaryGenerator::new(None, 5)).await;

    runner.run_check(target_id).await.unwrap();
    let outcome = runner.run_check(target_id).await.unwrap();
    assert!(outcome.success);
    assert!(!outcome.has_changes);
    assert!(!outcome.is_baseline);

    let storage = storage.lock().await;
    let snapshot = storage.latest_snapshot(target_id).unwrap().unwrap();
    assert!(snapshot.diff.is_none());
    assert_eq!(snapshot.summary.as_deref(), Some(NO_CHANGES_SUMMARY));
    assert!(snapshot.predecessor_id.is_none());
}

#[tokio::test]
async fn price_change_yields_diff_and_fallback_summary() {
    let (runner, storage, target_id) = setup(
        &[&page("Price: $10"), &page("Price: $15")],
        SummaryGenerator::new(None, 5),
    )
    .await;

    runner.run_check(target_id).await.unwrap();
    let outcome = runner.run_check(target_id).await.unwrap();
    assert!(outcome.has_changes);
    let price = outcome.price.unwrap();
    assert_eq!(price.amount, Some(15.0));

    let storage = storage.lock().await;
    let snapshot = storage.latest_snapshot(target_id).unwrap().unwrap();
    let diff = snapshot.diff.unwrap();
    assert!(diff.contains("-Price: $10"));
    assert!(diff.contains("+Price: $15"));
    let summary = snapshot.summary.unwrap();
    assert!(summary.contains("Price: $15"));
    assert_eq!(snapshot.price.as_deref(), Some("$15"));
    assert_eq!(snapshot.price_amount.as_deref(), Some("15"));
}

#[tokio::test]
async fn backend_summary_is_stored_when_quota_allows() {
    let (runner, storage, target_id) = setup(
        &[&page("old"), &page("new")],
        SummaryGenerator::new(Some(Arc::new(EchoBackend)), 5),
    )
    .await;

    runner.run_check(target_id).await.unwrap();
    runner.run_check(target_id).await.unwrap();

    let storage = storage.lock().await;
    let snapshot = storage.latest_snapshot(target_id).unwrap().unwrap();
    assert_eq!(snapshot.summary.as_deref(), Some("Summary from the model."));
}

#[tokio::test]
async fn exhausted_quota_stores_the_limit_notice_verbatim() {
    let (runner, storage, target_id) = setup(
        &[&page("old"), &page("new")],
        SummaryGenerator::new(Some(Arc::new(EchoBackend)), 0),
    )
    .await;

    runner.run_check(target_id).await.unwrap();
    runner.run_check(target_id).await.unwrap();

    let storage = storage.lock().await;
    let snapshot = storage.latest_snapshot(target_id).unwrap().unwrap();
    assert_eq!(snapshot.summary.as_deref(), Some(LIMIT_REACHED_SUMMARY));
}

#[tokio::test]
async fn snapshots_chain_back_to_the_first_observation() {
    let (runner, storage, target_id) = setup(
        &[&page("v0"), &page("v1"), &page("v2"), &page("v3")],
        SummaryGenerator::new(None, 5),
    )
    .await;

    for _ in 0..4 {
        let outcome = runner.run_check(target_id).await.unwrap();
        assert!(outcome.success);
    }
    assert_eq!(
        runner.chain_state(target_id).await.unwrap(),
        ChainState::Tracking
    );

    let storage = storage.lock().await;
    let mut current = storage.latest_snapshot(target_id).unwrap().unwrap();
    let mut hops = 0;
    while let Some(predecessor) = storage.get_predecessor(current.id).unwrap() {
        current = predecessor;
        hops += 1;
    }
    // Baseline plus three change snapshots: two predecessor hops.
    assert_eq!(hops, 2);
    assert!(current.predecessor_id.is_none());
    assert_eq!(current.full_content, page("v1"));
}

#[tokio::test]
async fn history_window_stays_capped_across_checks() {
    let pages: Vec<String> = (0..8).map(|i| page(&format!("v{i}"))).collect();
    let refs: Vec<&str> = pages.iter().map(|p| p.as_str()).collect();
    let (runner, storage, target_id) = setup(&refs, SummaryGenerator::new(None, 5)).await;

    for _ in 0..8 {
        runner.run_check(target_id).await.unwrap();
    }

    let storage = storage.lock().await;
    let history = storage.recent_history(target_id, 20).unwrap();
    assert_eq!(history.len(), HISTORY_WINDOW);
    assert!(history[0].content.contains("v7"));
    assert!(history[HISTORY_WINDOW - 1].content.contains("v3"));
}
