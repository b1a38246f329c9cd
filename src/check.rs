// One check cycle: fetch, compare against the chain tip, persist, screenshot.
use crate::diff::line::compute_diff;
use crate::fetcher::Fetcher;
use crate::fingerprint::fingerprint;
use crate::model::{CheckOutcome, PriceInfo, StorageError, Target};
use crate::normalizer::segment;
use crate::price::extract_price;
use crate::screenshot::{
    ScreenshotCapturer, baseline_screenshot_name, change_screenshot_name, history_screenshot_name,
};
use crate::storage::SqliteStorage;
use crate::storage::sqlite::NewSnapshot;
use crate::summary::{NO_CHANGES_SUMMARY, SummaryGenerator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Upper bound on a whole check, fetch included. The fetchers carry
/// their own shorter timeouts; this one catches everything else.
const CHECK_TIMEOUT: Duration = Duration::from_secs(90);

/// Where a target sits in its observation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// No baseline captured yet.
    New,
    /// Baseline exists, no change snapshots.
    Baselined,
    /// At least one change snapshot recorded.
    Tracking,
}

#[derive(Clone, Copy)]
enum ScreenshotSlot {
    Baseline { baseline_id: i64, history_id: i64 },
    Change { snapshot_id: i64, history_id: i64 },
}

pub struct CheckRunner {
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<dyn Fetcher>,
    summarizer: Arc<SummaryGenerator>,
    capturer: Option<Arc<dyn ScreenshotCapturer>>,
    screenshot_dir: PathBuf,
}

impl CheckRunner {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        fetcher: Arc<dyn Fetcher>,
        summarizer: Arc<SummaryGenerator>,
        capturer: Option<Arc<dyn ScreenshotCapturer>>,
        screenshot_dir: PathBuf,
    ) -> Self {
        Self {
            storage,
            fetcher,
            summarizer,
            capturer,
            screenshot_dir,
        }
    }

    pub async fn chain_state(&self, target_id: i64) -> Result<ChainState, StorageError> {
        let storage = self.storage.lock().await;
        if storage.get_baseline(target_id)?.is_none() {
            return Ok(ChainState::New);
        }
        if storage.latest_snapshot(target_id)?.is_none() {
            return Ok(ChainState::Baselined);
        }
        Ok(ChainState::Tracking)
    }

    /// Runs one check for the target. Fetch failures are recorded on the
    /// target and reported in the outcome; persisted observations never
    /// change on a failed fetch. Only storage errors propagate.
    pub async fn run_check(&self, target_id: i64) -> Result<CheckOutcome, StorageError> {
        let target = {
            let storage = self.storage.lock().await;
            storage.get_target(target_id)?
        };
        let Some(target) = target else {
            return Ok(CheckOutcome::failure("Target not found"));
        };

        info!("Checking {} ({})", target.name, target.url);

        let content = match timeout(CHECK_TIMEOUT, self.fetcher.fetch(&target.url)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                let message = e.to_string();
                warn!("Fetch failed for {}: {message}", target.url);
                let storage = self.storage.lock().await;
                storage.mark_target_error(target_id, &message)?;
                return Ok(CheckOutcome::failure(message));
            }
            Err(_) => {
                warn!("Check timed out for {}", target.url);
                let storage = self.storage.lock().await;
                storage.mark_target_error(target_id, "check timed out")?;
                return Ok(CheckOutcome::failure("Check timed out"));
            }
        };

        let segments = segment(&content, Some(&target.url));
        let content_hash = fingerprint(&segments.full_text);
        let price = extract_price(&content);

        let (baseline, latest) = {
            let storage = self.storage.lock().await;
            (
                storage.get_baseline(target_id)?,
                storage.latest_snapshot(target_id)?,
            )
        };

        let Some(baseline) = baseline else {
            return self.record_baseline(&target, &content, &content_hash, price).await;
        };

        // The previous observation is the chain tip: the latest change
        // snapshot, or the baseline while none exists.
        let (previous_content, previous_hash) = match &latest {
            Some(snapshot) => (
                snapshot.full_content.as_str(),
                snapshot.content_hash.as_str(),
            ),
            None => (
                baseline.full_content.as_str(),
                baseline.content_hash.as_str(),
            ),
        };

        let (diff, summary) = if previous_hash == content_hash {
            (None, NO_CHANGES_SUMMARY.to_string())
        } else {
            let previous_segments = segment(previous_content, Some(&target.url));
            let diff = compute_diff(Some(&previous_segments.body_text), &segments.body_text);
            let summary = self
                .summarizer
                .summarize(Some(previous_content), &content, diff.as_deref())
                .await;
            (diff, summary)
        };
        let has_changes = diff.is_some();

        let price_text = price.as_ref().map(|p| p.text.clone());
        let price_amount = price.as_ref().and_then(|p| p.amount).map(|a| a.to_string());
        let price_currency = price.as_ref().and_then(|p| p.currency.clone());

        let (snapshot_id, history_id, evicted) = {
            let mut storage = self.storage.lock().await;
            let snapshot = storage.create_snapshot(&NewSnapshot {
                target_id,
                predecessor_id: latest.as_ref().map(|s| s.id),
                full_content: &content,
                content_hash: &content_hash,
                diff: diff.as_deref(),
                summary: Some(&summary),
                price: price_text.as_deref(),
                price_amount: price_amount.as_deref(),
                price_currency: price_currency.as_deref(),
            })?;
            let (entry, evicted) = storage.create_history_entry(
                target_id,
                &content,
                &content_hash,
                Some(&summary),
                price_text.as_deref(),
                price_amount.as_deref(),
                price_currency.as_deref(),
            )?;
            storage.mark_target_checked(target_id)?;
            (snapshot.id, entry.id, evicted)
        };

        self.delete_artifacts(evicted);
        self.spawn_screenshot(
            &target.url,
            ScreenshotSlot::Change {
                snapshot_id,
                history_id,
            },
        );

        if has_changes {
            info!("Changes detected for {}", target.name);
        }

        Ok(CheckOutcome {
            success: true,
            message: if has_changes {
                "Changes detected".to_string()
            } else {
                "No changes detected".to_string()
            },
            has_changes,
            snapshot_id: Some(snapshot_id),
            is_baseline: false,
            price,
        })
    }

    async fn record_baseline(
        &self,
        target: &Target,
        content: &str,
        content_hash: &str,
        price: Option<PriceInfo>,
    ) -> Result<CheckOutcome, StorageError> {
        let price_text = price.as_ref().map(|p| p.text.clone());
        let price_amount = price.as_ref().and_then(|p| p.amount).map(|a| a.to_string());
        let price_currency = price.as_ref().and_then(|p| p.currency.clone());

        let (baseline_id, history_id, evicted) = {
            let mut storage = self.storage.lock().await;
            let baseline = storage.create_baseline(target.id, content, content_hash)?;
            let (entry, evicted) = storage.create_history_entry(
                target.id,
                content,
                content_hash,
                None,
                price_text.as_deref(),
                price_amount.as_deref(),
                price_currency.as_deref(),
            )?;
            storage.mark_target_checked(target.id)?;
            (baseline.id, entry.id, evicted)
        };

        self.delete_artifacts(evicted);
        self.spawn_screenshot(
            &target.url,
            ScreenshotSlot::Baseline {
                baseline_id,
                history_id,
            },
        );

        info!("Baseline captured for {}", target.name);
        Ok(CheckOutcome {
            success: true,
            message: "Baseline captured".to_string(),
            has_changes: false,
            snapshot_id: Some(baseline_id),
            is_baseline: true,
            price,
        })
    }

    /// Best-effort removal of screenshots whose history rows were evicted.
    fn delete_artifacts(&self, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        let dir = self.screenshot_dir.clone();
        tokio::spawn(async move {
            for name in names {
                let path = dir.join(&name);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to delete evicted screenshot {}: {e}", path.display());
                }
            }
        });
    }

    /// Captures asynchronously so the check result is not held up by the
    /// browser. The history entry gets its own copy of the image.
    fn spawn_screenshot(&self, url: &str, slot: ScreenshotSlot) {
        let Some(capturer) = self.capturer.clone() else {
            return;
        };
        let storage = self.storage.clone();
        let dir = self.screenshot_dir.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let (name, history_id) = match slot {
                ScreenshotSlot::Baseline {
                    baseline_id,
                    history_id,
                } => (baseline_screenshot_name(baseline_id), history_id),
                ScreenshotSlot::Change {
                    snapshot_id,
                    history_id,
                } => (change_screenshot_name(snapshot_id), history_id),
            };
            let path = dir.join(&name);
            if let Err(e) = capturer.capture(&url, &path).await {
                warn!("Screenshot capture failed for {url}: {e}");
                return;
            }

            let history_name = history_screenshot_name(history_id);
            if let Err(e) = tokio::fs::copy(&path, dir.join(&history_name)).await {
                warn!("Failed to copy history screenshot: {e}");
            }

            let storage = storage.lock().await;
            let result = match slot {
                ScreenshotSlot::Baseline { baseline_id, .. } => {
                    storage.update_baseline_screenshot(baseline_id, &name)
                }
                ScreenshotSlot::Change { snapshot_id, .. } => {
                    storage.update_snapshot_screenshot(snapshot_id, &name)
                }
            }
            .and_then(|()| storage.update_history_screenshot(history_id, &history_name));
            if let Err(e) = result {
                error!("Failed to record screenshot for {url}: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FetchError;
    use async_trait::async_trait;

    struct StubFetcher {
        reply: Result<String, ()>,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            match &self.reply {
                Ok(content) => Ok(content.clone()),
                Err(()) => Err(FetchError::Http("connection refused".into())),
            }
        }
    }

    fn runner(reply: Result<String, ()>) -> (CheckRunner, Arc<Mutex<SqliteStorage>>) {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let runner = CheckRunner::new(
            storage.clone(),
            Arc::new(StubFetcher { reply }),
            Arc::new(SummaryGenerator::new(None, 5)),
            None,
            std::env::temp_dir(),
        );
        (runner, storage)
    }

    #[tokio::test]
    async fn missing_target_is_a_failure_outcome() {
        let (runner, _) = runner(Ok("<html></html>".into()));
        let outcome = runner.run_check(42).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Target not found");
    }

    #[tokio::test]
    async fn fetch_failure_records_error_and_leaves_chain_untouched() {
        let (runner, storage) = runner(Err(()));
        let target_id = {
            let storage = storage.lock().await;
            storage.upsert_target("https://a.com", "A", None).unwrap().id
        };

        let outcome = runner.run_check(target_id).await.unwrap();
        assert!(!outcome.success);

        let storage = storage.lock().await;
        let target = storage.get_target(target_id).unwrap().unwrap();
        assert!(target.last_error.is_some());
        assert!(storage.get_baseline(target_id).unwrap().is_none());
        assert!(storage.latest_snapshot(target_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn first_check_captures_a_baseline() {
        let (runner, storage) = runner(Ok("<html><body><p>Hello</p></body></html>".into()));
        let target_id = {
            let storage = storage.lock().await;
            storage.upsert_target("https://a.com", "A", None).unwrap().id
        };

        assert_eq!(runner.chain_state(target_id).await.unwrap(), ChainState::New);
        let outcome = runner.run_check(target_id).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.is_baseline);
        assert!(!outcome.has_changes);
        assert_eq!(
            runner.chain_state(target_id).await.unwrap(),
            ChainState::Baselined
        );
    }
}
