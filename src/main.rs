use futures::future::join_all;
use pagewatch::check::CheckRunner;
use pagewatch::config::{AppConfig, load_config};
use pagewatch::fetcher::{CompositeFetcher, Fetcher};
use pagewatch::jobs::{CheckQueue, DispatchError};
use pagewatch::screenshot::{ChromiumCapturer, ScreenshotCapturer};
use pagewatch::storage::SqliteStorage;
use pagewatch::summary::{ChatBackend, LlmBackend, SummaryGenerator};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration from file
    let config: Arc<AppConfig> = match load_config("config.json") {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    if let Err(e) = fs::create_dir_all(&config.screenshot_dir) {
        error!("Failed to create screenshot directory: {}", e);
        return;
    }

    // Initialize storage (SQLite) with async access (wrapped in a Mutex)
    let storage = match SqliteStorage::new(&config.db_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    // Register configured targets; re-running with the same config is a
    // no-op thanks to the URL upsert.
    {
        let storage_guard = storage.lock().await;
        for target_cfg in &config.targets {
            if let Err(e) = storage_guard.upsert_target(
                &target_cfg.url,
                &target_cfg.name,
                target_cfg.tag.as_deref(),
            ) {
                warn!("Failed to register target {}: {:?}", target_cfg.url, e);
            }
        }
    }

    let fetcher: Arc<dyn Fetcher> =
        Arc::new(CompositeFetcher::new(config.browser_executable.clone()));
    let backend: Option<Arc<dyn LlmBackend>> = config
        .llm
        .as_ref()
        .map(|cfg| Arc::new(ChatBackend::new(cfg)) as Arc<dyn LlmBackend>);
    let summarizer = Arc::new(SummaryGenerator::new(backend, config.summary_quota));
    let capturer: Option<Arc<dyn ScreenshotCapturer>> = config
        .browser_executable
        .clone()
        .map(|exe| Arc::new(ChromiumCapturer::new(exe)) as Arc<dyn ScreenshotCapturer>);

    let runner = Arc::new(CheckRunner::new(
        storage.clone(),
        fetcher,
        summarizer,
        capturer,
        PathBuf::from(&config.screenshot_dir),
    ));
    let queue = CheckQueue::new(runner);

    info!("pagewatch started");

    // Main processing loop
    loop {
        let targets = {
            let storage_guard = storage.lock().await;
            match storage_guard.list_active_targets() {
                Ok(targets) => targets,
                Err(e) => {
                    error!("Failed to list targets: {:?}", e);
                    Vec::new()
                }
            }
        };
        info!("Targets to check: {}", targets.len());

        // Dispatch all targets concurrently
        let mut handles = Vec::new();
        for target in &targets {
            match queue.dispatch(target.id) {
                Ok(handle) => handles.push(handle),
                Err(DispatchError::AlreadyRunning(id)) => {
                    warn!("Skipping target {id}, previous check still running");
                }
            }
        }

        let outcomes = join_all(handles.into_iter().map(|h| h.wait())).await;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) if !outcome.success => {
                    warn!("Check failed: {}", outcome.message);
                }
                Ok(outcome) if outcome.has_changes => {
                    info!("{}", outcome.message);
                }
                Ok(_) => {}
                Err(e) => error!("Storage error during check: {e}"),
            }
        }

        info!(
            "Waiting for timer ({}s)...",
            config.check_interval_seconds
        );
        sleep(Duration::from_secs(config.check_interval_seconds)).await;
    }
}
