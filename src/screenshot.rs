// Full-page screenshot capture via a headless browser process.
use crate::model::CaptureError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra render budget after page load, in milliseconds.
const SETTLE_BUDGET_MS: u32 = 2000;

/// Deterministic artifact name for a baseline screenshot.
pub fn baseline_screenshot_name(baseline_id: i64) -> String {
    format!("baseline_{baseline_id}.png")
}

/// Deterministic artifact name for a change-snapshot screenshot.
pub fn change_screenshot_name(snapshot_id: i64) -> String {
    format!("change_{snapshot_id}.png")
}

/// Deterministic artifact name for a history-window screenshot. History
/// entries keep their own copy so window eviction can delete it without
/// touching the snapshot chain's artifacts.
pub fn history_screenshot_name(history_id: i64) -> String {
    format!("history_{history_id}.png")
}

#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    async fn capture(&self, url: &str, output_path: &Path) -> Result<PathBuf, CaptureError>;
}

pub struct ChromiumCapturer {
    executable: String,
}

impl ChromiumCapturer {
    pub fn new(executable: String) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl ScreenshotCapturer for ChromiumCapturer {
    async fn capture(&self, url: &str, output_path: &Path) -> Result<PathBuf, CaptureError> {
        info!("Taking screenshot of {url}");

        let output = timeout(
            CAPTURE_TIMEOUT,
            Command::new(&self.executable)
                .args([
                    "--headless=new",
                    "--disable-gpu",
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--window-size=1920,1080",
                    &format!("--virtual-time-budget={SETTLE_BUDGET_MS}"),
                    &format!("--screenshot={}", output_path.display()),
                ])
                .arg(url)
                .output(),
        )
        .await
        .map_err(|_| CaptureError::Timeout)?
        .map_err(|e| CaptureError::Process(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Process(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        if !output_path.exists() {
            return Err(CaptureError::Process("no screenshot file written".into()));
        }

        info!("Screenshot saved to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}
