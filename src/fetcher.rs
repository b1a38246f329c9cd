// Page fetching: headless-browser primary with a plain HTTP fallback.
use crate::diff::truncate_chars;
use crate::model::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Captures are truncated to this many characters before hashing and
/// persistence.
pub const MAX_CONTENT_CHARS: usize = 500_000;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const BROWSER_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain GET fetch.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::InvalidStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(truncate_chars(&body, MAX_CONTENT_CHARS).to_string())
    }
}

/// Headless-browser fetch: renders the page and dumps the resulting DOM,
/// which also captures script-generated content.
pub struct BrowserFetcher {
    executable: String,
}

impl BrowserFetcher {
    pub fn new(executable: String) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let output = timeout(
            BROWSER_TIMEOUT,
            Command::new(&self.executable)
                .args([
                    "--headless=new",
                    "--disable-gpu",
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--dump-dom",
                ])
                .arg(url)
                .output(),
        )
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(|e| FetchError::Browser(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Browser(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let dom = String::from_utf8_lossy(&output.stdout);
        if dom.trim().is_empty() {
            return Err(FetchError::Browser("empty DOM dump".into()));
        }
        Ok(truncate_chars(&dom, MAX_CONTENT_CHARS).to_string())
    }
}

/// Primary browser strategy with HTTP GET as the degradation path. Not a
/// retry: the fallback is only consulted when the browser strategy fails
/// outright.
pub struct CompositeFetcher {
    browser: Option<BrowserFetcher>,
    http: HttpFetcher,
}

impl CompositeFetcher {
    pub fn new(browser_executable: Option<String>) -> Self {
        Self {
            browser: browser_executable.map(BrowserFetcher::new),
            http: HttpFetcher::new(),
        }
    }
}

#[async_trait]
impl Fetcher for CompositeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if let Some(browser) = &self.browser {
            match browser.fetch(url).await {
                Ok(content) => {
                    debug!("Browser fetch succeeded for {url} ({} chars)", content.len());
                    return Ok(content);
                }
                Err(e) => {
                    warn!("Browser fetch failed for {url}, falling back to HTTP: {e}");
                }
            }
        }
        self.http.fetch(url).await
    }
}
