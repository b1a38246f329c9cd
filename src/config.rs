use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
}

fn default_llm_model() -> String {
    "llama3.1-8b".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.cerebras.ai/v1".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,
    pub check_interval_seconds: u64,
    /// Headless browser binary for the primary fetch strategy and for
    /// screenshots. Plain HTTP is used when absent.
    #[serde(default)]
    pub browser_executable: Option<String>,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default = "default_summary_quota")]
    pub summary_quota: u32,
    pub targets: Vec<TargetConfig>,
}

fn default_db_path() -> String {
    "data.db".to_string()
}

fn default_screenshot_dir() -> String {
    "screenshots".to_string()
}

fn default_summary_quota() -> u32 {
    5
}

pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
