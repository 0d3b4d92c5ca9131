//! Application configuration for docbundle.
//!
//! User config lives at `~/.docbundle/docbundle.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file — only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocbundleError, Result};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docbundle.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docbundle";

// ---------------------------------------------------------------------------
// Config structs (matching docbundle.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Firecrawl mapping/scraping provider settings.
    #[serde(default)]
    pub firecrawl: FirecrawlConfig,

    /// OpenAI-compatible summarization provider settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Pipeline tunables (batching, concurrency, truncation).
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Retry schedule for all external calls.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// `[firecrawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirecrawlConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_firecrawl_key_env")]
    pub api_key_env: String,

    /// Base URL of the Firecrawl v1 API.
    #[serde(default = "default_firecrawl_base_url")]
    pub base_url: String,

    /// Request timeout for `/map` calls, in seconds.
    #[serde(default = "default_map_timeout_secs")]
    pub map_timeout_secs: u64,

    /// Request timeout for `/scrape` calls, in seconds.
    #[serde(default = "default_scrape_timeout_secs")]
    pub scrape_timeout_secs: u64,

    /// Provider-side page render budget sent in the scrape request body, ms.
    #[serde(default = "default_scrape_wait_ms")]
    pub scrape_wait_ms: u64,
}

impl Default for FirecrawlConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_firecrawl_key_env(),
            base_url: default_firecrawl_base_url(),
            map_timeout_secs: default_map_timeout_secs(),
            scrape_timeout_secs: default_scrape_timeout_secs(),
            scrape_wait_ms: default_scrape_wait_ms(),
        }
    }
}

fn default_firecrawl_key_env() -> String {
    "FIRECRAWL_API_KEY".into()
}
fn default_firecrawl_base_url() -> String {
    "https://api.firecrawl.dev/v1".into()
}
fn default_map_timeout_secs() -> u64 {
    30
}
fn default_scrape_timeout_secs() -> u64 {
    60
}
fn default_scrape_wait_ms() -> u64 {
    30_000
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Base URL of the chat completions API.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model used for page summarization.
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Sampling temperature for summaries.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Request timeout in seconds.
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
            timeout_secs: default_openai_timeout_secs(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_openai_timeout_secs() -> u64 {
    30
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of pages to map and process.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// URLs per batch; batches run strictly one after another.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum concurrently-running workers within a batch.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Cooldown between batches, in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Page content is truncated to this many bytes before summarization.
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            batch_delay_ms: default_batch_delay_ms(),
            content_limit: default_content_limit(),
        }
    }
}

fn default_max_pages() -> usize {
    50
}
fn default_batch_size() -> usize {
    10
}
fn default_max_workers() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    1_000
}
fn default_content_limit() -> usize {
    4_000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docbundle/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocbundleError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docbundle/docbundle.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocbundleError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocbundleError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocbundleError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocbundleError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocbundleError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that both provider API key env vars are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    for (label, var_name) in [
        ("Firecrawl", &config.firecrawl.api_key_env),
        ("OpenAI", &config.openai.api_key_env),
    ] {
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => {}
            _ => {
                return Err(DocbundleError::config(format!(
                    "{label} API key not found. Set the {var_name} environment variable."
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("FIRECRAWL_API_KEY"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("batch_size"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.batch_size, 10);
        assert_eq!(parsed.pipeline.max_workers, 5);
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.openai.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[pipeline]
max_pages = 20
batch_size = 4

[firecrawl]
base_url = "http://localhost:4100/v1"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.max_pages, 20);
        assert_eq!(config.pipeline.batch_size, 4);
        // Untouched fields keep their defaults
        assert_eq!(config.pipeline.max_workers, 5);
        assert_eq!(config.firecrawl.base_url, "http://localhost:4100/v1");
        assert_eq!(config.firecrawl.api_key_env, "FIRECRAWL_API_KEY");
        assert_eq!(config.retry.base_delay_ms, 2_000);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.firecrawl.api_key_env = "DB_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_keys(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
