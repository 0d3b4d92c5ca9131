//! Shared types, error model, retry policy, and configuration for docbundle.
//!
//! This crate is the foundation depended on by all other docbundle crates.
//! It provides:
//! - [`DocbundleError`] — the unified error type with transient/permanent classification
//! - Domain types ([`PageRecord`], [`ScrapedPage`], [`KnowledgeBundle`])
//! - Retry ([`RetryPolicy`], [`retry_with_backoff`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FirecrawlConfig, OpenAiConfig, PipelineConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_keys,
};
pub use error::{DocbundleError, Result};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use types::{BundleMeta, KnowledgeBundle, PageRecord, PageSummary, ScrapedPage};
