//! Core domain types for docbundle knowledge bundles.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ScrapedPage
// ---------------------------------------------------------------------------

/// Raw result of scraping one URL. Ephemeral: consumed by the summarizer
/// and dropped once a [`PageRecord`] is built (or the URL fails).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPage {
    /// The scraped URL.
    pub url: String,
    /// Page content as markdown.
    pub markdown: String,
    /// Provider metadata (title, language, status code, ...), passed through opaquely.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// PageSummary
// ---------------------------------------------------------------------------

/// Model-generated summary of a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// Short title (3-4 words).
    pub title: String,
    /// One-line description (9-10 words).
    pub description: String,
}

// ---------------------------------------------------------------------------
// PageRecord
// ---------------------------------------------------------------------------

/// The durable per-page unit: created only when fetch AND summarize both
/// succeed, immutable afterwards. `index` is the URL's position in the
/// mapper's output and is the sole ordering key for the final documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// Original page URL.
    pub url: String,
    /// Summarized title.
    pub title: String,
    /// Summarized description.
    pub description: String,
    /// Full page content as markdown.
    pub markdown: String,
    /// Position in the mapper's URL list.
    pub index: usize,
}

// ---------------------------------------------------------------------------
// KnowledgeBundle
// ---------------------------------------------------------------------------

/// Discovery/success counts recorded alongside the bundle, so partial
/// data loss is observable rather than hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    /// URLs returned by the mapper (after dedup and limit).
    pub urls_discovered: usize,
    /// URLs that yielded a page record.
    pub urls_succeeded: usize,
}

/// The terminal artifact of one pipeline run: the indexed summary document
/// and the full-text concatenation. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBundle {
    /// Index document: one `- [title](url): description` line per page.
    pub llms_txt: String,
    /// Full-text document: all page content, separator markers stripped.
    pub llms_full_txt: String,
    /// Root URL the bundle was built from.
    pub source_url: String,
    /// Number of page records in the bundle.
    pub page_count: usize,
    /// Discovery/success counts.
    pub meta: BundleMeta,
}
