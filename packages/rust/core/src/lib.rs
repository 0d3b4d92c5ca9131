//! docbundle pipeline core: concurrent discovery-scrape-summarize scheduling
//! and deterministic bundle aggregation.

pub mod bundle;
pub mod pipeline;

pub use bundle::build_bundle;
pub use pipeline::{BundleProgress, SilentProgress, extract_knowledge};
