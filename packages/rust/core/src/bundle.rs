//! Aggregation of page records into the final knowledge bundle.
//!
//! Pure, deterministic transformation: records are sorted by their original
//! mapper index, never by completion order. The full-text document is built
//! with internal page-separator markers so concatenation boundaries stay
//! programmatically detectable during construction; the markers are stripped
//! before the bundle is handed to the caller.

use regex::Regex;

use docbundle_shared::{BundleMeta, KnowledgeBundle, PageRecord};

/// Matches internal page-separator markers plus their trailing newline.
const SEPARATOR_PATTERN: &str = r"<\|docbundle-page-\d+-llmstxt\|>\n";

/// Marker placed before each page in the full-text document (1-based).
fn page_separator(n: usize) -> String {
    format!("<|docbundle-page-{n}-llmstxt|>")
}

/// Strip all page-separator markers from the assembled full text.
fn strip_page_separators(text: &str) -> String {
    let re = Regex::new(SEPARATOR_PATTERN).expect("separator pattern is valid");
    re.replace_all(text, "").into_owned()
}

/// Build the knowledge bundle from the (possibly unordered) successful
/// page records and the discovery count.
pub fn build_bundle(
    source_url: &str,
    mut records: Vec<PageRecord>,
    urls_discovered: usize,
) -> KnowledgeBundle {
    records.sort_by_key(|r| r.index);

    let mut llms_txt = format!("# {source_url} llms.txt\n\n");
    let mut full_text = format!("# {source_url} llms-full.txt\n\n");

    for (n, record) in records.iter().enumerate() {
        llms_txt.push_str(&format!(
            "- [{}]({}): {}\n",
            record.title, record.url, record.description
        ));
        full_text.push_str(&format!(
            "{}\n## {}\n{}\n\n",
            page_separator(n + 1),
            record.title,
            record.markdown
        ));
    }

    let page_count = records.len();

    KnowledgeBundle {
        llms_txt,
        llms_full_txt: strip_page_separators(&full_text),
        source_url: source_url.to_string(),
        page_count,
        meta: BundleMeta {
            urls_discovered,
            urls_succeeded: page_count,
        },
    }
}
