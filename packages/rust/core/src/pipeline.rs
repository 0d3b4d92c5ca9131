//! Batch-scheduled discovery-scrape-summarize pipeline.
//!
//! The URL list from the mapper is partitioned into fixed-size batches.
//! Within a batch, one worker task runs per URL (scrape, then summarize),
//! capped by a semaphore; a worker's failure is logged and excluded without
//! failing the batch. Batches run strictly one after another with a cooldown
//! in between for provider rate limits. Final ordering is by mapper index,
//! never by completion order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use docbundle_firecrawl::FirecrawlClient;
use docbundle_shared::config::PipelineConfig;
use docbundle_shared::{DocbundleError, KnowledgeBundle, PageRecord, Result};
use docbundle_summarize::Summarizer;

use crate::bundle;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait BundleProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a page finishes (successfully or not).
    fn page_processed(&self, url: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BundleProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_processed(&self, _url: &str, _current: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full pipeline: map → batched scrape+summarize → aggregate.
///
/// The only aborting failures are a mapper failure and an empty URL list;
/// every per-URL failure is contained here and reflected solely in the
/// bundle's discovered/succeeded counts.
#[instrument(skip_all, fields(url = %source_url))]
pub async fn extract_knowledge(
    source_url: &str,
    firecrawl: Arc<FirecrawlClient>,
    summarizer: Arc<Summarizer>,
    settings: &PipelineConfig,
    progress: &dyn BundleProgress,
) -> Result<KnowledgeBundle> {
    progress.phase("Mapping site");
    let urls = firecrawl.map_site(source_url, settings.max_pages).await?;

    if urls.is_empty() {
        return Err(DocbundleError::NoUrlsFound {
            url: source_url.to_string(),
        });
    }

    let urls: Vec<String> = urls.into_iter().take(settings.max_pages).collect();
    let discovered = urls.len();

    let batch_size = settings.batch_size.max(1);
    let batch_count = urls.len().div_ceil(batch_size);
    let semaphore = Arc::new(Semaphore::new(settings.max_workers.max(1)));

    info!(
        urls = discovered,
        batch_size,
        batch_count,
        max_workers = settings.max_workers,
        "starting batched processing"
    );

    let mut records: Vec<PageRecord> = Vec::with_capacity(discovered);
    let mut failed = 0usize;
    let mut completed = 0usize;

    for (batch_no, batch) in urls.chunks(batch_size).enumerate() {
        progress.phase(&format!("Processing batch {}/{batch_count}", batch_no + 1));

        let mut handles = Vec::with_capacity(batch.len());

        for (offset, url) in batch.iter().enumerate() {
            let index = batch_no * batch_size + offset;
            let url = url.clone();
            let task_url = url.clone();
            let firecrawl = Arc::clone(&firecrawl);
            let summarizer = Arc::clone(&summarizer);
            let sem = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                process_url(&firecrawl, &summarizer, &task_url, index).await
            });
            handles.push((url, handle));
        }

        // A batch is done only when every one of its workers is done;
        // each worker contributes exactly one outcome.
        for (url, handle) in handles {
            completed += 1;
            match handle.await {
                Ok(Ok(record)) => {
                    progress.page_processed(&url, completed, discovered);
                    records.push(record);
                }
                Ok(Err(e)) => {
                    failed += 1;
                    progress.page_processed(&url, completed, discovered);
                    warn!(url = %url, error = %e, "page failed, excluding from bundle");
                }
                Err(e) => {
                    failed += 1;
                    progress.page_processed(&url, completed, discovered);
                    warn!(url = %url, error = %e, "worker panicked, excluding from bundle");
                }
            }
        }

        let more_remaining = (batch_no + 1) * batch_size < urls.len();
        if more_remaining && settings.batch_delay_ms > 0 {
            debug!(
                delay_ms = settings.batch_delay_ms,
                "cooling down between batches"
            );
            tokio::time::sleep(Duration::from_millis(settings.batch_delay_ms)).await;
        }
    }

    progress.phase("Building bundle");
    let bundle = bundle::build_bundle(source_url, records, discovered);

    info!(
        discovered,
        succeeded = bundle.page_count,
        failed,
        "knowledge bundle built"
    );

    Ok(bundle)
}

/// Process one URL: scrape, then summarize. Any failure along the way
/// fails this URL only.
async fn process_url(
    firecrawl: &FirecrawlClient,
    summarizer: &Summarizer,
    url: &str,
    index: usize,
) -> Result<PageRecord> {
    let page = firecrawl.scrape_page(url).await?;
    let summary = summarizer.summarize(url, &page.markdown).await?;

    Ok(PageRecord {
        url: page.url,
        title: summary.title,
        description: summary.description,
        markdown: page.markdown,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbundle_shared::RetryPolicy;
    use docbundle_shared::config::{FirecrawlConfig, OpenAiConfig};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_settings() -> PipelineConfig {
        PipelineConfig {
            max_pages: 10,
            batch_size: 2,
            max_workers: 2,
            batch_delay_ms: 0,
            content_limit: 4_000,
        }
    }

    fn test_clients(server_uri: &str) -> (Arc<FirecrawlClient>, Arc<Summarizer>) {
        let firecrawl_settings = FirecrawlConfig {
            base_url: server_uri.to_string(),
            ..FirecrawlConfig::default()
        };
        let openai_settings = OpenAiConfig {
            base_url: server_uri.to_string(),
            ..OpenAiConfig::default()
        };
        let firecrawl =
            FirecrawlClient::new(&firecrawl_settings, "test-key", RetryPolicy::immediate(2))
                .unwrap();
        let summarizer =
            Summarizer::new(&openai_settings, "test-key", 4_000, RetryPolicy::immediate(2))
                .unwrap();
        (Arc::new(firecrawl), Arc::new(summarizer))
    }

    async fn mount_map(server: &MockServer, links: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/map"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "links": links,
            })))
            .mount(server)
            .await;
    }

    async fn mount_scrape_ok(server: &MockServer, url: &str, markdown: &str) {
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .and(body_partial_json(json!({"url": url})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"markdown": markdown, "metadata": {}},
            })))
            .mount(server)
            .await;
    }

    async fn mount_summary_ok(server: &MockServer, url: &str, title: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains(url))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": format!(
                        r#"{{"title": "{title}", "description": "Description of {title} for testing"}}"#
                    ),
                }}],
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn partial_failure_keeps_order_and_counts() {
        let server = MockServer::start().await;

        mount_map(&server, &["https://a", "https://b", "https://c"]).await;
        mount_scrape_ok(&server, "https://a", "# A\n\nAlpha content.").await;
        mount_scrape_ok(&server, "https://c", "# C\n\nGamma content.").await;

        // "b" fails permanently at the scrape stage
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .and(body_partial_json(json!({"url": "https://b"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .expect(1)
            .mount(&server)
            .await;

        mount_summary_ok(&server, "https://a", "Alpha Page").await;
        mount_summary_ok(&server, "https://c", "Gamma Page").await;

        let (firecrawl, summarizer) = test_clients(&server.uri());
        let bundle = extract_knowledge(
            "https://docs.example.com",
            firecrawl,
            summarizer,
            &test_settings(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(bundle.page_count, 2);
        assert_eq!(bundle.meta.urls_discovered, 3);
        assert_eq!(bundle.meta.urls_succeeded, 2);

        // "a" (index 0) before "c" (index 2), "b" absent
        let entries: Vec<&str> = bundle
            .llms_txt
            .lines()
            .filter(|l| l.starts_with("- ["))
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("https://a"));
        assert!(entries[1].contains("https://c"));
        assert!(!bundle.llms_txt.contains("https://b"));
    }

    #[tokio::test]
    async fn empty_map_is_no_urls_found_not_network_error() {
        let server = MockServer::start().await;
        mount_map(&server, &[]).await;

        let (firecrawl, summarizer) = test_clients(&server.uri());
        let err = extract_knowledge(
            "https://docs.example.com",
            firecrawl,
            summarizer,
            &test_settings(),
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DocbundleError::NoUrlsFound { .. }));
    }

    #[tokio::test]
    async fn mapper_failure_aborts_pipeline() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/map"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (firecrawl, summarizer) = test_clients(&server.uri());
        let err = extract_knowledge(
            "https://docs.example.com",
            firecrawl,
            summarizer,
            &test_settings(),
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DocbundleError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn failing_batch_does_not_halt_later_batches() {
        let server = MockServer::start().await;

        // Batch 1 (a, b) fails entirely; batch 2 (c) succeeds.
        mount_map(&server, &["https://a", "https://b", "https://c"]).await;

        for failing in ["https://a", "https://b"] {
            Mock::given(method("POST"))
                .and(path("/scrape"))
                .and(body_partial_json(json!({"url": failing})))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
        }

        mount_scrape_ok(&server, "https://c", "# C\n\nGamma content.").await;
        mount_summary_ok(&server, "https://c", "Gamma Page").await;

        let (firecrawl, summarizer) = test_clients(&server.uri());
        let bundle = extract_knowledge(
            "https://docs.example.com",
            firecrawl,
            summarizer,
            &test_settings(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(bundle.page_count, 1);
        assert!(bundle.llms_txt.contains("https://c"));
        assert_eq!(bundle.meta.urls_discovered, 3);
    }

    #[tokio::test]
    async fn unparseable_summary_excludes_only_that_url_without_retry() {
        let server = MockServer::start().await;

        mount_map(&server, &["https://a", "https://b"]).await;
        mount_scrape_ok(&server, "https://a", "# A\n\nAlpha content.").await;
        mount_scrape_ok(&server, "https://b", "# B\n\nBeta content.").await;
        mount_summary_ok(&server, "https://a", "Alpha Page").await;

        // "b" gets prose instead of JSON; permanent, so exactly one attempt
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("https://b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Here you go!"}}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (firecrawl, summarizer) = test_clients(&server.uri());
        let bundle = extract_knowledge(
            "https://docs.example.com",
            firecrawl,
            summarizer,
            &test_settings(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(bundle.page_count, 1);
        assert!(bundle.llms_txt.contains("Alpha Page"));
        assert!(!bundle.llms_txt.contains("https://b"));
        assert_eq!(bundle.meta.urls_succeeded, 1);
    }

    #[tokio::test]
    async fn cooldown_runs_between_batches_but_not_after_the_last() {
        let server = MockServer::start().await;

        // 3 URLs at batch size 2 → two batches, so exactly one cooldown.
        mount_map(&server, &["https://a", "https://b", "https://c"]).await;
        for url in ["https://a", "https://b", "https://c"] {
            mount_scrape_ok(&server, url, "# Page\n\nBody.").await;
            mount_summary_ok(&server, url, "Some Page").await;
        }

        let settings = PipelineConfig {
            batch_delay_ms: 300,
            ..test_settings()
        };

        let (firecrawl, summarizer) = test_clients(&server.uri());
        let started = std::time::Instant::now();
        let bundle = extract_knowledge(
            "https://docs.example.com",
            firecrawl,
            summarizer,
            &settings,
            &SilentProgress,
        )
        .await
        .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(bundle.page_count, 3);
        // One sleep between the batches...
        assert!(
            elapsed >= Duration::from_millis(300),
            "expected inter-batch cooldown, run took {elapsed:?}"
        );
        // ...and none after the final batch.
        assert!(
            elapsed < Duration::from_millis(600),
            "expected a single cooldown, run took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn worker_cap_smaller_than_batch_still_processes_all() {
        let server = MockServer::start().await;

        let urls = ["https://p1", "https://p2", "https://p3", "https://p4"];
        mount_map(&server, &urls).await;
        for url in urls {
            mount_scrape_ok(&server, url, "# Page\n\nBody.").await;
            mount_summary_ok(&server, url, "Some Page").await;
        }

        let settings = PipelineConfig {
            max_pages: 10,
            batch_size: 4,
            max_workers: 1, // workers queue for permits
            batch_delay_ms: 0,
            content_limit: 4_000,
        };

        let (firecrawl, summarizer) = test_clients(&server.uri());
        let bundle = extract_knowledge(
            "https://docs.example.com",
            firecrawl,
            summarizer,
            &settings,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(bundle.page_count, 4);
        assert_eq!(bundle.meta.urls_succeeded, 4);
    }
}
