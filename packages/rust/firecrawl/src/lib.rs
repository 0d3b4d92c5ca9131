//! Firecrawl API client: site mapping and page scraping.
//!
//! Wraps the two endpoints the pipeline needs — `/map` (discover page URLs
//! for a documentation root) and `/scrape` (fetch one page as markdown).
//! Both go through the shared retry wrapper; HTTP 429/5xx and transport
//! errors are retried, while contract violations (`success: false`, missing
//! `data`, empty markdown) fail immediately.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use docbundle_shared::config::FirecrawlConfig;
use docbundle_shared::{DocbundleError, Result, RetryPolicy, ScrapedPage, retry_with_backoff};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("docbundle/", env!("CARGO_PKG_VERSION"));

/// Longest error-body snippet carried into an error message.
const MAX_ERROR_SNIPPET: usize = 200;

// ---------------------------------------------------------------------------
// Wire types (Firecrawl v1 contract)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MapRequest<'a> {
    url: &'a str,
    limit: usize,
    #[serde(rename = "includeSubdomains")]
    include_subdomains: bool,
    #[serde(rename = "ignoreSitemap")]
    ignore_sitemap: bool,
}

#[derive(Debug, Deserialize)]
struct MapResponse {
    success: bool,
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
    #[serde(rename = "onlyMainContent")]
    only_main_content: bool,
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// FirecrawlClient
// ---------------------------------------------------------------------------

/// HTTP client for the Firecrawl mapping/scraping provider.
pub struct FirecrawlClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    map_timeout: Duration,
    scrape_timeout: Duration,
    scrape_wait_ms: u64,
}

impl FirecrawlClient {
    /// Build a client from config and the API key resolved by the caller.
    pub fn new(settings: &FirecrawlConfig, api_key: &str, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| DocbundleError::config("Firecrawl API key contains invalid characters"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| DocbundleError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry,
            map_timeout: Duration::from_secs(settings.map_timeout_secs),
            scrape_timeout: Duration::from_secs(settings.scrape_timeout_secs),
            scrape_wait_ms: settings.scrape_wait_ms,
        })
    }

    /// Discover page URLs under `url`, at most `limit` of them.
    ///
    /// Returns a deduplicated list preserving the provider's order. An empty
    /// list is a valid outcome — the pipeline decides what that means.
    /// Transient failures are retried; exhaustion surfaces the last error.
    #[instrument(skip(self))]
    pub async fn map_site(&self, url: &str, limit: usize) -> Result<Vec<String>> {
        info!(url, limit, "mapping site");

        let response =
            retry_with_backoff(&self.retry, "map", || self.try_map(url, limit)).await?;

        if !response.success {
            return Err(DocbundleError::invalid_response(format!(
                "map reported success=false for {url}"
            )));
        }

        let mut seen = std::collections::HashSet::new();
        let mut links: Vec<String> = response
            .links
            .into_iter()
            .filter(|l| seen.insert(l.clone()))
            .collect();
        links.truncate(limit);

        info!(count = links.len(), "site mapped");
        Ok(links)
    }

    async fn try_map(&self, url: &str, limit: usize) -> Result<MapResponse> {
        let body = MapRequest {
            url,
            limit,
            include_subdomains: false,
            ignore_sitemap: false,
        };

        let response = self
            .client
            .post(format!("{}/map", self.base_url))
            .timeout(self.map_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| DocbundleError::Network(format!("map {url}: {e}")))?;

        parse_json(response, "map").await
    }

    /// Scrape one page as markdown.
    ///
    /// A response with `success: false`, no `data`, or empty markdown is a
    /// permanent failure for this URL — retrying would fetch the same thing.
    #[instrument(skip(self))]
    pub async fn scrape_page(&self, url: &str) -> Result<ScrapedPage> {
        debug!(url, "scraping page");

        let response =
            retry_with_backoff(&self.retry, "scrape", || self.try_scrape(url)).await?;

        if !response.success {
            return Err(DocbundleError::invalid_response(format!(
                "scrape reported success=false for {url}"
            )));
        }

        let data = response.data.ok_or_else(|| {
            DocbundleError::invalid_response(format!("scrape response missing data for {url}"))
        })?;

        if data.markdown.trim().is_empty() {
            warn!(url, "scrape returned empty markdown");
            return Err(DocbundleError::EmptyContent {
                url: url.to_string(),
            });
        }

        Ok(ScrapedPage {
            url: url.to_string(),
            markdown: data.markdown,
            metadata: data.metadata,
        })
    }

    async fn try_scrape(&self, url: &str) -> Result<ScrapeResponse> {
        let body = ScrapeRequest {
            url,
            formats: ["markdown"],
            only_main_content: true,
            timeout: self.scrape_wait_ms,
        };

        let response = self
            .client
            .post(format!("{}/scrape", self.base_url))
            .timeout(self.scrape_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| DocbundleError::Network(format!("scrape {url}: {e}")))?;

        parse_json(response, "scrape").await
    }
}

/// Classify the HTTP status, then decode the body into `T`.
/// Decode failures are permanent: the provider broke the contract.
async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| DocbundleError::Network(format!("{endpoint}: failed to read body: {e}")))?;

    if !status.is_success() {
        let snippet: String = text.chars().take(MAX_ERROR_SNIPPET).collect();
        return Err(DocbundleError::Api {
            status: status.as_u16(),
            message: format!("{endpoint}: {snippet}"),
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        let snippet: String = text.chars().take(MAX_ERROR_SNIPPET).collect();
        DocbundleError::invalid_response(format!("{endpoint}: {e} (got: {snippet})"))
    })
}
