//! Page summarization via an OpenAI-compatible chat completions API.
//!
//! Given a URL and its markdown content, asks the model for a short title
//! and one-line description, constrained to JSON output. Parsing is strict:
//! if the model's reply is not a JSON object with both string fields, the
//! item fails permanently — we never invent a partial summary.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use docbundle_shared::config::OpenAiConfig;
use docbundle_shared::{DocbundleError, PageSummary, Result, RetryPolicy, retry_with_backoff};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("docbundle/", env!("CARGO_PKG_VERSION"));

/// Token budget for the summary completion.
const MAX_COMPLETION_TOKENS: u32 = 100;

/// Longest error-body snippet carried into an error message.
const MAX_ERROR_SNIPPET: usize = 200;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that generates concise titles and descriptions for web pages.";

// ---------------------------------------------------------------------------
// Wire types (chat completions contract)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Client for the summarization model provider.
pub struct Summarizer {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f64,
    timeout: Duration,
    content_limit: usize,
    retry: RetryPolicy,
}

impl Summarizer {
    /// Build a summarizer from config and the API key resolved by the caller.
    pub fn new(
        settings: &OpenAiConfig,
        api_key: &str,
        content_limit: usize,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| DocbundleError::config("OpenAI API key contains invalid characters"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| DocbundleError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
            content_limit,
            retry,
        })
    }

    /// Produce a title/description pair for one page.
    ///
    /// Content is truncated to the configured limit before submission.
    /// Transient API failures are retried; an unparseable model reply is a
    /// permanent failure for this URL.
    #[instrument(skip(self, markdown))]
    pub async fn summarize(&self, url: &str, markdown: &str) -> Result<PageSummary> {
        debug!(url, content_len = markdown.len(), "summarizing page");

        let prompt = build_prompt(url, truncate_utf8(markdown, self.content_limit));

        let response =
            retry_with_backoff(&self.retry, "summarize", || self.try_complete(&prompt)).await?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| {
                DocbundleError::invalid_response(format!("no completion choices for {url}"))
            })?;

        parse_summary(content, url)
    }

    async fn try_complete(&self, prompt: &str) -> Result<ChatResponse> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: self.temperature,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| DocbundleError::Network(format!("summarize: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DocbundleError::Network(format!("summarize: failed to read body: {e}")))?;

        if !status.is_success() {
            let snippet: String = text.chars().take(MAX_ERROR_SNIPPET).collect();
            return Err(DocbundleError::Api {
                status: status.as_u16(),
                message: format!("summarize: {snippet}"),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            let snippet: String = text.chars().take(MAX_ERROR_SNIPPET).collect();
            DocbundleError::invalid_response(format!("summarize: {e} (got: {snippet})"))
        })
    }
}

/// Build the user prompt for one page.
fn build_prompt(url: &str, content: &str) -> String {
    format!(
        "Generate a 9-10 word description and a 3-4 word title of the entire page \
         based on ALL the content one will find on the page for this url: {url}. \
         This will help in a user finding the page for its intended purpose.\n\n\
         Return the response in JSON format:\n\
         {{\n    \"title\": \"3-4 word title\",\n    \"description\": \"9-10 word description\"\n}}\n\n\
         Page content:\n{content}"
    )
}

/// Parse the model's JSON reply into a [`PageSummary`].
///
/// Both fields must be present, be strings, and be non-empty. Anything else
/// is a contract violation and fails the item without retry.
fn parse_summary(content: &str, url: &str) -> Result<PageSummary> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| {
        DocbundleError::invalid_response(format!("summary for {url} is not valid JSON: {e}"))
    })?;

    let title = value.get("title").and_then(|v| v.as_str()).unwrap_or("");
    let description = value
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    if title.is_empty() || description.is_empty() {
        return Err(DocbundleError::invalid_response(format!(
            "summary for {url} missing title or description"
        )));
    }

    Ok(PageSummary {
        title: title.to_string(),
        description: description.to_string(),
    })
}

/// Truncate to at most `max_bytes`, backing up to a char boundary.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_summarizer(base_url: &str) -> Summarizer {
        let settings = OpenAiConfig {
            base_url: base_url.to_string(),
            ..OpenAiConfig::default()
        };
        Summarizer::new(&settings, "test-key", 4_000, RetryPolicy::immediate(3)).unwrap()
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn summarize_parses_title_and_description() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("https://docs.example.com/guide"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                r#"{"title": "Guide Overview", "description": "How to get started with the example documentation site"}"#,
            )))
            .mount(&server)
            .await;

        let summarizer = test_summarizer(&server.uri());
        let summary = summarizer
            .summarize("https://docs.example.com/guide", "# Guide\n\nWelcome.")
            .await
            .unwrap();
        assert_eq!(summary.title, "Guide Overview");
        assert_eq!(
            summary.description,
            "How to get started with the example documentation site"
        );
    }

    #[tokio::test]
    async fn unparseable_reply_is_permanent_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("Sure! Here is a title: Guide")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let summarizer = test_summarizer(&server.uri());
        let err = summarizer.summarize("https://a", "# A").await.unwrap_err();
        assert!(matches!(err, DocbundleError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn missing_description_is_permanent_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                r#"{"title": "Guide Overview"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let summarizer = test_summarizer(&server.uri());
        let err = summarizer.summarize("https://a", "# A").await.unwrap_err();
        assert!(matches!(err, DocbundleError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                r#"{"title": "API Reference", "description": "Complete reference for every endpoint in the public API"}"#,
            )))
            .mount(&server)
            .await;

        let summarizer = test_summarizer(&server.uri());
        let summary = summarizer.summarize("https://a", "# A").await.unwrap();
        assert_eq!(summary.title, "API Reference");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // 'é' is two bytes in UTF-8; cutting mid-char must back up
        let s = "ééééé";
        let t = truncate_utf8(s, 5);
        assert_eq!(t, "éé");

        assert_eq!(truncate_utf8("short", 100), "short");
        assert_eq!(truncate_utf8("abcdef", 3), "abc");
    }

    #[test]
    fn prompt_mentions_url_and_content() {
        let prompt = build_prompt("https://a/b", "page body");
        assert!(prompt.contains("https://a/b"));
        assert!(prompt.contains("page body"));
        assert!(prompt.contains("JSON"));
    }
}
