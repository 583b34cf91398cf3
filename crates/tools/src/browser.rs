//! Browser tool: fetch a web page and return its title, text and links.
//!
//! Stateless: each call is an independent GET. There is no session,
//! clicking or JavaScript execution.

use async_trait::async_trait;
use scraper::{Html, Selector};
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};
use tracing::debug;

const MAX_LINKS: usize = 50;
const TEXT_WIDTH: usize = 100;

pub struct BrowserTool {
    client: reqwest::Client,
    max_chars: usize,
}

impl BrowserTool {
    pub fn new(client: reqwest::Client, max_chars: usize) -> Self {
        Self { client, max_chars }
    }
}

/// What the model gets back from one page visit.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PageSummary {
    pub url: String,
    pub title: String,
    pub text: String,
    pub links: Vec<PageLink>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

impl PageSummary {
    fn render(&self) -> String {
        let mut out = format!("Title: {}\nURL: {}\n\n{}", self.title, self.url, self.text);
        if !self.links.is_empty() {
            out.push_str("\n\nLinks:\n");
            for link in &self.links {
                out.push_str(&format!("- [{}]({})\n", link.text, link.href));
            }
        }
        out
    }
}

/// Parse fetched HTML. Relative links are resolved against `base`.
fn summarize(html: &str, base: &reqwest::Url, max_chars: usize) -> PageSummary {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let mut links = Vec::new();
    if let Ok(sel) = Selector::parse("a[href]") {
        for anchor in document.select(&sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            let text = anchor.text().collect::<String>();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            links.push(PageLink {
                text,
                href: resolved.to_string(),
            });
            if links.len() >= MAX_LINKS {
                break;
            }
        }
    }

    let text = html2text::from_read(html.as_bytes(), TEXT_WIDTH);
    let text = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    PageSummary {
        url: base.to_string(),
        title,
        text: truncate_chars(&text, max_chars),
        links,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n[truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "navigate_browser"
    }

    fn description(&self) -> &str {
        "Navigate to a URL and return the page title, its visible text and the hyperlinks on it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL to open"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw_url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        let url = reqwest::Url::parse(raw_url)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid URL '{raw_url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::InvalidArguments(format!(
                "Only http and https URLs are supported, got '{}'",
                url.scheme()
            )));
        }

        debug!(url = %url, "Navigating");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "navigate_browser".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        // Redirects may have moved us
        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "navigate_browser".into(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Ok(ToolResult::failed(format!(
                "Navigating to {final_url} returned status code {status}"
            )));
        }

        let summary = summarize(&html, &final_url, self.max_chars);
        let data = serde_json::to_value(&summary).ok();
        let mut result = ToolResult::ok(summary.render());
        result.data = data;
        Ok(result)
    }
}
