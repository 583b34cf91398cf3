//! Wikipedia tool: search and return the intro extract of the top pages.

use async_trait::async_trait;
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};

const MAX_PAGES: u64 = 3;
const MAX_EXTRACT_CHARS: usize = 4_000;

pub struct WikipediaTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WikipediaTool {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

/// Pull `(title, extract)` pairs out of a MediaWiki `generator=search`
/// response, in search-rank order.
fn extract_pages(body: &serde_json::Value) -> Vec<(String, String)> {
    let Some(pages) = body["query"]["pages"].as_object() else {
        return Vec::new();
    };

    let mut ranked: Vec<(u64, String, String)> = pages
        .values()
        .filter_map(|page| {
            let title = page["title"].as_str()?.to_string();
            let extract = page["extract"].as_str().unwrap_or_default().trim().to_string();
            let index = page["index"].as_u64().unwrap_or(u64::MAX);
            Some((index, title, extract))
        })
        .collect();
    ranked.sort_by_key(|(index, _, _)| *index);

    ranked
        .into_iter()
        .map(|(_, title, extract)| (title, truncate_chars(&extract, MAX_EXTRACT_CHARS)))
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Look up a topic on Wikipedia. Returns the summary of the best matching pages."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Topic to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let limit = MAX_PAGES.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "wikipedia".into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Ok(ToolResult::failed(format!(
                "Wikipedia request failed with HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "wikipedia".into(),
                    reason: format!("unreadable response: {e}"),
                })?;

        let pages = extract_pages(&body);
        if pages.is_empty() {
            return Ok(ToolResult::ok("No good Wikipedia Search Result was found"));
        }

        let output = pages
            .iter()
            .map(|(title, extract)| format!("Page: {title}\nSummary: {extract}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(ToolResult::ok(output))
    }
}
