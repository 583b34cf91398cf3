//! Web search tool: Google results through the Serper API.

use async_trait::async_trait;
use serde::Deserialize;
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};
use tracing::debug;

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl WebSearchTool {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperResponse {
    #[serde(default)]
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    knowledge_graph: Option<KnowledgeGraph>,
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeGraph {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Render a Serper response as plain text: direct answer first, then hits.
fn format_results(response: &SerperResponse, limit: usize) -> String {
    let mut sections = Vec::new();

    if let Some(answer) = &response.answer_box
        && let Some(text) = answer.answer.as_ref().or(answer.snippet.as_ref())
    {
        sections.push(format!("Answer: {text}"));
    }

    if let Some(kg) = &response.knowledge_graph
        && let (Some(title), Some(description)) = (&kg.title, &kg.description)
    {
        sections.push(format!("{title}: {description}"));
    }

    for hit in response.organic.iter().take(limit) {
        sections.push(format!("{}\n{}\n{}", hit.title, hit.link, hit.snippet));
    }

    if sections.is_empty() {
        "No good search result found".into()
    } else {
        sections.join("\n\n")
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Use this tool when you want to get the results of an online web search."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let num_results = arguments["num_results"].as_u64().unwrap_or(5).clamp(1, 10) as usize;

        debug!(query = %query, "Searching the web");

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": query, "num": num_results }))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search".into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Ok(ToolResult::failed(format!(
                "Search failed with HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "search".into(),
                    reason: format!("unreadable response: {e}"),
                })?;
        let parsed: SerperResponse = serde_json::from_value(body.clone()).unwrap_or_default();

        Ok(ToolResult::ok(format_results(&parsed, num_results)).with_data(body))
    }
}
