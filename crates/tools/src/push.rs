//! Push notification tool: sends a message through Pushover.

use async_trait::async_trait;
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};
use tracing::info;

pub struct PushNotificationTool {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    user: String,
}

impl PushNotificationTool {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        token: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
            user: user.into(),
        }
    }
}

#[async_trait]
impl Tool for PushNotificationTool {
    fn name(&self) -> &str {
        "send_push_notification"
    }

    fn description(&self) -> &str {
        "Use this tool when you want to send a push notification to the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The notification text"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        info!(chars = text.len(), "Sending push notification");

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("token", self.token.as_str()),
                ("user", self.user.as_str()),
                ("message", text),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "send_push_notification".into(),
                reason: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(ToolResult::ok("success"))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Ok(ToolResult::failed(format!(
                "Push notification failed with HTTP {status}: {body}"
            )))
        }
    }
}
