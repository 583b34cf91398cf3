//! Built-in tool implementations for Sidekick.
//!
//! Tools give the worker the ability to act: manage files in the sandbox,
//! search the web and Wikipedia, read web pages, send push notifications
//! and run Python.

pub mod browser;
pub mod file_list;
pub mod file_manage;
pub mod file_read;
pub mod file_write;
pub mod push;
pub mod python_repl;
pub mod sandbox;
pub mod web_search;
pub mod wikipedia;

use sidekick_config::ToolsConfig;
use sidekick_core::error::ToolError;
use sidekick_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use sandbox::Sandbox;

const USER_AGENT: &str = concat!("sidekick/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Create the tool registry described by the configuration.
///
/// File tools are always present. Search and push notifications are only
/// registered when their credentials are configured, and `python_repl`
/// only when enabled.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let sandbox = Sandbox::new(&config.sandbox_dir).map_err(|e| {
        ToolError::NotConfigured(format!(
            "cannot open sandbox '{}': {e}",
            config.sandbox_dir.display()
        ))
    })?;
    let sandbox = Arc::new(sandbox);
    let client = http_client()?;

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(file_read::ReadFileTool::new(sandbox.clone())));
    registry.register(Box::new(file_write::WriteFileTool::new(sandbox.clone())));
    registry.register(Box::new(file_list::ListDirectoryTool::new(sandbox.clone())));
    registry.register(Box::new(file_list::FileSearchTool::new(sandbox.clone())));
    registry.register(Box::new(file_manage::CopyFileTool::new(sandbox.clone())));
    registry.register(Box::new(file_manage::MoveFileTool::new(sandbox.clone())));
    registry.register(Box::new(file_manage::DeleteFileTool::new(sandbox.clone())));

    registry.register(Box::new(wikipedia::WikipediaTool::new(
        client.clone(),
        &config.wikipedia_url,
    )));
    registry.register(Box::new(browser::BrowserTool::new(
        client.clone(),
        config.max_page_chars,
    )));

    if let Some(key) = &config.serper_api_key {
        registry.register(Box::new(web_search::WebSearchTool::new(
            client.clone(),
            &config.serper_url,
            key,
        )));
    }

    if let (Some(token), Some(user)) = (&config.pushover_token, &config.pushover_user) {
        registry.register(Box::new(push::PushNotificationTool::new(
            client.clone(),
            &config.pushover_url,
            token,
            user,
        )));
    }

    if config.enable_python {
        registry.register(Box::new(python_repl::PythonReplTool::new(
            &config.python_command,
            sandbox.root().to_path_buf(),
            Duration::from_secs(config.python_timeout_secs),
        )));
    }

    info!(
        tools = registry.len(),
        sandbox = %sandbox.root().display(),
        "Tool registry ready"
    );
    Ok(registry)
}

fn http_client() -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| ToolError::NotConfigured(format!("HTTP client: {e}")))
}
