//! Provider construction from configuration.

use crate::openai_compat::OpenAiCompatProvider;
use sidekick_config::AppConfig;
use sidekick_core::error::ProviderError;
use sidekick_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Build the provider shared by the worker and the evaluator.
///
/// A missing API key is only accepted for local endpoints.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let base_url = resolve_base_url(&config.provider, &config.api_url);

    let api_key = match (&config.api_key, is_local(&base_url)) {
        (Some(key), _) => key.clone(),
        (None, true) => config.provider.clone(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{}'; set SIDEKICK_API_KEY or OPENAI_API_KEY",
                config.provider
            )));
        }
    };

    Ok(Arc::new(OpenAiCompatProvider::with_timeout(
        &config.provider,
        base_url,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    )))
}

/// An explicitly configured URL wins; otherwise well-known providers get
/// their public endpoint.
fn resolve_base_url(provider: &str, api_url: &str) -> String {
    if api_url != OPENAI_BASE_URL {
        return api_url.to_string();
    }
    default_base_url(provider).unwrap_or_else(|| api_url.to_string())
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<String> {
    let url = match provider_name {
        "openai" => OPENAI_BASE_URL,
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        _ => return None,
    };
    Some(url.to_string())
}

fn is_local(base_url: &str) -> bool {
    base_url.contains("://localhost") || base_url.contains("://127.0.0.1")
}
