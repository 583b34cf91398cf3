pub mod doctor;
pub mod gateway;
pub mod onboard;
pub mod run;
pub mod tools;

use sidekick_config::AppConfig;

/// Load the configuration or explain where it was expected.
pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Printed when no model provider can be built.
pub(crate) fn print_api_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    export SIDEKICK_API_KEY='sk-...'");
    eprintln!("    export OPENAI_API_KEY='sk-...'");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    eprintln!("  A local OpenAI-compatible server (api_url on localhost) needs no key.");
    eprintln!();
}
