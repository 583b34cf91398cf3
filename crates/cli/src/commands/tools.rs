//! `sidekick tools`: List the tools the assistant can use.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let registry = sidekick_tools::default_registry(&config.tools)?;

    println!("🧰 Available tools ({})", registry.len());
    println!();
    for def in registry.definitions() {
        let summary = def.description.lines().next().unwrap_or_default();
        println!("  {:<24} {summary}", def.name);
    }

    let mut missing = Vec::new();
    if !config.tools.has_search() {
        missing.push("search (set SERPER_API_KEY)");
    }
    if !config.tools.has_push() {
        missing.push("send_push_notification (set PUSHOVER_TOKEN and PUSHOVER_USER)");
    }
    if !config.tools.enable_python {
        missing.push("python_repl (tools.enable_python = false)");
    }
    if !missing.is_empty() {
        println!();
        println!("  Not enabled:");
        for line in missing {
            println!("    - {line}");
        }
    }

    Ok(())
}
