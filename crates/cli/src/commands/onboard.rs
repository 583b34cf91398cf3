//! `sidekick onboard`: First-time setup.

use sidekick_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🤝 Sidekick - First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = super::load_config()?;
    let sandbox = &config.tools.sandbox_dir;
    if !sandbox.exists() {
        std::fs::create_dir_all(sandbox)?;
        println!("✅ Created sandbox directory: {}", sandbox.display());
    } else {
        println!("  Sandbox directory exists: {}", sandbox.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Add api_key to {} (or set OPENAI_API_KEY)", config_path.display());
    println!("   2. Optional: SERPER_API_KEY for web search, PUSHOVER_TOKEN/PUSHOVER_USER for notifications");
    println!("   3. Run: sidekick gateway   (or: sidekick run -m \"...\")\n");

    Ok(())
}
