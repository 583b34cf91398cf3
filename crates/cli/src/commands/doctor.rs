//! `sidekick doctor`: Diagnose system health.

use sidekick_config::AppConfig;
use sidekick_tools::Sandbox;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Sidekick Doctor - System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults - run `sidekick onboard`");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the config and re-run.");
            return Ok(());
        }
    };

    match Sandbox::new(&config.tools.sandbox_dir) {
        Ok(sandbox) => println!("  ✅ Sandbox ready: {}", sandbox.root().display()),
        Err(e) => {
            println!(
                "  ❌ Sandbox unusable ({}): {e}",
                config.tools.sandbox_dir.display()
            );
            issues += 1;
        }
    }

    if config.tools.enable_python {
        let python_check = tokio::process::Command::new(&config.tools.python_command)
            .arg("--version")
            .output()
            .await;
        match python_check {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout);
                println!("  ✅ Python available: {}", version.trim());
            }
            _ => {
                println!(
                    "  ⚠️  `{}` not found - python_repl calls will fail",
                    config.tools.python_command
                );
                issues += 1;
            }
        }
    }

    let optional = [
        ("Web search (SERPER_API_KEY)", config.tools.has_search()),
        ("Push notifications (PUSHOVER_*)", config.tools.has_push()),
    ];
    for (name, ok) in optional {
        if ok {
            println!("  ✅ {name} configured");
        } else {
            println!("  ℹ️  {name} not configured (optional)");
        }
    }

    match sidekick_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider reachable: {}", config.api_url),
            Ok(false) => {
                println!("  ⚠️  Provider answered but is not healthy: {}", config.api_url);
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider check failed: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e} - add api_key to config.toml or set OPENAI_API_KEY");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
