//! `sidekick gateway`: Start the chat web interface.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🤝 Sidekick Gateway");
    println!("   Chat:    http://{}:{}/", config.gateway.host, config.gateway.port);
    println!("   Model:   {}", config.worker_model);
    println!("   Sandbox: {}", config.tools.sandbox_dir.display());

    if let Err(e) = sidekick_gateway::start(config).await {
        if matches!(
            e,
            sidekick_gateway::GatewayError::Provider(
                sidekick_core::error::ProviderError::NotConfigured(_)
            )
        ) {
            super::print_api_key_help();
        }
        return Err(e.into());
    }

    Ok(())
}
