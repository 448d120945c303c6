use falbridge::{logger, server, GatewayConfig, ModelRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init()?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = GatewayConfig::from_env();
    let registry = match ModelRegistry::from_config(&config) {
        Ok(registry) => registry,
        Err(e) => {
            log::error!("❌ Failed to build model registry: {}", e);
            return Err(e.into());
        }
    };

    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), &config);
    logger::log_config_info(&config, &registry);

    if config.access_key.is_none() || config.fal_api_key.is_none() {
        log::warn!("⚠️  Secrets missing; every request will be answered with a configuration error");
    }

    server::run(config, registry).await?;
    Ok(())
}
