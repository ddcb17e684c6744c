//! `toolchat config`: Configuration management commands.

use toolchat_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");
            if !config.has_api_key() {
                println!("   Warning: no API key set (set ANTHROPIC_API_KEY)");
            }
            let enabled = config.tools.catalog.iter().filter(|t| t.enabled).count();
            println!();
            println!("   Model:     {}", config.default_model);
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!("   Overrides: {} tool(s), {enabled} enabled", config.tools.catalog.len());
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

/// The API key and every tool environment value are replaced.
fn redacted(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for tool in &mut config.tools.catalog {
        for value in tool.env.values_mut() {
            *value = REDACTED.into();
        }
    }
    config
}
