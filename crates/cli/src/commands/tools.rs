//! `toolchat tools`: List the tool catalog.

use toolchat_config::AppConfig;
use toolchat_core::tool::Tool;
use toolchat_tools::load_catalog;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let catalog = load_catalog(&config.tools.catalog);

    println!("Tools ({})", catalog.len());
    println!();
    for tool in &catalog {
        println!("{}", describe(tool));
    }

    Ok(())
}

/// One catalog entry: status, id, name and the launch command line.
fn describe(tool: &Tool) -> String {
    let status = if tool.enabled { "on " } else { "off" };
    let launch = tool.launch_spec();
    let mut line = format!(
        "  [{status}] {:<20} {:<24} {} {}",
        tool.id,
        tool.name,
        launch.command,
        launch.args.join(" ")
    );
    if !tool.env.is_empty() {
        let keys: Vec<&str> = tool.env.keys().map(String::as_str).collect();
        line.push_str(&format!("  env: {}", keys.join(", ")));
    }
    line
}
