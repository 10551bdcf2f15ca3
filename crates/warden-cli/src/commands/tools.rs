//! Tools command - print the catalogue.

use std::path::Path;

use colored::Colorize;
use warden_config::Config;
use warden_gateway::config_bridge;

use crate::theme::Theme;

/// Print every configured tool in registration order.
pub(crate) fn list_tools(config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load(config_path)?.config;
    let tools = config_bridge::tools_from_config(&cfg)?;

    if json {
        let descriptors: Vec<_> = tools.iter().map(|tool| tool.descriptor()).collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    if tools.is_empty() {
        println!("{}", Theme::info("No tools configured"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Tools"));
    println!(
        "{:<22} {:>8} {:<10} {}",
        "NAME".dimmed(),
        "TIMEOUT".dimmed(),
        "SCOPE".dimmed(),
        "DESCRIPTION".dimmed()
    );
    println!("{}", Theme::separator());
    for tool in &tools {
        println!(
            "{:<22} {:>7}s {:<10} {}",
            tool.name.bold(),
            tool.timeout.as_secs(),
            tool.scope_field.as_deref().unwrap_or("-"),
            tool.description
        );
    }
    println!();
    Ok(())
}
