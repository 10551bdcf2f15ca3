//! Check command - validate configuration without serving.

use std::path::Path;

use warden_config::Config;
use warden_gateway::config_bridge;

use crate::theme::Theme;

/// Load, validate and convert the configuration, then summarize it.
pub(crate) fn run_check(config_path: Option<&Path>, sources: bool) -> anyhow::Result<()> {
    let resolved = match Config::load(config_path) {
        Ok(resolved) => resolved,
        Err(e) => {
            println!("{}", Theme::error(&format!("Invalid configuration: {e}")));
            return Err(e.into());
        },
    };
    let cfg = &resolved.config;

    // Conversion catches what plain validation cannot, such as a template
    // that fails to parse.
    let tools = config_bridge::tools_from_config(cfg)?;
    config_bridge::roles_from_config(cfg, 1)?;
    let sanitizer = config_bridge::sanitizer_from_config(cfg)?;

    println!("\n{}", Theme::header("Configuration"));
    if resolved.loaded_files.is_empty() {
        println!("  Files: {}", Theme::info("embedded defaults only"));
    }
    for file in &resolved.loaded_files {
        println!("  File: {file}");
    }
    println!("  Tools: {}", tools.len());
    println!("  Roles: {}", cfg.roles.len());
    println!("  Principals: {}", cfg.principals.len());
    println!("  Redaction rules: {}", sanitizer.rules().len());
    println!(
        "  Audit: {:?} {}",
        cfg.audit.backend,
        cfg.audit.resolved_path().display()
    );

    if sources {
        println!("\n{}", Theme::header("Sources"));
        println!("{}", Theme::separator());
        let mut fields: Vec<_> = resolved.field_sources.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (field, layer) in fields {
            println!("  {field:<40} {layer}");
        }
    }

    println!("\n{}", Theme::success("Configuration is valid"));
    Ok(())
}
