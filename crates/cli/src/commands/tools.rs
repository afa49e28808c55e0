//! `ragent tools` / `ragent call` — inspect and invoke the tool registry.

use std::path::Path;

use anyhow::Context;
use ragent_config::AppConfig;
use ragent_core::tool::ToolRegistry;
use ragent_tools::{KnowledgeBaseQueryTool, registry_from_config};

/// Build the registry for `config`, adding the knowledge base tool when an
/// index snapshot exists.
async fn build_registry(config: &AppConfig, index: Option<&Path>) -> anyhow::Result<ToolRegistry> {
    let index_path = super::index_file(config, index);
    let knowledge_base = if index_path.exists() {
        let index = super::open_index(&index_path).await?;
        Some(KnowledgeBaseQueryTool::new(index, super::embedder(config)?))
    } else {
        None
    };
    Ok(registry_from_config(&config.tools, knowledge_base)?)
}

pub async fn list(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let registry = build_registry(&config, None).await?;

    println!("🛠️  {} tool(s) (timeout {}s)", registry.len(), registry.timeout().as_secs());
    println!();
    for def in registry.definitions() {
        println!("  {:<22} {}", def.name, def.description);
        let required = def.parameters["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        if !required.is_empty() {
            println!("  {:<22} requires: {required}", "");
        }
    }
    Ok(())
}

pub async fn call(
    config_path: Option<&Path>,
    tool: &str,
    arguments: &str,
    index: Option<&Path>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let registry = build_registry(&config, index).await?;

    let arguments: serde_json::Value =
        serde_json::from_str(arguments).context("Arguments must be a JSON object")?;
    let result = registry.invoke(tool, arguments).await?;

    if result.success {
        println!("{}", result.output);
    } else {
        eprintln!("⚠️  {}", result.output);
    }
    if let Some(data) = &result.data {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}
