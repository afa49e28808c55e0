//! `ragent config` — Configuration management commands.

use std::path::Path;

use anyhow::Context;
use ragent_config::AppConfig;

pub fn validate(config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = super::config_file(config_path);
    println!("🔍 Validating {}...", path.display());

    let config = match AppConfig::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed and validated");

    let mut warnings = Vec::new();
    if config.chunking.overlap * 2 > config.chunking.max_size {
        warnings.push("chunking.overlap is more than half of max_size; chunks will repeat a lot");
    }
    if config.retrieval.top_k > 20 {
        warnings.push("retrieval.top_k above 20 mostly crowds out conversation history");
    }
    for w in &warnings {
        println!("   ⚠️  {w}");
    }

    println!();
    println!("   Model:     {}", config.agent.model);
    println!("   Steps:     {}", config.agent.max_steps);
    println!("   Budget:    {} tokens", config.composer.token_budget);
    println!("   Memory:    {:?}", config.memory.policy);
    println!("   Index:     {}", config.index_path().display());
    Ok(())
}

pub fn show(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", super::config_file(config_path).display());
}

pub fn init(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = super::config_file(config_path);
    if path.exists() && !force {
        println!("⚠️  {} already exists. Use --force to overwrite.", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("📝 Wrote default config to {}", path.display());
    Ok(())
}
