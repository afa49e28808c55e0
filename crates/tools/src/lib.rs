//! Built-in tool implementations for ragent.
//!
//! Tools give the agent the ability to act beyond the prompt: do math,
//! check the (mock) weather, read the clock, analyze text, convert
//! currencies, and query the knowledge base.
//!
//! Registries are built once and then shared immutably; see
//! [`registry_from_config`].

pub mod calculator;
pub mod currency_converter;
pub mod datetime;
pub mod knowledge_base_query;
pub mod text_analysis;
pub mod weather_lookup;

use std::time::Duration;
use tracing::debug;

use ragent_config::ToolsConfig;
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolRegistry};

pub use calculator::CalculatorTool;
pub use currency_converter::CurrencyConverterTool;
pub use datetime::DateTimeTool;
pub use knowledge_base_query::KnowledgeBaseQueryTool;
pub use text_analysis::TextAnalysisTool;
pub use weather_lookup::WeatherLookupTool;

/// Names of the tools that need no external collaborators.
pub const STANDALONE_TOOLS: &[&str] = &[
    "calculator",
    "currency_converter",
    "datetime",
    "text_analysis",
    "weather_lookup",
];

fn standalone_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(CalculatorTool),
        Box::new(CurrencyConverterTool),
        Box::new(DateTimeTool::new()),
        Box::new(TextAnalysisTool),
        Box::new(WeatherLookupTool),
    ]
}

/// Create a registry with every standalone built-in tool and the default
/// timeout. `knowledge_base_query` needs an index, so it is not included.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    for tool in standalone_tools() {
        registry.register(tool)?;
    }
    Ok(registry)
}

/// Create a registry honoring the `[tools]` config section.
///
/// Only tools listed in `enabled` are registered (all when the list is
/// empty). The knowledge base tool is added when one is supplied.
pub fn registry_from_config(
    config: &ToolsConfig,
    knowledge_base: Option<KnowledgeBaseQueryTool>,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new().with_timeout(Duration::from_secs(config.timeout_secs));

    let mut tools = standalone_tools();
    if let Some(kb) = knowledge_base {
        tools.push(Box::new(kb));
    }
    for tool in tools {
        if config.is_enabled(tool.name()) {
            registry.register(tool)?;
        } else {
            debug!(tool = %tool.name(), "Tool disabled by config");
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn default_registry_has_standalone_tools() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.names(), STANDALONE_TOOLS.to_vec());
        assert!(registry.get("knowledge_base_query").is_none());
    }

    #[test]
    fn config_filters_and_sets_timeout() {
        let config = ToolsConfig {
            timeout_secs: 5,
            enabled: vec!["calculator".into(), "datetime".into()],
        };
        let registry = registry_from_config(&config, None).unwrap();
        assert_eq!(registry.names(), vec!["calculator", "datetime"]);
        assert_eq!(registry.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn knowledge_base_is_registered_when_supplied() {
        let index = Arc::new(ragent_retrieval::VectorIndex::new(32).unwrap());
        let embedder = Arc::new(ragent_retrieval::HashingEmbedder::new(32).unwrap());
        let kb = KnowledgeBaseQueryTool::new(index, embedder);
        let registry = registry_from_config(&ToolsConfig::default(), Some(kb)).unwrap();
        assert_eq!(registry.len(), STANDALONE_TOOLS.len() + 1);
        assert!(registry.get("knowledge_base_query").is_some());
    }

    #[tokio::test]
    async fn chained_tool_calls() {
        // Convert 100 USD to EUR, then halve it.
        let registry = default_registry().unwrap();
        let converted = registry
            .invoke(
                "currency_converter",
                serde_json::json!({"amount": 100, "from_currency": "USD", "to_currency": "EUR"}),
            )
            .await
            .unwrap();
        let eur = converted.data.unwrap()["result"].as_f64().unwrap();
        let halved = registry
            .invoke("calculator", serde_json::json!({"expression": format!("{eur} / 2")}))
            .await
            .unwrap();
        assert_eq!(halved.output, "42.5");
    }
}
