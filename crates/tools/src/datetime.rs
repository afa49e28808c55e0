//! Current date/time tool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolResult};

/// Reports the current UTC date and/or time.
///
/// A fixed instant can be pinned with [`DateTimeTool::fixed`] so tests and
/// replays see a stable clock.
#[derive(Debug, Default)]
pub struct DateTimeTool {
    fixed: Option<DateTime<Utc>>,
}

impl DateTimeTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self { fixed: Some(now) }
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed.unwrap_or_else(Utc::now)
    }
}

fn pattern(format: &str) -> &'static str {
    match format {
        "date" => "%Y-%m-%d",
        "time" => "%H:%M:%S",
        _ => "%Y-%m-%d %H:%M:%S",
    }
}

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "datetime"
    }

    fn description(&self) -> &str {
        "Get the current date and/or time (UTC). Format is one of 'date', 'time' or 'full'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "enum": ["date", "time", "full"],
                    "description": "What to return (default: full)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let format = arguments["format"].as_str().unwrap_or("full");
        let now = self.now();
        let output = now.format(pattern(format)).to_string();
        Ok(ToolResult::ok(output).with_data(serde_json::json!({
            "format": format,
            "timestamp": now.to_rfc3339(),
        })))
    }
}
