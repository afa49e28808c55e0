//! Currency converter tool backed by a fixed rate table.

use async_trait::async_trait;
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolResult};

pub struct CurrencyConverterTool;

const CURRENCIES: &[&str] = &["USD", "EUR", "GBP"];

const RATES: &[(&str, &str, f64)] = &[
    ("USD", "EUR", 0.85),
    ("EUR", "USD", 1.18),
    ("USD", "GBP", 0.73),
    ("GBP", "USD", 1.37),
    ("EUR", "GBP", 0.86),
    ("GBP", "EUR", 1.16),
];

/// Exchange rate from `from` to `to`, if known.
pub fn rate(from: &str, to: &str) -> Option<f64> {
    if from == to {
        return CURRENCIES.contains(&from).then_some(1.0);
    }
    RATES
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, r)| *r)
}

#[async_trait]
impl Tool for CurrencyConverterTool {
    fn name(&self) -> &str {
        "currency_converter"
    }

    fn description(&self) -> &str {
        "Convert an amount between currencies (USD, EUR, GBP) using fixed reference rates."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "amount": { "type": "number", "minimum": 0, "description": "Amount to convert" },
                "from_currency": { "type": "string", "enum": CURRENCIES },
                "to_currency": { "type": "string", "enum": CURRENCIES }
            },
            "required": ["amount", "from_currency", "to_currency"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "amount": { "type": "number" },
                "rate": { "type": "number", "minimum": 0 },
                "result": { "type": "number" }
            },
            "required": ["amount", "rate", "result"]
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let amount = arguments["amount"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'amount' argument".into()))?;
        let from = arguments["from_currency"].as_str().unwrap_or_default();
        let to = arguments["to_currency"].as_str().unwrap_or_default();

        let Some(rate) = rate(from, to) else {
            return Ok(ToolResult::failure(format!(
                "Exchange rate not available for {from} to {to}"
            )));
        };
        let result = amount * rate;
        Ok(
            ToolResult::ok(format!("{amount} {from} = {result:.2} {to}")).with_data(serde_json::json!({
                "amount": amount,
                "rate": rate,
                "result": (result * 100.0).round() / 100.0,
            })),
        )
    }
}
