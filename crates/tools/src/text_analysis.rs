//! Text statistics tool: words, characters, sentences, average word length.

use async_trait::async_trait;
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolResult};
use serde::Serialize;

pub struct TextAnalysisTool;

#[derive(Debug, Serialize, PartialEq)]
pub struct TextStats {
    pub word_count: usize,
    pub character_count: usize,
    pub characters_without_spaces: usize,
    pub sentence_count: usize,
    pub average_word_length: f64,
}

/// Compute statistics over `text`. Characters are Unicode scalar values.
pub fn analyze(text: &str) -> TextStats {
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let sentence_count = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    let average_word_length = if words.is_empty() {
        0.0
    } else {
        ((word_chars as f64 / words.len() as f64) * 100.0).round() / 100.0
    };

    TextStats {
        word_count: words.len(),
        character_count: text.chars().count(),
        characters_without_spaces: text.chars().filter(|c| !c.is_whitespace()).count(),
        sentence_count,
        average_word_length,
    }
}

#[async_trait]
impl Tool for TextAnalysisTool {
    fn name(&self) -> &str {
        "text_analysis"
    }

    fn description(&self) -> &str {
        "Analyze a piece of text: word count, character counts, sentence count and average word length."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to analyze"
                }
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "word_count": { "type": "integer", "minimum": 0 },
                "character_count": { "type": "integer", "minimum": 0 },
                "characters_without_spaces": { "type": "integer", "minimum": 0 },
                "sentence_count": { "type": "integer", "minimum": 0 },
                "average_word_length": { "type": "number", "minimum": 0 }
            },
            "required": ["word_count", "character_count", "sentence_count"]
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;

        let stats = analyze(text);
        let output = format!(
            "Words: {}, Characters: {}, Characters (no spaces): {}, Sentences: {}, Average word length: {:.2}",
            stats.word_count,
            stats.character_count,
            stats.characters_without_spaces,
            stats.sentence_count,
            stats.average_word_length
        );
        let data = serde_json::to_value(&stats)
            .map_err(|e| ToolError::InvalidArguments(format!("Cannot encode stats: {e}")))?;
        Ok(ToolResult::ok(output).with_data(data))
    }
}
