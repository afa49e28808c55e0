//! Turning a model response into exactly one action.
//!
//! Two shapes are accepted:
//!
//! - a single native tool call (`message.tool_calls`), with the message text
//!   taken as the thought;
//! - ReAct-formatted text:
//!
//! ```text
//! Thought: I should look up the weather.
//! Action: weather_lookup
//! Action Input: {"location": "Tokyo"}
//! ```
//!
//! or
//!
//! ```text
//! Thought: I know the answer.
//! Final Answer: It is sunny in Tokyo.
//! ```
//!
//! Anything else (several calls, both an action and an answer, no action at
//! all, non-JSON input) is malformed and reported with a reason the loop can
//! feed back to the model.

use ragent_core::message::Message;

use crate::trace::StepAction;

const THOUGHT: &str = "Thought:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const FINAL_ANSWER: &str = "Final Answer:";
const OBSERVATION: &str = "Observation:";

/// The instruction appended when a response could not be parsed.
pub const FORMAT_INSTRUCTIONS: &str = "Respond with exactly one action, using either\n\
Thought: <your reasoning>\n\
Action: <tool name>\n\
Action Input: <JSON object with the tool arguments>\n\
or\n\
Thought: <your reasoning>\n\
Final Answer: <the answer for the user>";

/// A successfully parsed response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    pub thought: String,
    pub action: StepAction,
}

/// Parse a model response into a single action.
pub fn parse_response(message: &Message) -> Result<ParsedAction, String> {
    match message.tool_calls.len() {
        0 => parse_react(&message.content),
        1 => {
            let call = &message.tool_calls[0];
            let arguments = if call.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&call.arguments).map_err(|e| {
                    format!("arguments for tool '{}' are not valid JSON: {e}", call.name)
                })?
            };
            Ok(ParsedAction {
                thought: message.content.trim().to_string(),
                action: StepAction::ToolCall {
                    tool_name: call.name.clone(),
                    arguments,
                },
            })
        }
        n => Err(format!("expected exactly one action, got {n} tool calls")),
    }
}

/// Parse ReAct-formatted text.
pub fn parse_react(text: &str) -> Result<ParsedAction, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("the response was empty".into());
    }

    let answer_at = text.find(FINAL_ANSWER);
    let action_at = find_action(text);

    match (action_at, answer_at) {
        (Some(_), Some(_)) => Err("the response contains both an Action and a Final Answer".into()),
        (None, None) => Err("the response contains neither an Action nor a Final Answer".into()),
        (None, Some(at)) => {
            let answer = text[at + FINAL_ANSWER.len()..].trim();
            if answer.is_empty() {
                return Err("the Final Answer is empty".into());
            }
            Ok(ParsedAction {
                thought: thought_before(text, at),
                action: StepAction::FinalAnswer {
                    answer: answer.to_string(),
                },
            })
        }
        (Some(at), None) => {
            let rest = &text[at + ACTION.len()..];
            if find_action(rest).is_some() {
                return Err("the response contains more than one Action".into());
            }
            let Some(input_at) = rest.find(ACTION_INPUT) else {
                return Err("the Action has no Action Input".into());
            };
            let tool_name = rest[..input_at].trim();
            if tool_name.is_empty() || tool_name.contains(char::is_whitespace) {
                return Err(format!("'{tool_name}' is not a tool name"));
            }

            let mut input = &rest[input_at + ACTION_INPUT.len()..];
            // Models sometimes hallucinate the observation; ignore it.
            if let Some(obs) = input.find(OBSERVATION) {
                input = &input[..obs];
            }
            let arguments = parse_input(input)?;
            Ok(ParsedAction {
                thought: thought_before(text, at),
                action: StepAction::ToolCall {
                    tool_name: tool_name.to_string(),
                    arguments,
                },
            })
        }
    }
}

/// `Action Input:` never matches here; only a bare `Action:` does.
fn find_action(text: &str) -> Option<usize> {
    text.find(ACTION)
}

/// The thought is whatever precedes the action, minus a `Thought:` prefix.
fn thought_before(text: &str, at: usize) -> String {
    let head = text[..at].trim();
    head.strip_prefix(THOUGHT).unwrap_or(head).trim().to_string()
}

fn parse_input(input: &str) -> Result<serde_json::Value, String> {
    let input = input.trim();
    let input = input
        .strip_prefix("```json")
        .or_else(|| input.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(input);
    if input.is_empty() {
        return Ok(serde_json::json!({}));
    }
    let value: serde_json::Value = serde_json::from_str(input)
        .map_err(|e| format!("Action Input is not valid JSON: {e}"))?;
    if !value.is_object() {
        return Err("Action Input must be a JSON object".into());
    }
    Ok(value)
}
