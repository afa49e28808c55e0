//! The agent's reasoning trace: one [`AgentStep`] per think → act → observe
//! cycle.

use ragent_core::error::ToolError;
use serde::{Deserialize, Serialize};

/// The single action a model response resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    FinalAnswer {
        answer: String,
    },
    ToolCall {
        tool_name: String,
        arguments: serde_json::Value,
    },
}

impl StepAction {
    /// Short label used in logs and events.
    pub fn label(&self) -> String {
        match self {
            Self::FinalAnswer { .. } => "final_answer".into(),
            Self::ToolCall { tool_name, .. } => format!("tool_call:{tool_name}"),
        }
    }
}

/// What the agent saw after acting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub success: bool,
    pub content: String,

    /// Tool-layer error, when the call did not produce a result
    #[serde(skip)]
    pub error: Option<ToolError>,
}

impl Observation {
    pub fn from_output(success: bool, content: impl Into<String>) -> Self {
        Self {
            success,
            content: content.into(),
            error: None,
        }
    }

    pub fn from_error(error: ToolError) -> Self {
        Self {
            success: false,
            content: format!("Error: {error}"),
            error: Some(error),
        }
    }
}

/// One completed reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    /// 1-based, strictly increasing within a run
    pub step_index: usize,
    pub thought: String,
    pub action: StepAction,
    /// `None` for the final-answer step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    /// The model needed a corrective retry to produce a parsable action
    #[serde(default)]
    pub retried: bool,
}

impl AgentStep {
    /// Render in the ReAct scratchpad format fed back to the model.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.thought.is_empty() {
            out.push_str(&format!("Thought: {}\n", self.thought));
        }
        match &self.action {
            StepAction::FinalAnswer { answer } => {
                out.push_str(&format!("Final Answer: {answer}\n"));
            }
            StepAction::ToolCall { tool_name, arguments } => {
                out.push_str(&format!("Action: {tool_name}\nAction Input: {arguments}\n"));
            }
        }
        if let Some(obs) = &self.observation {
            out.push_str(&format!("Observation: {}\n", obs.content));
        }
        out
    }
}
