//! The agent loop — Thinking → Acting → Observing until an answer.
//!
//! Each iteration composes the prompt (instructions, retrieved context,
//! history, the trace so far and the user turn), asks the model for exactly
//! one action, and either finishes with the answer or runs the requested
//! tool and records what it returned.
//!
//! # Failure containment
//!
//! - Tool-layer errors (unknown tool, bad arguments, failure, timeout)
//!   become observations; the model sees them and can correct course.
//! - Unparsable model output is retried once with a corrective
//!   instruction, then the run fails with `ReasoningFormat`.
//! - Running out of steps fails with `StepBudgetExceeded` but still returns
//!   a best-effort answer flagged `incomplete`.
//! - Provider errors and timeouts fail the run with the provider error kept.
//!
//! A run always yields an [`AgentOutcome`] with the trace of completed steps.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use ragent_config::{AgentConfig, AppConfig, EarlyStopping};
use ragent_core::error::{AgentError, ProviderError};
use ragent_core::event::{DomainEvent, EventBus};
use ragent_core::memory::MemoryTurn;
use ragent_core::message::Message;
use ragent_core::provider::{Provider, ProviderRequest, ProviderResponse};
use ragent_core::token::{estimate_tokens, truncate_end};
use ragent_core::tool::ToolRegistry;
use ragent_core::vector_store::ScoredChunk;

use crate::action::{FORMAT_INSTRUCTIONS, ParsedAction, parse_react, parse_response};
use crate::context::{Citation, ComposeInput, ComposedPrompt, CompositionMetadata, ContextComposer};
use crate::trace::{AgentStep, Observation, StepAction};

/// Text the model must not run past in ReAct mode.
const STOP_SEQUENCE: &str = "\nObservation:";

/// How much of a malformed reply is echoed back on retry.
const RETRY_ECHO_TOKENS: usize = 64;

const CONDENSE_INSTRUCTIONS: &str = "Given the conversation so far and a follow-up question, rewrite the \
                                     follow-up as a standalone question that can be understood without the \
                                     conversation. Reply with the question only.";

const FINAL_REQUEST: &str = "You have run out of steps. Using only the information gathered so far, reply now with\n\
                             Final Answer: <your best answer>";

/// Loop parameters, usually taken from the `[agent]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonerSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_steps: usize,
    pub model_timeout: Duration,
    pub early_stopping: EarlyStopping,
    pub system_prompt: String,
}

impl ReasonerSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            max_steps: config.max_steps,
            model_timeout: Duration::from_secs(config.model_timeout_secs),
            early_stopping: config.early_stopping,
            system_prompt: config.system_prompt.clone(),
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        if self.max_steps == 0 {
            return Err(AgentError::Config("max_steps must be > 0".into()));
        }
        if self.model_timeout.is_zero() {
            return Err(AgentError::Config("model timeout must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for ReasonerSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// The result of one run. Failures still carry the trace and an answer.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub run_id: String,
    pub state: RunState,
    pub answer: String,
    /// The answer is best-effort, not the model's final answer
    pub incomplete: bool,
    pub error: Option<AgentError>,
    pub trace: Vec<AgentStep>,
    /// Retrieved chunks included in the last composed prompt
    pub citations: Vec<Citation>,
    pub composition: Option<CompositionMetadata>,
}

impl AgentOutcome {
    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    /// Did the run produce something worth keeping in memory?
    pub fn has_answer(&self) -> bool {
        self.is_done() || matches!(self.error, Some(AgentError::StepBudgetExceeded { .. }))
    }
}

/// Inputs to one run.
#[derive(Debug, Clone, Copy)]
pub struct RunInput<'a> {
    pub user_turn: &'a str,
    pub retrieved: &'a [ScoredChunk],
    pub memory: &'a [MemoryTurn],
}

impl<'a> RunInput<'a> {
    pub fn new(user_turn: &'a str) -> Self {
        Self {
            user_turn,
            retrieved: &[],
            memory: &[],
        }
    }
}

enum LoopState {
    Thinking,
    Acting { parsed: ParsedAction, retried: bool },
    Observing(AgentStep),
    Done(String),
    Failed(AgentError),
}

pub struct Reasoner {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    composer: ContextComposer,
    settings: ReasonerSettings,
    events: Arc<EventBus>,
}

impl Reasoner {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, events: Arc<EventBus>) -> Self {
        Self {
            provider,
            tools,
            composer: ContextComposer::default(),
            settings: ReasonerSettings::default(),
            events,
        }
    }

    /// Build with the `[agent]` and `[composer]` sections of `config`.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, tools, events)
            .with_settings(ReasonerSettings::from_config(&config.agent))
            .with_composer(ContextComposer::from_config(&config.composer))
    }

    pub fn with_settings(mut self, settings: ReasonerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_composer(mut self, composer: ContextComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.settings.max_steps = max_steps;
        self
    }

    pub fn settings(&self) -> &ReasonerSettings {
        &self.settings
    }

    pub fn composer(&self) -> &ContextComposer {
        &self.composer
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// System instructions: the configured prompt, the tool list and the
    /// action format.
    pub fn system_instructions(&self) -> String {
        let mut out = self.settings.system_prompt.trim().to_string();
        let definitions = self.tools.definitions();
        if !definitions.is_empty() {
            out.push_str("\n\nYou can use these tools:\n");
            for def in &definitions {
                out.push_str(&format!(
                    "- {}: {} Arguments: {}\n",
                    def.name, def.description, def.parameters
                ));
            }
        }
        out.push('\n');
        out.push_str(FORMAT_INSTRUCTIONS);
        out
    }

    /// Run the loop for one user turn.
    pub async fn run(&self, input: RunInput<'_>) -> AgentOutcome {
        let run_id = Uuid::new_v4().to_string();
        let mut trace: Vec<AgentStep> = Vec::new();
        let mut last_prompt: Option<ComposedPrompt> = None;

        if let Err(e) = self.settings.validate() {
            return self.finish(run_id, RunState::Failed, String::new(), Some(e), trace, None);
        }

        let system = self.system_instructions();
        info!(
            run_id = %run_id,
            model = %self.settings.model,
            max_steps = self.settings.max_steps,
            retrieved = input.retrieved.len(),
            history = input.memory.len(),
            "Agent run starting"
        );

        let mut state = LoopState::Thinking;
        loop {
            state = match state {
                LoopState::Thinking => {
                    if trace.len() >= self.settings.max_steps {
                        return self.exhausted(run_id, &system, &input, trace, last_prompt).await;
                    }
                    debug!(run_id = %run_id, step = trace.len() + 1, "Thinking");
                    match self.think(&system, &input, &trace, &mut last_prompt).await {
                        Ok((parsed, retried)) => LoopState::Acting { parsed, retried },
                        Err(e) => LoopState::Failed(e),
                    }
                }

                LoopState::Acting { parsed, retried } => {
                    let step_index = trace.len() + 1;
                    let ParsedAction { thought, action } = parsed;
                    match action {
                        StepAction::FinalAnswer { answer } => {
                            let step = AgentStep {
                                step_index,
                                thought,
                                action: StepAction::FinalAnswer {
                                    answer: answer.clone(),
                                },
                                observation: None,
                                retried,
                            };
                            self.publish_step(&run_id, &step);
                            trace.push(step);
                            LoopState::Done(answer)
                        }
                        StepAction::ToolCall { tool_name, arguments } => {
                            let observation = self.act(&tool_name, &arguments).await;
                            LoopState::Observing(AgentStep {
                                step_index,
                                thought,
                                action: StepAction::ToolCall { tool_name, arguments },
                                observation: Some(observation),
                                retried,
                            })
                        }
                    }
                }

                LoopState::Observing(step) => {
                    self.publish_step(&run_id, &step);
                    trace.push(step);
                    LoopState::Thinking
                }

                LoopState::Done(answer) => {
                    return self.finish(run_id, RunState::Done, answer, None, trace, last_prompt);
                }

                LoopState::Failed(error) => {
                    warn!(run_id = %run_id, error = %error, "Agent run failed");
                    let answer = best_effort_answer(&trace, "I ran into a problem before I could finish.");
                    return self.finish(run_id, RunState::Failed, answer, Some(error), trace, last_prompt);
                }
            };
        }
    }

    /// Rewrite a follow-up `question` into a standalone one using `history`.
    ///
    /// One tool-less model call whose prompt goes through the composer.
    pub async fn condense_question(&self, question: &str, history: &[MemoryTurn]) -> Result<String, AgentError> {
        let user_turn = format!("Follow-up question: {question}");
        let prompt = self
            .composer
            .compose(&ComposeInput {
                system: CONDENSE_INSTRUCTIONS,
                user_turn: &user_turn,
                retrieved: &[],
                memory: history,
                trace: &[],
            })
            .map_err(|e| AgentError::Config(e.to_string()))?;

        let response = self.call_model(prompt.to_messages(), false).await?;
        let text = response.message.content.trim();
        let text = text.strip_prefix("Standalone question:").map_or(text, str::trim);
        if text.is_empty() {
            return Err(AgentError::ReasoningFormat("empty standalone question".into()));
        }
        debug!(original = %question, standalone = %text, "Condensed question");
        Ok(text.to_string())
    }

    /// Compose, call the model, and parse one action (retrying once).
    ///
    /// The retry is recomposed with room held back for the echoed reply and
    /// the corrective instruction, so it stays within the token budget.
    async fn think(
        &self,
        system: &str,
        input: &RunInput<'_>,
        trace: &[AgentStep],
        last_prompt: &mut Option<ComposedPrompt>,
    ) -> Result<(ParsedAction, bool), AgentError> {
        let prompt = self.compose(system, input, trace, 0)?;
        let messages = prompt.to_messages();
        *last_prompt = Some(prompt);

        let response = self.call_model(messages, true).await?;
        let reason = match parse_response(&response.message) {
            Ok(parsed) => return Ok((parsed, false)),
            Err(reason) => reason,
        };

        warn!(reason = %reason, "Malformed model output, retrying once");
        let echo = truncate_end(response.message.content.trim(), RETRY_ECHO_TOKENS);
        let correction = format!("Your previous reply could not be used: {reason}.\n{FORMAT_INSTRUCTIONS}");
        let reserved = estimate_tokens(echo) + estimate_tokens(&correction);

        let prompt = match self.compose(system, input, trace, reserved) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "No room in the budget to retry");
                return Err(AgentError::ReasoningFormat(reason));
            }
        };
        let mut messages = prompt.to_messages();
        *last_prompt = Some(prompt);
        if !echo.is_empty() {
            messages.push(Message::assistant(echo));
        }
        messages.push(Message::user(correction));

        let retry = self.call_model(messages, true).await?;
        parse_response(&retry.message)
            .map(|parsed| (parsed, true))
            .map_err(AgentError::ReasoningFormat)
    }

    fn compose(
        &self,
        system: &str,
        input: &RunInput<'_>,
        trace: &[AgentStep],
        reserved: usize,
    ) -> Result<ComposedPrompt, AgentError> {
        self.composer
            .compose_reserving(
                &ComposeInput {
                    system,
                    user_turn: input.user_turn,
                    retrieved: input.retrieved,
                    memory: input.memory,
                    trace,
                },
                reserved,
            )
            .map_err(|e| AgentError::Config(e.to_string()))
    }

    async fn call_model(
        &self,
        messages: Vec<Message>,
        with_tools: bool,
    ) -> Result<ProviderResponse, AgentError> {
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools: if with_tools {
                self.tools.definitions()
            } else {
                vec![]
            },
            stop: vec![STOP_SEQUENCE.to_string()],
        };

        let timeout = self.settings.model_timeout;
        match tokio::time::timeout(timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(AgentError::Provider(e)),
            Err(_) => Err(AgentError::Provider(ProviderError::Timeout(format!(
                "{} did not answer within {}ms",
                self.provider.name(),
                timeout.as_millis()
            )))),
        }
    }

    /// Invoke a tool; every outcome, including errors, becomes an observation.
    async fn act(&self, tool_name: &str, arguments: &serde_json::Value) -> Observation {
        let start = Instant::now();
        let observation = match self.tools.invoke(tool_name, arguments.clone()).await {
            Ok(result) => Observation::from_output(result.success, result.output),
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "Tool call failed");
                Observation::from_error(e)
            }
        };
        self.events.publish(DomainEvent::ToolExecuted {
            tool_name: tool_name.to_string(),
            success: observation.success,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        observation
    }

    /// The step budget ran out: produce a best-effort answer.
    async fn exhausted(
        &self,
        run_id: String,
        system: &str,
        input: &RunInput<'_>,
        trace: Vec<AgentStep>,
        last_prompt: Option<ComposedPrompt>,
    ) -> AgentOutcome {
        let max_steps = self.settings.max_steps;
        warn!(run_id = %run_id, max_steps, "Step budget exceeded");

        let forced = || {
            best_effort_answer(
                &trace,
                &format!("I reached the maximum of {max_steps} reasoning steps without a final answer."),
            )
        };
        let answer = match self.settings.early_stopping {
            EarlyStopping::Force => forced(),
            EarlyStopping::Generate => match self.generate_final(system, input, &trace).await {
                Some(answer) => answer,
                None => forced(),
            },
        };
        self.finish(
            run_id,
            RunState::Failed,
            answer,
            Some(AgentError::StepBudgetExceeded { max_steps }),
            trace,
            last_prompt,
        )
    }

    /// One extra tool-less model call asking for the best answer so far.
    async fn generate_final(
        &self,
        system: &str,
        input: &RunInput<'_>,
        trace: &[AgentStep],
    ) -> Option<String> {
        let reserved = estimate_tokens(FINAL_REQUEST);
        let mut messages = match self.compose(system, input, trace, reserved) {
            Ok(prompt) => prompt.to_messages(),
            Err(e) => {
                warn!(error = %e, "No room for final generation, forcing an answer");
                return None;
            }
        };
        messages.push(Message::user(FINAL_REQUEST));
        let response = match self.call_model(messages, false).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Final generation failed, forcing an answer");
                return None;
            }
        };
        let text = response.message.content.trim();
        match parse_react(text) {
            Ok(ParsedAction {
                action: StepAction::FinalAnswer { answer },
                ..
            }) => Some(answer),
            Ok(_) => None,
            Err(_) if text.is_empty() => None,
            Err(_) => Some(text.to_string()),
        }
    }

    fn publish_step(&self, run_id: &str, step: &AgentStep) {
        debug!(
            run_id = %run_id,
            step = step.step_index,
            action = %step.action.label(),
            retried = step.retried,
            "Step completed"
        );
        self.events.publish(DomainEvent::StepCompleted {
            run_id: run_id.to_string(),
            step_index: step.step_index,
            action: step.action.label(),
            timestamp: Utc::now(),
        });
    }

    fn finish(
        &self,
        run_id: String,
        state: RunState,
        answer: String,
        error: Option<AgentError>,
        trace: Vec<AgentStep>,
        last_prompt: Option<ComposedPrompt>,
    ) -> AgentOutcome {
        let incomplete = state == RunState::Failed;
        if let Some(e) = &error {
            self.events.publish(DomainEvent::ErrorOccurred {
                context: format!("agent run {run_id}"),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        self.events.publish(DomainEvent::RunFinished {
            run_id: run_id.clone(),
            state: state.as_str().to_string(),
            steps: trace.len(),
            incomplete,
            timestamp: Utc::now(),
        });
        info!(
            run_id = %run_id,
            state = state.as_str(),
            steps = trace.len(),
            incomplete,
            "Agent run finished"
        );

        let (citations, composition) = match last_prompt {
            Some(prompt) => (prompt.citations(), Some(prompt.metadata)),
            None => (Vec::new(), None),
        };
        AgentOutcome {
            run_id,
            state,
            answer,
            incomplete,
            error,
            trace,
            citations,
            composition,
        }
    }
}

/// `lead`, followed by the most recent observation if there is one.
fn best_effort_answer(trace: &[AgentStep], lead: &str) -> String {
    match trace.iter().rev().find_map(|s| s.observation.as_ref()) {
        Some(obs) => format!("{lead} Here's what I found so far: {}", obs.content),
        None => lead.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use ragent_core::error::ToolError;
    use ragent_core::tool::{Tool, ToolResult};

    fn reasoner(provider: Arc<ScriptedProvider>) -> Reasoner {
        let tools = Arc::new(ragent_tools::default_registry().unwrap());
        Reasoner::new(provider, tools, Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn answers_on_first_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "Thought: easy.\nFinal Answer: Hello!",
        )]));
        let outcome = reasoner(provider.clone()).run(RunInput::new("Hi")).await;

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.answer, "Hello!");
        assert!(!outcome.incomplete);
        assert_eq!(outcome.trace.len(), 1);
        assert_eq!(outcome.trace[0].step_index, 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn tool_then_answer_records_observation() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Thought: I need math.\nAction: calculator\nAction Input: {\"expression\": \"2 + 3\"}"),
            text_response("Final Answer: 5"),
        ]));
        let outcome = reasoner(provider.clone()).run(RunInput::new("What is 2+3?")).await;

        assert!(outcome.is_done());
        assert_eq!(outcome.trace.len(), 2);
        let obs = outcome.trace[0].observation.as_ref().unwrap();
        assert!(obs.success);
        assert_eq!(obs.content, "5");
        // The second call saw the observation in its trace section.
        let second = &provider.requests()[1];
        assert!(second.messages.iter().any(|m| m.content.contains("Observation: 5")));
    }

    #[tokio::test]
    async fn native_tool_call_is_accepted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![tool_call("weather_lookup", serde_json::json!({"location": "Paris"}))], "Checking."),
            text_response("Final Answer: Sunny and 28°C."),
        ]));
        let outcome = reasoner(provider).run(RunInput::new("Weather in Paris?")).await;
        assert!(outcome.is_done());
        assert_eq!(outcome.trace[0].thought, "Checking.");
        assert!(outcome.trace[0].observation.as_ref().unwrap().content.contains("Paris: 28°C"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_observation() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Action: teleport\nAction Input: {}"),
            text_response("Final Answer: I cannot teleport."),
        ]));
        let outcome = reasoner(provider).run(RunInput::new("Beam me up")).await;
        assert!(outcome.is_done());
        let obs = outcome.trace[0].observation.as_ref().unwrap();
        assert_eq!(obs.error, Some(ToolError::UnknownTool("teleport".into())));
    }

    #[tokio::test]
    async fn invalid_arguments_exhaust_step_budget() {
        let bad = "Action: calculator\nAction Input: {\"expr\": 1}";
        let provider = Arc::new(ScriptedProvider::repeating(text_response(bad)));
        let outcome = reasoner(provider.clone())
            .with_max_steps(3)
            .run(RunInput::new("compute"))
            .await;

        assert_eq!(outcome.state, RunState::Failed);
        assert!(outcome.incomplete);
        assert!(matches!(outcome.error, Some(AgentError::StepBudgetExceeded { max_steps: 3 })));
        assert_eq!(outcome.trace.len(), 3);
        let indices: Vec<usize> = outcome.trace.iter().map(|s| s.step_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        for step in &outcome.trace {
            let err = step.observation.as_ref().unwrap().error.clone();
            assert!(matches!(err, Some(ToolError::SchemaValidation { .. })));
        }
        assert!(outcome.answer.starts_with("I reached the maximum of 3 reasoning steps"));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn generate_early_stopping_makes_one_extra_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Action: datetime\nAction Input: {\"format\": \"date\"}"),
            text_response("Final Answer: Today is a fine day."),
        ]));
        let settings = ReasonerSettings {
            max_steps: 1,
            early_stopping: EarlyStopping::Generate,
            ..ReasonerSettings::default()
        };
        let outcome = reasoner(provider.clone())
            .with_settings(settings)
            .run(RunInput::new("What day is it?"))
            .await;

        assert!(matches!(outcome.error, Some(AgentError::StepBudgetExceeded { .. })));
        assert!(outcome.incomplete);
        assert_eq!(outcome.answer, "Today is a fine day.");
        assert_eq!(outcome.trace.len(), 1);
        assert!(provider.requests()[1].tools.is_empty());
    }

    #[tokio::test]
    async fn malformed_output_is_retried_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("I think the answer is probably 4"),
            text_response("Thought: fixed.\nFinal Answer: 4"),
        ]));
        let outcome = reasoner(provider.clone()).run(RunInput::new("2+2?")).await;

        assert!(outcome.is_done());
        assert_eq!(outcome.answer, "4");
        assert!(outcome.trace[0].retried);
        let retry = &provider.requests()[1];
        let last = retry.messages.last().unwrap();
        assert!(last.content.contains("could not be used"));
        assert!(last.content.contains("Final Answer:"));
    }

    fn request_tokens(request: &ProviderRequest) -> usize {
        request.messages.iter().map(|m| estimate_tokens(&m.content)).sum()
    }

    /// A reasoner without tools whose budget leaves `room` tokens beyond
    /// the system instructions.
    fn tight_reasoner(provider: Arc<ScriptedProvider>, room: usize) -> (Reasoner, usize) {
        let reasoner = Reasoner::new(provider, Arc::new(ToolRegistry::new()), Arc::new(EventBus::default()));
        let budget = estimate_tokens(&reasoner.system_instructions()) + room;
        (reasoner.with_composer(ContextComposer::new(budget, 1)), budget)
    }

    fn filler_chunks() -> Vec<ScoredChunk> {
        (0..10)
            .map(|i| scored_chunk(&format!("doc{i}"), &"filler text ".repeat(20), 0.9 - i as f32 / 100.0))
            .collect()
    }

    #[tokio::test]
    async fn retry_request_stays_within_budget() {
        let long_mumble = format!("I think the answer is probably 4 {}", "because ".repeat(100));
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response(&long_mumble),
            text_response("Final Answer: 4"),
        ]));
        let (reasoner, budget) = tight_reasoner(provider.clone(), 300);
        let retrieved = filler_chunks();
        let outcome = reasoner
            .run(RunInput {
                user_turn: "2+2?",
                retrieved: &retrieved,
                memory: &[],
            })
            .await;

        assert!(outcome.is_done());
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert!(request_tokens(request) <= budget, "{} > {budget}", request_tokens(request));
        }
        assert!(requests[1].messages.last().unwrap().content.contains("could not be used"));
        assert!(outcome.composition.unwrap().reserved > 0);
    }

    #[tokio::test]
    async fn final_generation_stays_within_budget() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Action: lookup\nAction Input: {}"),
            text_response("Final Answer: Nothing found."),
        ]));
        let (reasoner, budget) = tight_reasoner(provider.clone(), 120);
        let settings = ReasonerSettings {
            max_steps: 1,
            early_stopping: EarlyStopping::Generate,
            ..ReasonerSettings::default()
        };
        let retrieved = filler_chunks();
        let outcome = reasoner
            .with_settings(settings)
            .run(RunInput {
                user_turn: "find it",
                retrieved: &retrieved,
                memory: &[],
            })
            .await;

        assert_eq!(outcome.answer, "Nothing found.");
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert!(request_tokens(&requests[1]) <= budget);
    }

    #[tokio::test]
    async fn malformed_twice_fails_with_reasoning_format() {
        let provider = Arc::new(ScriptedProvider::repeating(text_response("no idea")));
        let outcome = reasoner(provider.clone()).run(RunInput::new("?")).await;

        assert_eq!(outcome.state, RunState::Failed);
        assert!(matches!(outcome.error, Some(AgentError::ReasoningFormat(_))));
        assert!(outcome.trace.is_empty());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn provider_error_is_preserved() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::RateLimited {
            retry_after_secs: 30,
        }));
        let outcome = reasoner(provider).run(RunInput::new("hello")).await;
        assert_eq!(outcome.state, RunState::Failed);
        assert!(matches!(outcome.error, Some(AgentError::Provider(ProviderError::RateLimited { .. }))));
        assert!(!outcome.answer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn model_timeout_fails_the_run() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![text_response("Final Answer: late")])
                .with_delay(Duration::from_secs(120)),
        );
        let settings = ReasonerSettings {
            model_timeout: Duration::from_secs(5),
            ..ReasonerSettings::default()
        };
        let outcome = reasoner(provider).with_settings(settings).run(RunInput::new("hi")).await;
        assert!(matches!(outcome.error, Some(AgentError::Provider(ProviderError::Timeout(_)))));
    }

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "Sleeps for a long time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolResult::ok("rested"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout_is_observed_and_loop_continues() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(50));
        registry.register(Box::new(SleepyTool)).unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Action: sleepy\nAction Input: {}"),
            text_response("Final Answer: The tool timed out."),
        ]));
        let outcome = Reasoner::new(provider, Arc::new(registry), Arc::new(EventBus::default()))
            .run(RunInput::new("rest please"))
            .await;

        assert!(outcome.is_done());
        let obs = outcome.trace[0].observation.as_ref().unwrap();
        assert_eq!(
            obs.error,
            Some(ToolError::Timeout {
                tool_name: "sleepy".into(),
                timeout_ms: 50
            })
        );
    }

    #[tokio::test]
    async fn zero_max_steps_is_config_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let outcome = reasoner(provider.clone()).with_max_steps(0).run(RunInput::new("hi")).await;
        assert!(matches!(outcome.error, Some(AgentError::Config(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn oversized_system_prompt_is_config_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let outcome = reasoner(provider)
            .with_composer(ContextComposer::new(10, 1))
            .run(RunInput::new("hi"))
            .await;
        assert!(matches!(outcome.error, Some(AgentError::Config(ref m)) if m.contains("exceed the budget")));
    }

    #[tokio::test]
    async fn publishes_step_and_finish_events() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("Action: calculator\nAction Input: {\"expression\": \"1+1\"}"),
            text_response("Final Answer: 2"),
        ]));
        let tools = Arc::new(ragent_tools::default_registry().unwrap());
        Reasoner::new(provider, tools, events).run(RunInput::new("1+1")).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::ToolExecuted { .. } => "tool",
                DomainEvent::StepCompleted { .. } => "step",
                DomainEvent::RunFinished { .. } => "finished",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["tool", "step", "step", "finished"]);
    }

    #[tokio::test]
    async fn citations_come_from_the_last_prompt() {
        let retrieved = vec![scored_chunk("facts", "The sky is blue.", 0.8)];
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "Final Answer: Blue [facts#0].",
        )]));
        let outcome = reasoner(provider)
            .run(RunInput {
                user_turn: "sky color?",
                retrieved: &retrieved,
                memory: &[],
            })
            .await;
        assert_eq!(outcome.citations.len(), 1);
        assert_eq!(outcome.citations[0].chunk_id, "facts#0");
        assert!(outcome.composition.is_some());
    }
}
