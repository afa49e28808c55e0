//! End-to-end integration tests for the ragent runtime.
//!
//! These tests exercise the full pipeline from raw documents to agent
//! answers: chunking, embedding, indexing, retrieval, prompt composition,
//! tool execution and conversation memory.

use std::sync::Arc;
use std::time::Duration;

use ragent_agent::{
    AgentOutcome, RagSession, Reasoner, ReasonerSettings, RetrievalSettings, RunInput, RunState,
    StepAction,
};
use ragent_config::{AppConfig, EarlyStopping};
use ragent_core::document::Document;
use ragent_core::error::{AgentError, ProviderError, ToolError};
use ragent_core::event::{DomainEvent, EventBus};
use ragent_core::message::{Message, MessageToolCall};
use ragent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use ragent_core::tool::{Tool, ToolRegistry, ToolResult};
use ragent_memory::ConversationMemory;
use ragent_retrieval::{Chunker, ChunkerConfig, HashingEmbedder, Ingestor, VectorIndex};
use ragent_tools::{KnowledgeBaseQueryTool, default_registry};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Vec<ProviderResponse>,
    requests: std::sync::Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn text(response: &str) -> Self {
        Self::new(vec![text_response(response)])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);
        // The last response repeats once the script runs out.
        let resp = self
            .responses
            .get(call)
            .or(self.responses.last())
            .unwrap_or_else(|| panic!("ScriptedProvider has no responses (call #{call})"));
        Ok(resp.clone())
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut msg = Message::assistant(thought);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: None,
        model: "mock".into(),
    }
}

fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

fn reasoner(provider: Arc<ScriptedProvider>, tools: ToolRegistry) -> Reasoner {
    Reasoner::new(provider, Arc::new(tools), Arc::new(EventBus::default()))
}

/// Index "The sky is blue. Water is wet." with 20-character chunks
/// overlapping by 5.
async fn sky_knowledge_base() -> (Arc<VectorIndex>, Arc<HashingEmbedder>) {
    let embedder = Arc::new(HashingEmbedder::new(512).unwrap());
    let index = Arc::new(VectorIndex::new(512).unwrap());
    let ingestor = Ingestor::new(
        Chunker::new(ChunkerConfig::characters(20, 5).unwrap()),
        embedder.clone(),
        index.clone(),
    )
    .unwrap();
    let doc = Document::new("facts.txt", "The sky is blue. Water is wet.").with_id("facts");
    let report = ingestor.ingest(&[doc]).await.unwrap();
    assert_eq!(report.chunks, 2);
    (index, embedder)
}

// ── E2E: Retrieval pipeline ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_sky_chunks_overlap_and_retrieve() {
    let (index, embedder) = sky_knowledge_base().await;

    let first = index.get("facts#0").await.unwrap();
    let second = index.get("facts#1").await.unwrap();
    assert_eq!(first.offset_range.end - second.offset_range.start, 5);
    assert!(first.text.ends_with(&second.text[..5]));

    let query = embedder.embed_text("what color is the sky");
    let hits = index.search(&query, 1, None).await.unwrap();
    assert_eq!(hits[0].chunk.id, "facts#0");
}

#[tokio::test]
async fn e2e_sky_question_answered_with_citation() {
    let (index, embedder) = sky_knowledge_base().await;
    let provider = Arc::new(ScriptedProvider::text(
        "Thought: The context says so.\nFinal Answer: The sky is blue [facts#0].",
    ));
    let reasoner = Arc::new(reasoner(provider.clone(), default_registry().unwrap()));
    let mut session = RagSession::new(reasoner, index, embedder, ConversationMemory::buffer())
        .unwrap()
        .with_retrieval(RetrievalSettings::top_k(1));

    let reply = session.ask("what color is the sky").await.unwrap();

    assert_eq!(reply.outcome.state, RunState::Done);
    assert_eq!(reply.answer(), "The sky is blue [facts#0].");
    assert_eq!(reply.outcome.citations[0].chunk_id, "facts#0");
    assert_eq!(reply.sources, vec!["facts.txt".to_string()]);
    assert_eq!(session.memory().len(), 2);

    let system = &provider.request(0).messages[0];
    assert!(system.content.contains("[Retrieved Context]"));
    assert!(system.content.contains("The sky is blue."));
}

#[tokio::test]
async fn e2e_index_survives_save_and_load() {
    let (index, embedder) = sky_knowledge_base().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    index.save(&path).await.unwrap();

    let reloaded = VectorIndex::load(&path).await.unwrap();
    assert_eq!(reloaded.len().await, 2);
    let query = embedder.embed_text("what color is the sky");
    let before = index.search(&query, 2, None).await.unwrap();
    let after = reloaded.search(&query, 2, None).await.unwrap();
    assert_eq!(before, after);
}

// ── E2E: Agent loop ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_direct_answer_is_one_step() {
    let provider = Arc::new(ScriptedProvider::text("Final Answer: Hello there!"));
    let outcome = reasoner(provider.clone(), default_registry().unwrap())
        .run(RunInput::new("Hello"))
        .await;

    assert!(outcome.is_done());
    assert_eq!(outcome.trace.len(), 1);
    assert_eq!(outcome.answer, "Hello there!");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn e2e_invalid_arguments_hit_step_budget() {
    let provider = Arc::new(ScriptedProvider::text(
        "Thought: compute.\nAction: calculator\nAction Input: {\"formula\": \"2+2\"}",
    ));
    let outcome: AgentOutcome = reasoner(provider.clone(), default_registry().unwrap())
        .with_max_steps(4)
        .run(RunInput::new("What is 2+2?"))
        .await;

    assert_eq!(outcome.state, RunState::Failed);
    assert!(matches!(outcome.error, Some(AgentError::StepBudgetExceeded { max_steps: 4 })));
    assert!(outcome.incomplete);
    assert_eq!(outcome.trace.len(), 4);
    assert!(!outcome.answer.is_empty());
    for (i, step) in outcome.trace.iter().enumerate() {
        assert_eq!(step.step_index, i + 1);
        assert!(!step.observation.as_ref().unwrap().success);
    }
}

#[tokio::test]
async fn e2e_generate_early_stopping_asks_for_final_answer() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Action: weather_lookup\nAction Input: {\"location\": \"Tokyo\"}"),
        text_response("Final Answer: Tokyo is sunny at 25°C."),
    ]));
    let settings = ReasonerSettings {
        max_steps: 1,
        early_stopping: EarlyStopping::Generate,
        ..ReasonerSettings::default()
    };
    let outcome = reasoner(provider.clone(), default_registry().unwrap())
        .with_settings(settings)
        .run(RunInput::new("Weather in Tokyo?"))
        .await;

    assert!(outcome.incomplete);
    assert_eq!(outcome.answer, "Tokyo is sunny at 25°C.");
    assert_eq!(provider.calls(), 2);
}

struct SlowTool;

#[async_trait::async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow_lookup"
    }

    fn description(&self) -> &str {
        "Takes far too long"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(ToolResult::ok("finally"))
    }
}

#[tokio::test(start_paused = true)]
async fn e2e_tool_timeout_is_observed_and_loop_continues() {
    let mut tools = ToolRegistry::new().with_timeout(Duration::from_millis(200));
    tools.register(Box::new(SlowTool)).unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Action: slow_lookup\nAction Input: {}"),
        text_response("Final Answer: The lookup timed out, sorry."),
    ]));

    let outcome = reasoner(provider, tools).run(RunInput::new("look it up")).await;

    assert!(outcome.is_done());
    assert_eq!(outcome.trace.len(), 2);
    let obs = outcome.trace[0].observation.as_ref().unwrap();
    assert!(matches!(obs.error, Some(ToolError::Timeout { timeout_ms: 200, .. })));
    assert!(obs.content.contains("timed out"));
}

#[tokio::test]
async fn e2e_malformed_output_retried_then_answered() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Sure! Blue, probably."),
        text_response("Thought: Use the format.\nFinal Answer: Blue."),
    ]));
    let outcome = reasoner(provider.clone(), default_registry().unwrap())
        .run(RunInput::new("sky color?"))
        .await;

    assert!(outcome.is_done());
    assert!(outcome.trace[0].retried);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_tools_chain_currency_then_calculator() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            vec![make_tool_call(
                "currency_converter",
                serde_json::json!({"amount": 100, "from_currency": "USD", "to_currency": "EUR"}),
            )],
            "Convert first.",
        ),
        tool_response(
            vec![make_tool_call("calculator", serde_json::json!({"expression": "85 / 2"}))],
            "Now split it.",
        ),
        text_response("Final Answer: Each person pays 42.5 EUR."),
    ]));
    let outcome = reasoner(provider, default_registry().unwrap())
        .run(RunInput::new("Split 100 USD in euros between two people"))
        .await;

    assert!(outcome.is_done());
    let observations: Vec<&str> = outcome
        .trace
        .iter()
        .filter_map(|s| s.observation.as_ref())
        .map(|o| o.content.as_str())
        .collect();
    assert_eq!(observations, vec!["100 USD = 85.00 EUR", "42.5"]);
}

#[tokio::test]
async fn e2e_knowledge_base_tool_inside_loop() {
    let (index, embedder) = sky_knowledge_base().await;
    let mut tools = default_registry().unwrap();
    tools
        .register(Box::new(KnowledgeBaseQueryTool::new(index, embedder)))
        .unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response(
            "Thought: Search the docs.\nAction: knowledge_base_query\nAction Input: {\"query\": \"what color is the sky\", \"top_k\": 1}",
        ),
        text_response("Final Answer: Blue."),
    ]));

    let outcome = reasoner(provider.clone(), tools).run(RunInput::new("sky?")).await;

    assert!(outcome.is_done());
    let obs = outcome.trace[0].observation.as_ref().unwrap();
    assert!(obs.success);
    assert!(obs.content.contains("facts#0"));
    let second = provider.request(1);
    assert!(second.messages.iter().any(|m| m.content.contains("Observation: [1] facts#0")));
}

#[tokio::test]
async fn e2e_unknown_tool_does_not_stop_the_run() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![make_tool_call("web_search", serde_json::json!({"q": "x"}))], ""),
        text_response("Final Answer: I can't search the web."),
    ]));
    let outcome = reasoner(provider, default_registry().unwrap())
        .run(RunInput::new("search for x"))
        .await;

    assert!(outcome.is_done());
    assert!(matches!(
        outcome.trace[0].action,
        StepAction::ToolCall { ref tool_name, .. } if tool_name == "web_search"
    ));
    assert_eq!(
        outcome.trace[0].observation.as_ref().unwrap().error,
        Some(ToolError::UnknownTool("web_search".into()))
    );
}

// ── E2E: Conversation memory ────────────────────────────────────────────

#[tokio::test]
async fn e2e_window_memory_limits_history() {
    let (index, embedder) = sky_knowledge_base().await;
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Final Answer: one"),
        text_response("Final Answer: two"),
        text_response("Final Answer: three"),
    ]));
    let reasoner = Arc::new(reasoner(provider.clone(), ToolRegistry::new()));
    let mut session =
        RagSession::new(reasoner, index, embedder, ConversationMemory::window(2).unwrap()).unwrap();

    session.ask("first question").await.unwrap();
    session.ask("second question").await.unwrap();
    session.ask("third question").await.unwrap();

    let third = provider.request(2);
    let contents: Vec<&str> = third.messages.iter().map(|m| m.content.as_str()).collect();
    assert!(!contents.contains(&"first question"));
    assert!(contents.contains(&"second question"));
    assert!(contents.contains(&"two"));
    assert_eq!(session.memory().len(), 6);
}

// ── E2E: Configuration and events ───────────────────────────────────────

#[tokio::test]
async fn e2e_config_drives_reasoner() {
    let mut config: AppConfig = toml::from_str(
        r#"
        [agent]
        max_steps = 2
        model = "local-model"

        [composer]
        token_budget = 3000
        "#,
    )
    .unwrap();
    config.validate().unwrap();
    config.agent.early_stopping = EarlyStopping::Force;

    let provider = Arc::new(ScriptedProvider::text("Action: datetime\nAction Input: {}"));
    let reasoner = Reasoner::from_config(
        provider.clone(),
        Arc::new(default_registry().unwrap()),
        Arc::new(EventBus::default()),
        &config,
    );
    assert_eq!(reasoner.composer().budget(), 3000);

    let outcome = reasoner.run(RunInput::new("time?")).await;
    assert_eq!(outcome.trace.len(), 2);
    assert!(matches!(outcome.error, Some(AgentError::StepBudgetExceeded { max_steps: 2 })));
    assert_eq!(provider.request(0).model, "local-model");
}

#[tokio::test]
async fn e2e_events_report_the_run() {
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Action: text_analysis\nAction Input: {\"text\": \"Hi there.\"}"),
        text_response("Final Answer: Two words."),
    ]));
    let outcome = Reasoner::new(provider, Arc::new(default_registry().unwrap()), events)
        .run(RunInput::new("count words"))
        .await;
    assert!(outcome.is_done());

    let mut finished = None;
    let mut steps = 0;
    while let Ok(event) = rx.try_recv() {
        match event.as_ref() {
            DomainEvent::StepCompleted { .. } => steps += 1,
            DomainEvent::RunFinished { state, steps: n, .. } => finished = Some((state.clone(), *n)),
            _ => {}
        }
    }
    assert_eq!(steps, 2);
    assert_eq!(finished, Some(("done".to_string(), 2)));
}
