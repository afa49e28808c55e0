//! Shared test helpers for agent loop tests.

use ragent_core::document::Chunk;
use ragent_core::error::ProviderError;
use ragent_core::message::{Message, MessageToolCall};
use ragent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use ragent_core::vector_store::ScoredChunk;
use std::sync::Mutex;
use std::time::Duration;

enum Script {
    Sequence(Vec<ProviderResponse>),
    Repeat(ProviderResponse),
    Fail(ProviderError),
}

/// A provider that plays back scripted responses and records every request.
///
/// Panics if a sequence runs out.
pub struct ScriptedProvider {
    script: Script,
    delay: Option<Duration>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_script(Script::Sequence(responses))
    }

    /// Answer every call with the same response.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self::with_script(Script::Repeat(response))
    }

    /// Fail every call.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        match &self.script {
            Script::Sequence(responses) => match responses.get(call) {
                Some(r) => Ok(r.clone()),
                None => panic!(
                    "ScriptedProvider: no more responses (call #{call}, have {})",
                    responses.len()
                ),
            },
            Script::Repeat(r) => Ok(r.clone()),
            Script::Fail(e) => Err(e.clone()),
        }
    }
}

/// A plain text response (no native tool calls).
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted-model".into(),
    }
}

/// A response carrying native tool calls.
pub fn tool_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut message = Message::assistant(thought);
    message.tool_calls = tool_calls;
    ProviderResponse {
        message,
        usage: None,
        model: "scripted-model".into(),
    }
}

pub fn tool_call(name: &str, arguments: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.into(),
        arguments: arguments.to_string(),
    }
}

/// A retrieved chunk with id `{document_id}#0`.
pub fn scored_chunk(document_id: &str, text: &str, score: f32) -> ScoredChunk {
    ScoredChunk {
        chunk: Chunk {
            id: Chunk::make_id(document_id, 0),
            document_id: document_id.into(),
            index: 0,
            text: text.into(),
            offset_range: 0..text.len(),
            metadata: Default::default(),
        },
        score,
    }
}
