//! Test doubles for the orchestrator's abstract dependencies, grounded on
//! the workspace's own "trait + mock" idiom. Used by this crate's
//! integration tests and re-exported for `genesis-service`/`genesis-interface`/
//! `genesis-monitor` to build the end-to-end scenarios of §8 without a real
//! LLM credential or network access.

use std::collections::VecDeque;

use async_trait::async_trait;
use genesis_schemas::ToolSchema;
use parking_lot::Mutex;

use crate::error::AgentError;
use crate::provider::{LlmMessage, ProviderAdapter, ProviderResponse, ToolCall, ToolChoicePolicy};

/// A scripted step for [`MockProviderAdapter`]: either a terminal text
/// response, or a set of tool calls to make before the next script step
/// runs.
#[derive(Debug, Clone)]
pub enum MockStep {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Error(String),
}

/// Returns a fixed, ordered script of responses regardless of what messages
/// it is called with — sufficient for the deterministic scenarios of §8,
/// matching the workspace's own `MockLlmProvider` idiom.
pub struct MockProviderAdapter {
    script: Mutex<VecDeque<MockStep>>,
    calls: Mutex<u32>,
}

impl MockProviderAdapter {
    pub fn new(steps: impl IntoIterator<Item = MockStep>) -> Self {
        Self { script: Mutex::new(steps.into_iter().collect()), calls: Mutex::new(0) }
    }

    /// A provider that always returns the same terminal text (S1 fixture).
    pub fn always_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { script: Mutex::new(VecDeque::from([MockStep::Text(text)])), calls: Mutex::new(0) }
    }

    /// A provider that always returns a tool call (S5 loop-exhaustion fixture).
    pub fn always_tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let call = ToolCall { call_id: "call_1".to_string(), name: name.into(), arguments };
        Self { script: Mutex::new(VecDeque::from([MockStep::ToolCalls(vec![call])])), calls: Mutex::new(0) }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }

    fn next_step(&self) -> MockStep {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().expect("len > 1 implies non-empty")
        } else {
            script.front().cloned().unwrap_or(MockStep::Text(String::new()))
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    async fn call_llm(
        &self,
        _messages: &[LlmMessage],
        _tools: &[ToolSchema],
        tool_choice: ToolChoicePolicy,
    ) -> Result<ProviderResponse, AgentError> {
        assert_eq!(tool_choice, ToolChoicePolicy::Auto, "the orchestrator must always call with tool_choice=auto");
        *self.calls.lock() += 1;

        match self.next_step() {
            MockStep::Text(text) => Ok(ProviderResponse { text: Some(text), tool_calls: Vec::new(), raw: serde_json::Value::Null }),
            MockStep::ToolCalls(tool_calls) => Ok(ProviderResponse { text: None, tool_calls, raw: serde_json::Value::Null }),
            MockStep::Error(reason) => Err(AgentError::provider(reason)),
        }
    }

    fn format_messages(&self, user_message: &str, system_prompt: &str, memory_excerpt: &[LlmMessage]) -> Vec<LlmMessage> {
        let mut messages = vec![LlmMessage::system(system_prompt)];
        messages.extend_from_slice(memory_excerpt);
        messages.push(LlmMessage::user(user_message));
        messages
    }

    fn build_assistant_turn(&self, response: &ProviderResponse) -> LlmMessage {
        let mut turn = LlmMessage::assistant(response.text.clone().unwrap_or_default());
        turn.tool_calls = response.tool_calls.clone();
        turn
    }
}
