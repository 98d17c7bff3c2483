//! ProviderAdapter (§4.6): the seven abstract operations the orchestrator
//! consumes, provider-agnostic.

use async_trait::async_trait;
use genesis_schemas::ToolSchema;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the provider-facing conversation, after `format_messages`
/// has assembled it from user input, system prompt and memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
    /// Present on `Tool` messages: which call this answers.
    pub tool_call_id: Option<String>,
    /// Present on `Assistant` messages that requested tool calls; carried
    /// verbatim so the provider can echo back whatever shape it needs for
    /// the next turn's `tool` messages to correlate by id.
    pub tool_calls: Vec<ToolCall>,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
    }

    pub fn tool_response(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: MessageRole::Tool, content: content.into(), tool_call_id: Some(tool_call_id.into()), tool_calls: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// How the orchestrator asks the provider to constrain tool use on this
/// call. The orchestrator's multi-turn loop always uses `Auto` (§4.5
/// rationale: any other policy can strand the loop with no terminal text
/// turn) — the other variants exist for provider adapters whose wire format
/// needs to name them, and for direct (non-loop) callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoicePolicy {
    Auto,
    Required,
    None,
}

/// The orchestrator's uniform view of a provider's response: either
/// terminal text, or a set of tool calls to route before the next turn.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// Provider-specific response payload, kept so `build_assistant_turn`
    /// can losslessly reconstruct the assistant message shape that turn's
    /// `tool` responses must correlate against.
    pub raw: serde_json::Value,
}

impl ProviderResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One concrete implementation per LLM vendor. Adding a provider is a leaf
/// task: it must not require changes to orchestration, routing, or
/// monitoring code (§9 "keep provider leaves thin").
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Calls the LLM with the given messages, tool schemas and tool-choice
    /// policy.
    async fn call_llm(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSchema],
        tool_choice: ToolChoicePolicy,
    ) -> Result<ProviderResponse, AgentError>;

    /// Assembles the provider-facing message list from user input, system
    /// prompt, and the role-filtered memory excerpt (§4.5 memory context
    /// rule is applied by the caller before this is invoked; this only
    /// formats what it is given).
    fn format_messages(&self, user_message: &str, system_prompt: &str, memory_excerpt: &[LlmMessage]) -> Vec<LlmMessage>;

    /// Extracts terminal text from a response, if any.
    fn extract_text(&self, response: &ProviderResponse) -> Option<String> {
        response.text.clone()
    }

    /// Extracts tool calls from a response, if any.
    fn extract_tool_calls(&self, response: &ProviderResponse) -> Vec<ToolCall> {
        response.tool_calls.clone()
    }

    /// Builds the assistant message to append to `messages` for a response
    /// that produced tool calls, so the following `tool` messages correlate
    /// by `call_id` (§8 invariant 6).
    fn build_assistant_turn(&self, response: &ProviderResponse) -> LlmMessage;

    /// This provider's synthesis of `tool_schemas()` into its own wire
    /// format is internal to `call_llm`; this method exists on the trait
    /// only so adapters that need to pre-serialize schemas once per call can
    /// do so, rather than re-deriving the shape inline.
    fn tool_choice_policy(&self) -> ToolChoicePolicy {
        ToolChoicePolicy::Auto
    }
}
