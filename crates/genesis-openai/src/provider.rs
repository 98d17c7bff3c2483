//! ProviderAdapter leaf for an OpenAI-compatible chat-completions API.
//!
//! Kept thin per §9: no orchestration, routing, or monitoring logic lives
//! here, only request/response translation.

use std::collections::BTreeMap;
use std::env;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use genesis_core::{AgentError, LlmMessage, MessageRole, ProviderAdapter, ProviderResponse, ToolCall, ToolChoicePolicy};
use genesis_schemas::ToolSchema;
use serde_json::Value;

use crate::wire::{ChatChunk, ChatMessage, ChatRequest, FunctionDef, ToolDef, WireFunctionCall, WireToolCall};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: DEFAULT_BASE_URL.to_string(), api_key: api_key.into(), model: model.into() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Reads `OPENAI_API_KEY` once at construction; never re-read per call.
    pub fn from_env(model: impl Into<String>) -> Result<Self, anyhow::Error> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        Ok(Self::new(api_key, model))
    }

    fn wire_message(message: &LlmMessage) -> ChatMessage {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        ChatMessage {
            role,
            content: if message.content.is_empty() && !message.tool_calls.is_empty() { None } else { Some(message.content.clone()) },
            tool_call_id: message.tool_call_id.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.call_id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall { name: call.name.clone(), arguments: call.arguments.to_string() },
                })
                .collect(),
        }
    }

    fn wire_tool_choice(policy: ToolChoicePolicy) -> Value {
        match policy {
            ToolChoicePolicy::Auto => Value::String("auto".to_string()),
            ToolChoicePolicy::Required => Value::String("required".to_string()),
            ToolChoicePolicy::None => Value::String("none".to_string()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn call_llm(&self, messages: &[LlmMessage], tools: &[ToolSchema], tool_choice: ToolChoicePolicy) -> Result<ProviderResponse, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(Self::wire_message).collect(),
            tools: tools
                .iter()
                .map(|t| ToolDef { kind: "function", function: FunctionDef { name: t.name.clone(), description: t.description.clone(), parameters: t.parameters.clone() } })
                .collect(),
            tool_choice: if tools.is_empty() { None } else { Some(Self::wire_tool_choice(tool_choice)) },
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| AgentError::provider(format!("openai request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::provider(format!("openai returned {status}: {body}")));
        }

        let mut content = String::new();
        let mut tool_calls: BTreeMap<usize, (Option<String>, String, String)> = BTreeMap::new();
        let mut stream = response.bytes_stream().eventsource();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|err| AgentError::provider(format!("openai stream error: {err}")))?;
            if event.data == "[DONE]" {
                break;
            }
            let chunk: ChatChunk = serde_json::from_str(&event.data)
                .map_err(|err| AgentError::provider(format!("malformed openai chunk: {err}")))?;
            for choice in chunk.choices {
                if let Some(text) = choice.delta.content {
                    content.push_str(&text);
                }
                for delta in choice.delta.tool_calls {
                    let entry = tool_calls.entry(delta.index).or_insert_with(|| (None, String::new(), String::new()));
                    if let Some(id) = delta.id {
                        entry.0 = Some(id);
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            entry.1.push_str(&name);
                        }
                        if let Some(arguments) = function.arguments {
                            entry.2.push_str(&arguments);
                        }
                    }
                }
            }
        }

        let resolved_calls: Vec<ToolCall> = tool_calls
            .into_values()
            .map(|(id, name, arguments)| ToolCall {
                call_id: id.unwrap_or_default(),
                name,
                arguments: serde_json::from_str(&arguments).unwrap_or(Value::Object(Default::default())),
            })
            .collect();

        Ok(ProviderResponse {
            text: if content.is_empty() { None } else { Some(content) },
            tool_calls: resolved_calls,
            raw: Value::Null,
        })
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tool_choice_maps_auto() {
        assert_eq!(OpenAiProvider::wire_tool_choice(ToolChoicePolicy::Auto), Value::String("auto".into()));
    }

    #[test]
    fn wire_message_omits_content_for_pure_tool_call_turns() {
        let mut msg = LlmMessage::assistant("");
        msg.tool_calls = vec![ToolCall { call_id: "c1".into(), name: "add".into(), arguments: serde_json::json!({}) }];
        let wire = OpenAiProvider::wire_message(&msg);
        assert!(wire.content.is_none());
        assert_eq!(wire.tool_calls.len(), 1);
    }
}
