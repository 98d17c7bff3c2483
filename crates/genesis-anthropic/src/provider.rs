//! ProviderAdapter leaf for the Anthropic Messages API. Kept thin per §9.

use std::collections::BTreeMap;
use std::env;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use genesis_core::{AgentError, LlmMessage, MessageRole, ProviderAdapter, ProviderResponse, ToolCall, ToolChoicePolicy};
use genesis_schemas::ToolSchema;
use serde_json::Value;

use crate::wire::{ContentBlock, ContentBlockStart, ContentDelta, MessagesRequest, StreamEvent, ToolDef, WireMessage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: DEFAULT_BASE_URL.to_string(), api_key: api_key.into(), model: model.into() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, anyhow::Error> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?;
        Ok(Self::new(api_key, model))
    }

    fn to_wire_messages(messages: &[LlmMessage]) -> (Option<String>, Vec<WireMessage>) {
        let mut system = None;
        let mut wire = Vec::new();
        let mut pending_tool_results = Vec::new();

        for message in messages {
            match message.role {
                MessageRole::System => system = Some(message.content.clone()),
                MessageRole::User => {
                    Self::flush_tool_results(&mut wire, &mut pending_tool_results);
                    wire.push(WireMessage { role: "user", content: vec![ContentBlock::Text { text: message.content.clone() }] });
                }
                MessageRole::Assistant => {
                    Self::flush_tool_results(&mut wire, &mut pending_tool_results);
                    let mut blocks = Vec::new();
                    if !message.content.is_empty() {
                        blocks.push(ContentBlock::Text { text: message.content.clone() });
                    }
                    for call in &message.tool_calls {
                        blocks.push(ContentBlock::ToolUse { id: call.call_id.clone(), name: call.name.clone(), input: call.arguments.clone() });
                    }
                    wire.push(WireMessage { role: "assistant", content: blocks });
                }
                MessageRole::Tool => {
                    pending_tool_results.push(ContentBlock::ToolResult {
                        tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                        content: message.content.clone(),
                    });
                }
            }
        }
        Self::flush_tool_results(&mut wire, &mut pending_tool_results);
        (system, wire)
    }

    fn flush_tool_results(wire: &mut Vec<WireMessage>, pending: &mut Vec<ContentBlock>) {
        if !pending.is_empty() {
            wire.push(WireMessage { role: "user", content: std::mem::take(pending) });
        }
    }

    fn wire_tool_choice(policy: ToolChoicePolicy) -> Value {
        match policy {
            ToolChoicePolicy::Auto => serde_json::json!({"type": "auto"}),
            ToolChoicePolicy::Required => serde_json::json!({"type": "any"}),
            ToolChoicePolicy::None => serde_json::json!({"type": "none"}),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn call_llm(&self, messages: &[LlmMessage], tools: &[ToolSchema], tool_choice: ToolChoicePolicy) -> Result<ProviderResponse, AgentError> {
        let (system, wire_messages) = Self::to_wire_messages(messages);
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system,
            messages: wire_messages,
            tools: tools.iter().map(|t| ToolDef { name: t.name.clone(), description: t.description.clone(), input_schema: t.parameters.clone() }).collect(),
            tool_choice: if tools.is_empty() { None } else { Some(Self::wire_tool_choice(tool_choice)) },
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|err| AgentError::provider(format!("anthropic request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::provider(format!("anthropic returned {status}: {body}")));
        }

        let mut text = String::new();
        // index -> (tool_use_id, name, accumulated partial json)
        let mut tool_blocks: BTreeMap<usize, (String, String, String)> = BTreeMap::new();
        let mut stream = response.bytes_stream().eventsource();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|err| AgentError::provider(format!("anthropic stream error: {err}")))?;
            if event.data.is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<StreamEvent>(&event.data) else { continue };
            match parsed {
                StreamEvent::ContentBlockStart { index: _, content_block: ContentBlockStart::Text { text: initial } } => {
                    text.push_str(&initial);
                }
                StreamEvent::ContentBlockStart { index, content_block: ContentBlockStart::ToolUse { id, name } } => {
                    tool_blocks.insert(index, (id, name, String::new()));
                }
                StreamEvent::ContentBlockDelta { index: _, delta: ContentDelta::TextDelta { text: delta_text } } => {
                    text.push_str(&delta_text);
                }
                StreamEvent::ContentBlockDelta { index, delta: ContentDelta::InputJsonDelta { partial_json } } => {
                    if let Some(entry) = tool_blocks.get_mut(&index) {
                        entry.2.push_str(&partial_json);
                    }
                }
                StreamEvent::Other => {}
            }
        }

        let tool_calls: Vec<ToolCall> = tool_blocks
            .into_values()
            .map(|(id, name, json)| ToolCall {
                call_id: id,
                name,
                arguments: if json.is_empty() { Value::Object(Default::default()) } else { serde_json::from_str(&json).unwrap_or(Value::Object(Default::default())) },
            })
            .collect();

        Ok(ProviderResponse { text: if text.is_empty() { None } else { Some(text) }, tool_calls, raw: Value::Null })
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
    fn to_wire_messages_groups_consecutive_tool_results_into_one_user_turn() {
        let messages = vec![
            LlmMessage::user("add 2 and 3, then 4 and 5"),
            {
                let mut m = LlmMessage::assistant("");
                m.tool_calls = vec![
                    ToolCall { call_id: "1".into(), name: "add".into(), arguments: serde_json::json!({}) },
                    ToolCall { call_id: "2".into(), name: "add".into(), arguments: serde_json::json!({}) },
                ];
                m
            },
            LlmMessage::tool_response("1", "5"),
            LlmMessage::tool_response("2", "9"),
        ];
        let (_, wire) = AnthropicProvider::to_wire_messages(&messages);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[2].content.len(), 2, "both tool results should collapse into one user turn");
    }

    #[test]
    fn wire_tool_choice_maps_required_to_any() {
        assert_eq!(AnthropicProvider::wire_tool_choice(ToolChoicePolicy::Required), serde_json::json!({"type": "any"}));
    }
}
