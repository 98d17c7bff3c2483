//! GenesisAgent (§4.5): the provider-agnostic request pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use genesis_fabric::SharedFabric;
use genesis_registry::{rpc_handler, AgentCommunication, FunctionRegistry};
use genesis_schemas::{AgentReply, AgentRequest, ConversationTurn, ToolSchema, ToolTarget};
use serde_json::Value;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{AgentError, ToolRouteError};
use crate::memory::{filter_for_context, MemoryAdapter};
use crate::provider::{LlmMessage, ProviderAdapter, ToolCall, ToolChoicePolicy};
use crate::tools::{validate_arguments, InternalTool, InternalToolSet};

/// Derives an agent-as-tool name from the peer's capabilities, never its
/// name, so the prompt is stable across agent restarts with a new name
/// (§4.5 "name derived from capabilities (not agent names)").
fn capability_tool_name(capabilities: &[String]) -> String {
    let capability = capabilities.first().map(String::as_str).unwrap_or("general");
    let slug: String = capability
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("get_{slug}_info")
}

/// Parameter schema shared by every synthesized agent-as-tool entry, kept in
/// one place so `route_tool_call`'s `ToolTarget::Agent` branch can validate
/// against the exact contract `agent_tool_schema` advertises.
fn agent_tool_parameters() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": { "message": { "type": "string" } },
        "required": ["message"],
    })
}

fn agent_tool_schema(name: String, capabilities: &[String]) -> ToolSchema {
    let summary = if capabilities.is_empty() { "general assistance".to_string() } else { capabilities.join(", ") };
    ToolSchema {
        name,
        description: format!("Delegates to a peer agent specialized in: {summary}"),
        parameters: agent_tool_parameters(),
    }
}

/// Inserts `schema`/`target` into the accumulating tool set, resolving a
/// name collision by appending `guid`'s suffix (§3 ToolSchema invariant).
fn insert_tool(
    seen: &mut HashSet<String>,
    schemas: &mut Vec<ToolSchema>,
    targets: &mut HashMap<String, ToolTarget>,
    mut schema: ToolSchema,
    target: ToolTarget,
    guid_for_suffix: Option<Uuid>,
) {
    if seen.contains(&schema.name) {
        if let Some(guid) = guid_for_suffix {
            schema.name = format!("{}_{}", schema.name, guid);
        }
    }
    seen.insert(schema.name.clone());
    targets.insert(schema.name.clone(), target);
    schemas.push(schema);
}

pub struct GenesisAgentBuilder {
    config: AgentConfig,
    provider: Arc<dyn ProviderAdapter>,
    memory: Arc<dyn MemoryAdapter>,
    fabric: SharedFabric,
    internal_tools: InternalToolSet,
}

impl GenesisAgentBuilder {
    pub fn new(config: AgentConfig, provider: Arc<dyn ProviderAdapter>, memory: Arc<dyn MemoryAdapter>, fabric: SharedFabric) -> Self {
        Self { config, provider, memory, fabric, internal_tools: InternalToolSet::new() }
    }

    pub fn register_internal_tool(mut self, tool: Arc<dyn InternalTool>) -> Self {
        self.internal_tools.register(tool);
        self
    }

    /// Fails fast (§4.2 collision rule / S6) rather than publishing a
    /// partial advertisement.
    pub fn build(self) -> Result<Arc<GenesisAgent>, AgentError> {
        self.config.validate().map_err(AgentError::EndpointCollision)?;
        let function_registry = FunctionRegistry::spawn(self.fabric.clone());
        let agent_comm = AgentCommunication::spawn(self.fabric.clone(), self.config.guid, &self.config.endpoint);
        Ok(Arc::new(GenesisAgent {
            config: self.config,
            provider: self.provider,
            memory: self.memory,
            fabric: self.fabric,
            function_registry,
            agent_comm,
            internal_tools: self.internal_tools,
        }))
    }
}

pub struct GenesisAgent {
    config: AgentConfig,
    provider: Arc<dyn ProviderAdapter>,
    memory: Arc<dyn MemoryAdapter>,
    fabric: SharedFabric,
    function_registry: Arc<FunctionRegistry>,
    agent_comm: Arc<AgentCommunication>,
    internal_tools: InternalToolSet,
}

impl GenesisAgent {
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn function_registry(&self) -> &Arc<FunctionRegistry> {
        &self.function_registry
    }

    pub fn agent_communication(&self) -> &Arc<AgentCommunication> {
        &self.agent_comm
    }

    /// Serves this agent's interface-facing and agent-to-agent endpoints and
    /// advertises its presence. Idempotent only in the sense that a second
    /// call fails with `FabricError::EndpointCollision`, matching §4.2.
    pub async fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let agent = self.clone();
        let handler = rpc_handler(move |_info, payload| {
            let agent = agent.clone();
            async move {
                let request: AgentRequest = match serde_json::from_value(payload) {
                    Ok(r) => r,
                    Err(err) => {
                        let reply = AgentReply::failed(format!("malformed request: {err}"));
                        return (reply.status, serde_json::to_value(&reply).unwrap_or(Value::Null));
                    }
                };
                let reply = agent.process_request(request).await;
                (reply.status, serde_json::to_value(&reply).unwrap_or(Value::Null))
            }
        });

        self.fabric.serve(&self.config.endpoint, handler.clone()).await?;
        self.agent_comm
            .advertise_self(
                &self.config.name,
                &self.config.endpoint,
                self.config.specializations.clone(),
                self.config.capabilities.clone(),
                handler,
            )
            .await?;
        Ok(())
    }

    /// §4.5 pipeline steps 1–3: discover internal/external/peer tools and
    /// compose the full tool set with collision resolution.
    fn build_tool_set(&self) -> (Vec<ToolSchema>, HashMap<String, ToolTarget>) {
        let mut schemas = Vec::new();
        let mut targets = HashMap::new();
        let mut seen = HashSet::new();

        for schema in self.internal_tools.schemas() {
            insert_tool(&mut seen, &mut schemas, &mut targets, schema, ToolTarget::Internal, None);
        }

        for function in self.function_registry.get().into_values() {
            let schema = ToolSchema { name: function.name.clone(), description: function.description.clone(), parameters: function.schema.clone() };
            let target = ToolTarget::Function {
                function_id: function.function_id.clone(),
                provider_guid: function.provider_guid,
                endpoint: function.endpoint.clone(),
            };
            insert_tool(&mut seen, &mut schemas, &mut targets, schema, target, Some(function.provider_guid));
        }

        for agent in self.agent_comm.get().into_values() {
            let name = capability_tool_name(&agent.capabilities);
            let schema = agent_tool_schema(name, &agent.capabilities);
            insert_tool(&mut seen, &mut schemas, &mut targets, schema, ToolTarget::Agent { guid: agent.guid }, Some(agent.guid));
        }

        (schemas, targets)
    }

    async fn memory_excerpt(&self, conversation_id: &str) -> Vec<LlmMessage> {
        let items = self.memory.retrieve(conversation_id, self.config.memory_window_k).await.unwrap_or_else(|err| {
            tracing::error!(%err, "memory retrieve failed");
            Vec::new()
        });
        filter_for_context(&items)
            .into_iter()
            .map(|turn| match turn.role {
                genesis_schemas::ConversationRole::User => LlmMessage::user(turn.content.clone()),
                _ => LlmMessage::assistant(turn.content.clone()),
            })
            .collect()
    }

    /// The sole public operation (§4.5). Never panics; every failure mode
    /// maps to a `{message, status}` reply per §7.
    pub async fn process_request(&self, request: AgentRequest) -> AgentReply {
        let conversation_id = request.conversation_id.clone().unwrap_or_else(|| self.config.guid.to_string());
        let chain_id = Uuid::now_v7();

        let (tool_schemas, tool_targets) = self.build_tool_set();

        if tool_schemas.is_empty() {
            self.run_no_tool_path(&conversation_id, &request.message).await
        } else {
            self.run_tool_loop(&conversation_id, chain_id, &request.message, tool_schemas, tool_targets).await
        }
    }

    async fn run_no_tool_path(&self, conversation_id: &str, user_message: &str) -> AgentReply {
        let memory_excerpt = self.memory_excerpt(conversation_id).await;
        if let Err(err) = self.memory.write(conversation_id, ConversationTurn::user(user_message)).await {
            tracing::error!(%err, "failed to record user turn to memory");
        }
        let messages = self.provider.format_messages(user_message, &self.config.general_prompt, &memory_excerpt);

        match self.provider.call_llm(&messages, &[], ToolChoicePolicy::Auto).await {
            Ok(response) => {
                let text = self.provider.extract_text(&response).unwrap_or_default();
                if let Err(err) = self.memory.write(conversation_id, ConversationTurn::assistant(text.clone())).await {
                    tracing::error!(%err, "failed to record assistant turn to memory");
                }
                AgentReply::ok(text)
            }
            Err(err) => {
                tracing::error!(%err, "provider call failed on the no-tool path");
                AgentReply::failed(err.user_message())
            }
        }
    }

    /// The multi-turn tool-calling state machine: THINKING → EXECUTING_TOOLS
    /// → DONE | FAILED, bounded by `config.max_turns`.
    async fn run_tool_loop(
        &self,
        conversation_id: &str,
        chain_id: Uuid,
        user_message: &str,
        tool_schemas: Vec<ToolSchema>,
        tool_targets: HashMap<String, ToolTarget>,
    ) -> AgentReply {
        let memory_excerpt = self.memory_excerpt(conversation_id).await;
        if let Err(err) = self.memory.write(conversation_id, ConversationTurn::user(user_message)).await {
            tracing::error!(%err, "failed to record user turn to memory");
        }
        let mut messages = self.provider.format_messages(user_message, &self.config.function_based_prompt, &memory_excerpt);
        let mut turn_count: u32 = 0;
        let mut last_text: Option<String> = None;

        loop {
            // THINKING — `tool_choice` is always `auto`: a `required` policy
            // can never produce a terminal text turn (§4.5 rationale).
            let response = match self.provider.call_llm(&messages, &tool_schemas, ToolChoicePolicy::Auto).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(%err, "provider call failed inside the tool loop");
                    return AgentReply::failed(err.user_message());
                }
            };

            let tool_calls = self.provider.extract_tool_calls(&response);
            if tool_calls.is_empty() {
                let text = self.provider.extract_text(&response).unwrap_or_default();
                if let Err(err) = self.memory.write(conversation_id, ConversationTurn::assistant(text.clone())).await {
                    tracing::error!(%err, "failed to record assistant turn to memory");
                }
                return AgentReply::ok(text); // DONE
            }

            last_text = self.provider.extract_text(&response);
            messages.push(self.provider.build_assistant_turn(&response));

            // EXECUTING_TOOLS — calls are routed and answered in order
            // (§8 invariant 4); a failed call becomes an error tool-response
            // rather than aborting the loop.
            for call in &tool_calls {
                let content = match self.route_tool_call(&tool_targets, chain_id, call).await {
                    Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string()),
                    Err(err) => {
                        tracing::warn!(tool = %call.name, %err, "tool call failed, recording error tool-response");
                        format!("{{\"error\":{}}}", serde_json::to_string(&err.to_string()).unwrap())
                    }
                };
                messages.push(LlmMessage::tool_response(call.call_id.clone(), content));
            }

            turn_count += 1;
            if turn_count >= self.config.max_turns {
                let err = AgentError::loop_exhaustion(turn_count, last_text);
                tracing::error!(%err, "turn budget exhausted");
                return AgentReply { message: err.user_message(), status: err.status() }; // FAILED
            }
            // else loop back to THINKING
        }
    }

    /// `route_tool_call(name, args)` (§4.5): internal tool, then peer agent,
    /// then function, else a structured error.
    async fn route_tool_call(
        &self,
        targets: &HashMap<String, ToolTarget>,
        chain_id: Uuid,
        call: &ToolCall,
    ) -> Result<Value, ToolRouteError> {
        let target = targets.get(&call.name).ok_or_else(|| ToolRouteError::Unknown(call.name.clone()))?;

        match target {
            ToolTarget::Internal => {
                let tool = self.internal_tools.get(&call.name).ok_or_else(|| ToolRouteError::Unknown(call.name.clone()))?;
                validate_arguments(&tool.schema().parameters, &call.arguments)
                    .map_err(|reason| ToolRouteError::InvalidArguments { name: call.name.clone(), reason })?;
                tool.call(call.arguments.clone())
                    .await
                    .map_err(|err| ToolRouteError::InternalFailure(call.name.clone(), err.to_string()))
            }
            ToolTarget::Agent { guid } => {
                validate_arguments(&agent_tool_parameters(), &call.arguments)
                    .map_err(|reason| ToolRouteError::InvalidArguments { name: call.name.clone(), reason })?;
                let message = call.arguments.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
                let payload = serde_json::to_value(AgentRequest {
                    message,
                    conversation_id: Some(chain_id.to_string()),
                    source_agent: Some(self.config.guid.to_string()),
                    metadata: None,
                })
                .expect("AgentRequest is always representable as JSON");
                self.agent_comm
                    .send_agent_request(*guid, payload, self.config.tool_timeout())
                    .await
                    .map_err(ToolRouteError::from)
            }
            ToolTarget::Function { function_id, endpoint, .. } => {
                let payload = serde_json::json!({ "function_id": function_id, "arguments": call.arguments });
                self.fabric.connect(endpoint, self.config.tool_timeout()).await?;
                let reply = self.fabric.call(endpoint, payload, self.config.tool_timeout()).await?;
                if reply.status != 0 {
                    return Err(ToolRouteError::InternalFailure(call.name.clone(), format!("remote status {}", reply.status)));
                }
                Ok(reply.payload)
            }
        }
    }
}
