//! Wire and entity types shared across the GENESIS workspace.
//!
//! Nothing in this crate talks to a fabric, an LLM, or a socket; it only
//! defines the shapes other crates serialize, cache and route.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of process attached to the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantKind {
    Interface,
    Agent,
    Service,
}

/// Kind of entry carried on the advertisement bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvertKind {
    Agent,
    Function,
}

/// The bus keeps at most one live sample per `(advertiser_guid, kind, function_id?)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvertKey {
    pub advertiser_guid: Uuid,
    pub kind: AdvertKind,
    pub function_id: Option<String>,
}

impl AdvertKey {
    pub fn agent(advertiser_guid: Uuid) -> Self {
        Self { advertiser_guid, kind: AdvertKind::Agent, function_id: None }
    }

    pub fn function(advertiser_guid: Uuid, function_id: impl Into<String>) -> Self {
        Self { advertiser_guid, kind: AdvertKind::Function, function_id: Some(function_id.into()) }
    }
}

/// Payload carried by an `AGENT` advertisement.
///
/// Carries both endpoints an agent serves (§4.2's collision rule means they
/// are always distinct): `endpoint` is interface-facing, consumed by
/// `genesis-interface`; `agent_rpc_endpoint` is the `_AgentRPC`-suffixed
/// one `genesis-registry::AgentCommunication` resolves peer-agent calls
/// against (§4.4, §3's RemoteAgent note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAdvertPayload {
    pub name: String,
    pub endpoint: String,
    pub agent_rpc_endpoint: String,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Payload carried by a `FUNCTION` advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionAdvertPayload {
    pub function_id: String,
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
    pub provider_guid: Uuid,
    pub endpoint: String,
}

/// A full advertisement record as carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advertisement {
    pub key: AdvertKey,
    pub payload: serde_json::Value,
}

impl Advertisement {
    pub fn agent(advertiser_guid: Uuid, payload: &AgentAdvertPayload) -> Self {
        Self {
            key: AdvertKey::agent(advertiser_guid),
            payload: serde_json::to_value(payload).expect("AgentAdvertPayload is always representable as JSON"),
        }
    }

    pub fn function(payload: &FunctionAdvertPayload) -> Self {
        Self {
            key: AdvertKey::function(payload.provider_guid, payload.function_id.clone()),
            payload: serde_json::to_value(payload).expect("FunctionAdvertPayload is always representable as JSON"),
        }
    }
}

/// An add/update/remove notification delivered by [`genesis_fabric`](../genesis_fabric/index.html)'s
/// subscription stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdvertEvent {
    Add(Advertisement),
    Update(Advertisement),
    Remove(AdvertKey),
}

/// A remotely callable operation hosted by a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub function_id: String,
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub provider_guid: Uuid,
    pub endpoint: String,
}

impl From<FunctionAdvertPayload> for Function {
    fn from(p: FunctionAdvertPayload) -> Self {
        Self {
            function_id: p.function_id,
            name: p.name,
            description: p.description,
            schema: p.parameter_schema,
            provider_guid: p.provider_guid,
            endpoint: p.endpoint,
        }
    }
}

/// A peer agent reachable via agent-to-agent RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAgent {
    pub guid: Uuid,
    pub name: String,
    /// The agent-to-agent endpoint, already `_AgentRPC`-suffixed (see §4.4).
    pub endpoint: String,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl From<(Uuid, AgentAdvertPayload)> for RemoteAgent {
    fn from((guid, p): (Uuid, AgentAdvertPayload)) -> Self {
        Self {
            guid,
            name: p.name,
            endpoint: p.agent_rpc_endpoint,
            specializations: p.specializations,
            capabilities: p.capabilities,
        }
    }
}

/// A provider-specific tool description synthesized at request time.
/// Never cached across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Where a [`ToolSchema`] routes to; kept alongside the schema so routing
/// never has to re-derive it from the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolTarget {
    Internal,
    Agent { guid: Uuid },
    Function { function_id: String, provider_guid: Uuid, endpoint: String },
}

/// Role of a conversation item in the memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRole {
    User,
    Assistant,
    Tool,
    AssistantTool,
}

/// An item in the memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ConversationRole,
    pub content: String,
    pub tool_call_reference: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ConversationRole::User, content: content.into(), tool_call_reference: None, recorded_at: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ConversationRole::Assistant, content: content.into(), tool_call_reference: None, recorded_at: Utc::now() }
    }
}

/// Per-request state threaded through one call to `process_request`.
/// Created when a request arrives, destroyed on reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// Groups all activity causally derived from one user turn.
    pub chain_id: Uuid,
    pub source_guid: Uuid,
    pub target_guid: Uuid,
    pub turn_count: u32,
    pub messages: Vec<serde_json::Value>,
    pub tool_responses: Vec<serde_json::Value>,
}

impl RequestContext {
    pub fn new(source_guid: Uuid, target_guid: Uuid) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            chain_id: Uuid::now_v7(),
            source_guid,
            target_guid,
            turn_count: 0,
            messages: Vec::new(),
            tool_responses: Vec::new(),
        }
    }
}

/// Request payload for interface→agent and agent→agent invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub source_agent: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Reply payload: always `{message, status}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub message: String,
    pub status: i32,
}

impl AgentReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: 0 }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: 1 }
    }
}

/// RPC request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub request_id: Uuid,
    pub source_guid: Uuid,
    pub payload: serde_json::Value,
}

/// RPC reply envelope. `status == 0` is success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReply {
    pub request_id: Uuid,
    pub status: i32,
    pub payload: serde_json::Value,
}

/// Liveness state of a [`GraphNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Discovering,
    Ready,
    Busy,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub kind: ParticipantKind,
    pub state: NodeState,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    InterfaceAgent,
    AgentAgent,
    AgentService,
    ServiceFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub edge_key: String,
    pub kind: EdgeKind,
    pub source: Uuid,
    pub target: Uuid,
    pub metadata: serde_json::Value,
}

/// A durable topology sample: either a node or an edge, add/update/remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TopologyRecord {
    NodeUpsert(GraphNode),
    NodeRemove(Uuid),
    EdgeUpsert(GraphEdge),
    EdgeRemove(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Request,
    Response,
    Error,
    Start,
    Complete,
    Call,
    Result,
}

/// Transient monitoring record about one step in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub chain_id: Uuid,
    pub activity_type: ActivityType,
    pub source: Uuid,
    pub target: Uuid,
    pub operation: String,
    pub status: i32,
    pub duration_ms: u64,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ActivityEvent {
    pub fn new(chain_id: Uuid, activity_type: ActivityType, source: Uuid, target: Uuid, operation: impl Into<String>) -> Self {
        Self {
            chain_id,
            activity_type,
            source,
            target,
            operation: operation.into(),
            status: 0,
            duration_ms: 0,
            payload: serde_json::Value::Null,
            error: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = 1;
        self.error = Some(error.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// A snapshot of the graph as seen by a [`genesis_monitor`](../genesis_monitor/index.html) observer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: HashMap<Uuid, GraphNode>,
    pub edges: HashMap<String, GraphEdge>,
}
