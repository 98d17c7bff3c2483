//! MonitoredAgent (§4.7): a thin, additive wrapper over GenesisAgent that
//! emits topology nodes/edges and activity events. The wrapped agent's
//! behavior is unchanged whether or not monitoring is attached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use genesis_core::GenesisAgent;
use genesis_fabric::{Fabric, SharedFabric};
use genesis_schemas::{
    ActivityEvent, ActivityType, AgentReply, AgentRequest, EdgeKind, GraphEdge, GraphNode, NodeState,
    ParticipantKind, TopologyRecord,
};
use parking_lot::Mutex;
use uuid::Uuid;

/// Discovery warm-up window before the node transitions `DISCOVERING` → `READY` (§5).
pub const DISCOVERY_WARMUP: Duration = Duration::from_secs(2);

pub struct MonitoredAgent {
    agent: Arc<GenesisAgent>,
    fabric: SharedFabric,
    state: Mutex<NodeState>,
}

impl MonitoredAgent {
    pub fn new(agent: Arc<GenesisAgent>, fabric: SharedFabric) -> Arc<Self> {
        Arc::new(Self { agent, fabric, state: Mutex::new(NodeState::Discovering) })
    }

    pub fn inner(&self) -> &Arc<GenesisAgent> {
        &self.agent
    }

    fn guid(&self) -> Uuid {
        self.agent.config().guid
    }

    async fn publish_node_state(&self, state: NodeState) {
        *self.state.lock() = state;
        let node = GraphNode { id: self.guid(), kind: ParticipantKind::Agent, state, metadata: serde_json::json!({"name": self.agent.config().name}) };
        if let Err(err) = self.fabric.publish_topology(TopologyRecord::NodeUpsert(node)).await {
            tracing::error!(%err, "failed to publish node state");
        }
    }

    /// Starts the wrapped agent's RPC endpoints, publishes `DISCOVERING`,
    /// then transitions to `READY` after the discovery warm-up window, and
    /// finally wires the discovery → edge-emission callbacks.
    pub async fn start(self: &Arc<Self>) -> Result<(), genesis_core::AgentError> {
        self.agent.start().await?;
        self.publish_node_state(NodeState::Discovering).await;

        let self_for_functions = self.clone();
        self.agent.function_registry().on_function_discovered(move |function| {
            let edge = GraphEdge {
                edge_key: format!("{}->service:{}", self_for_functions.guid(), function.provider_guid),
                kind: EdgeKind::AgentService,
                source: self_for_functions.guid(),
                target: function.provider_guid,
                metadata: serde_json::json!({"function_id": function.function_id}),
            };
            let fabric = self_for_functions.fabric.clone();
            tokio::spawn(async move {
                let _ = fabric.publish_topology(TopologyRecord::EdgeUpsert(edge)).await;
            });
        });

        let self_for_agents = self.clone();
        self.agent.agent_communication().on_agent_discovered(move |remote| {
            let edge = GraphEdge {
                edge_key: format!("{}->agent:{}", self_for_agents.guid(), remote.guid),
                kind: EdgeKind::AgentAgent,
                source: self_for_agents.guid(),
                target: remote.guid,
                metadata: serde_json::json!({}),
            };
            let fabric = self_for_agents.fabric.clone();
            tokio::spawn(async move {
                let _ = fabric.publish_topology(TopologyRecord::EdgeUpsert(edge)).await;
            });
        });

        let self_clone = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DISCOVERY_WARMUP).await;
            self_clone.publish_node_state(NodeState::Ready).await;
        });

        Ok(())
    }

    /// Wraps `GenesisAgent::process_request` with the BUSY/READY/DEGRADED
    /// transitions and REQUEST/RESPONSE/ERROR activity events. Rejects
    /// requests arriving before the discovery warm-up completes (§5: "2s
    /// before first acceptance of requests") with a distinct status rather
    /// than dispatching straight through to the wrapped agent.
    pub async fn process_request(&self, request: AgentRequest) -> AgentReply {
        if *self.state.lock() == NodeState::Discovering {
            return AgentReply { message: "agent is still warming up, not yet accepting requests".to_string(), status: 2 };
        }

        let chain_id = Uuid::now_v7();
        let started = Instant::now();
        self.publish_node_state(NodeState::Busy).await;

        let _ = self
            .fabric
            .publish_activity(ActivityEvent::new(chain_id, ActivityType::Request, self.guid(), self.guid(), "process_request"))
            .await;

        let reply = self.agent.process_request(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let activity_type = if reply.status == 0 { ActivityType::Response } else { ActivityType::Error };
        let mut event = ActivityEvent::new(chain_id, activity_type, self.guid(), self.guid(), "process_request").with_duration(duration_ms);
        if reply.status != 0 {
            event = event.with_error(reply.message.clone());
        }
        let _ = self.fabric.publish_activity(event).await;

        self.publish_node_state(if reply.status == 0 { NodeState::Ready } else { NodeState::Degraded }).await;
        reply
    }

    /// Disposes all owned nodes and edges (§4.7 "on shutdown"). Edge
    /// disposal is best-effort: the monitor does not track every edge key it
    /// has ever emitted, only its own node.
    pub async fn shutdown(&self) {
        if let Err(err) = self.fabric.publish_topology(TopologyRecord::NodeRemove(self.guid())).await {
            tracing::error!(%err, "failed to dispose node on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use genesis_core::mock::MockProviderAdapter;
    use genesis_core::{AgentConfig, GenesisAgentBuilder, InMemoryMemoryAdapter};
    use genesis_fabric::local::LocalFabric;

    #[tokio::test(start_paused = true)]
    async fn process_request_rejects_requests_during_discovery_warmup() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let provider = Arc::new(MockProviderAdapter::always_text("hi"));
        let memory = Arc::new(InMemoryMemoryAdapter::new());
        let config = AgentConfig::new("alpha", "alpha_svc");
        let agent = GenesisAgentBuilder::new(config, provider, memory, fabric.clone()).build().unwrap();
        let monitored = MonitoredAgent::new(agent, fabric.clone());
        monitored.start().await.unwrap();

        let reply = monitored.process_request(AgentRequest { message: "hi".into(), conversation_id: None, source_agent: None, metadata: None }).await;
        assert_eq!(reply.status, 2, "a request arriving before the warm-up window elapses must be rejected, not dispatched");
    }

    #[tokio::test(start_paused = true)]
    async fn process_request_emits_request_and_response_activity() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let provider = Arc::new(MockProviderAdapter::always_text("hi"));
        let memory = Arc::new(InMemoryMemoryAdapter::new());
        let config = AgentConfig::new("alpha", "alpha_svc");
        let agent = GenesisAgentBuilder::new(config, provider, memory, fabric.clone()).build().unwrap();
        let monitored = MonitoredAgent::new(agent, fabric.clone());
        monitored.start().await.unwrap();
        tokio::time::advance(DISCOVERY_WARMUP + Duration::from_millis(10)).await;

        let mut activity = fabric.subscribe_activity();
        let reply = monitored.process_request(AgentRequest { message: "hi".into(), conversation_id: None, source_agent: None, metadata: None }).await;
        assert_eq!(reply.status, 0);

        let first = activity.next().await.unwrap();
        assert_eq!(first.activity_type, ActivityType::Request);
        let second = activity.next().await.unwrap();
        assert_eq!(second.activity_type, ActivityType::Response);
    }
}
