//! Interface base (§4.8): the outward-facing half of GENESIS. An interface
//! discovers advertised agents, picks one, and drives a request/reply
//! exchange against its interface-facing endpoint, publishing paired
//! start/complete activity around the call.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use genesis_fabric::{Fabric, FabricError, SharedFabric};
use genesis_schemas::{
    ActivityEvent, ActivityType, AdvertEvent, AdvertKind, AgentAdvertPayload, AgentReply, AgentRequest,
};
use parking_lot::RwLock;
use uuid::Uuid;

/// A discovered agent as seen from the interface side: keyed by the
/// interface-facing endpoint, not the `_AgentRPC` one (that belongs to
/// `genesis_registry::RemoteAgent`, used for agent-to-agent calls instead).
#[derive(Debug, Clone)]
pub struct DiscoveredAgent {
    pub guid: Uuid,
    pub name: String,
    pub endpoint: String,
    pub specializations: Vec<String>,
    pub capabilities: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("no discovered agent matches the given selection criteria")]
    NoMatch,

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

/// Criteria for [`Interface::select_agent`]. All supplied fields must match;
/// `capability` is a case-insensitive substring match against the agent's
/// advertised capabilities.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub guid: Option<Uuid>,
    pub name: Option<String>,
    pub capability: Option<String>,
}

impl SelectionCriteria {
    pub fn by_guid(guid: Uuid) -> Self {
        Self { guid: Some(guid), ..Default::default() }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }

    pub fn by_capability(capability: impl Into<String>) -> Self {
        Self { capability: Some(capability.into()), ..Default::default() }
    }

    fn matches(&self, agent: &DiscoveredAgent) -> bool {
        if let Some(guid) = self.guid {
            if agent.guid != guid {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &agent.name != name {
                return false;
            }
        }
        if let Some(capability) = &self.capability {
            let needle = capability.to_lowercase();
            if !agent.capabilities.iter().any(|c| c.to_lowercase().contains(&needle)) {
                return false;
            }
        }
        true
    }
}

/// Maintains the interface's view of the advertised-agent directory and
/// drives requests against whichever agent [`select_agent`] picks.
pub struct Interface {
    fabric: SharedFabric,
    self_guid: Uuid,
    cache: dashmap::DashMap<Uuid, DiscoveredAgent>,
    discovered: RwLock<Vec<std::sync::Arc<dyn Fn(&DiscoveredAgent) + Send + Sync>>>,
}

impl Interface {
    /// Spawns a background task that consumes the fabric's AGENT
    /// advertisement stream for the lifetime of the returned interface.
    pub fn spawn(fabric: SharedFabric) -> std::sync::Arc<Self> {
        let iface = std::sync::Arc::new(Self {
            fabric: fabric.clone(),
            self_guid: Uuid::now_v7(),
            cache: dashmap::DashMap::new(),
            discovered: RwLock::new(Vec::new()),
        });

        let task_iface = iface.clone();
        tokio::spawn(async move {
            let mut stream = fabric.subscribe(AdvertKind::Agent);
            while let Some(event) = stream.next().await {
                task_iface.apply(event);
            }
        });

        iface
    }

    fn apply(&self, event: AdvertEvent) {
        match event {
            AdvertEvent::Add(advert) | AdvertEvent::Update(advert) => {
                let payload: AgentAdvertPayload = match serde_json::from_value(advert.payload) {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::warn!(?advert.key, %err, "discarding unparseable agent advertisement");
                        return;
                    }
                };
                let guid = advert.key.advertiser_guid;
                let agent = DiscoveredAgent {
                    guid,
                    name: payload.name,
                    endpoint: payload.endpoint,
                    specializations: payload.specializations,
                    capabilities: payload.capabilities,
                };
                self.cache.insert(guid, agent.clone());
                for cb in self.discovered.read().iter() {
                    cb(&agent);
                }
            }
            AdvertEvent::Remove(key) => {
                self.cache.remove(&key.advertiser_guid);
            }
        }
    }

    /// Snapshot of every currently discovered agent.
    pub fn agents(&self) -> HashMap<Uuid, DiscoveredAgent> {
        self.cache.iter().map(|e| (*e.key(), e.value().clone())).collect()
    }

    /// Invokes `callback` for every currently-live agent (catch-up), then for
    /// each future addition.
    pub fn on_agent_discovered(&self, callback: impl Fn(&DiscoveredAgent) + Send + Sync + 'static) {
        let callback: std::sync::Arc<dyn Fn(&DiscoveredAgent) + Send + Sync> = std::sync::Arc::new(callback);
        for entry in self.cache.iter() {
            callback(entry.value());
        }
        self.discovered.write().push(callback);
    }

    /// Picks a single discovered agent matching `criteria`. Ties break on
    /// insertion order of the underlying map, which has no meaningful
    /// ordering guarantee; callers with more than one acceptable match
    /// should narrow `criteria` rather than rely on which one comes back.
    pub fn select_agent(&self, criteria: &SelectionCriteria) -> Result<DiscoveredAgent, InterfaceError> {
        self.cache
            .iter()
            .map(|e| e.value().clone())
            .find(|a| criteria.matches(a))
            .ok_or(InterfaceError::NoMatch)
    }

    /// Connects to and calls `agent`, publishing a START activity event
    /// before the call and a COMPLETE (or ERROR) event after, both sharing
    /// one `chain_id` so a monitor can correlate them.
    pub async fn send_request(
        &self,
        agent: &DiscoveredAgent,
        message: impl Into<String>,
        timeout: Duration,
    ) -> Result<AgentReply, InterfaceError> {
        let chain_id = Uuid::now_v7();
        let request = AgentRequest {
            message: message.into(),
            conversation_id: Some(chain_id.to_string()),
            source_agent: None,
            metadata: None,
        };

        self.fabric
            .publish_activity(ActivityEvent::new(chain_id, ActivityType::Start, self.self_guid, agent.guid, "interface_request"))
            .await?;

        self.fabric.connect(&agent.endpoint, timeout).await?;
        let result = self
            .fabric
            .call(&agent.endpoint, serde_json::to_value(&request).expect("serializable"), timeout)
            .await;

        match result {
            Ok(reply) => {
                let agent_reply: AgentReply = serde_json::from_value(reply.payload).unwrap_or_else(|err| {
                    AgentReply::failed(format!("malformed agent reply: {err}"))
                });
                let event = if agent_reply.status == 0 {
                    ActivityEvent::new(chain_id, ActivityType::Complete, self.self_guid, agent.guid, "interface_request")
                } else {
                    ActivityEvent::new(chain_id, ActivityType::Complete, self.self_guid, agent.guid, "interface_request")
                        .with_error(agent_reply.message.clone())
                };
                self.fabric.publish_activity(event).await?;
                Ok(agent_reply)
            }
            Err(err) => {
                let event = ActivityEvent::new(chain_id, ActivityType::Error, self.self_guid, agent.guid, "interface_request")
                    .with_error(err.to_string());
                self.fabric.publish_activity(event).await?;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_fabric::local::LocalFabric;
    use genesis_registry::rpc_handler;
    use genesis_schemas::AdvertKey;
    use std::sync::Arc;

    async fn advertise_stub_agent(fabric: &SharedFabric, name: &str, endpoint: &str, capability: &str) -> Uuid {
        let guid = Uuid::now_v7();
        let payload = AgentAdvertPayload {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            agent_rpc_endpoint: format!("{endpoint}_AgentRPC"),
            specializations: vec![],
            capabilities: vec![capability.to_string()],
            description: String::new(),
        };
        fabric.advertise(AdvertKey::agent(guid), serde_json::to_value(&payload).unwrap()).await.unwrap();
        guid
    }

    #[tokio::test]
    async fn select_agent_matches_by_capability() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        advertise_stub_agent(&fabric, "weather-bot", "weather_iface", "weather").await;
        advertise_stub_agent(&fabric, "billing-bot", "billing_iface", "billing").await;

        let iface = Interface::spawn(fabric.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let found = iface.select_agent(&SelectionCriteria::by_capability("weather")).unwrap();
        assert_eq!(found.name, "weather-bot");
    }

    #[tokio::test]
    async fn select_agent_errors_when_nothing_matches() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let iface = Interface::spawn(fabric);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(iface.select_agent(&SelectionCriteria::by_name("nope")), Err(InterfaceError::NoMatch)));
    }

    #[tokio::test]
    async fn send_request_round_trips_and_records_paired_activity() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let guid = advertise_stub_agent(&fabric, "echo-bot", "echo_iface", "echo").await;
        fabric
            .serve(
                "echo_iface",
                rpc_handler(|_info, payload| async move {
                    let req: AgentRequest = serde_json::from_value(payload).unwrap();
                    (0, serde_json::to_value(AgentReply::ok(req.message)).unwrap())
                }),
            )
            .await
            .unwrap();

        let iface = Interface::spawn(fabric.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut activity = fabric.subscribe_activity();
        let agent = iface.select_agent(&SelectionCriteria::by_guid(guid)).unwrap();
        let reply = iface.send_request(&agent, "hello", Duration::from_millis(200)).await.unwrap();
        assert_eq!(reply.message, "hello");
        assert_eq!(reply.status, 0);

        let first = activity.next().await.unwrap();
        assert_eq!(first.activity_type, ActivityType::Start);
        let second = activity.next().await.unwrap();
        assert_eq!(second.activity_type, ActivityType::Complete);
        assert_eq!(first.chain_id, second.chain_id);
    }
}
