//! FunctionRegistry (§4.3) and AgentCommunication (§4.4): the two directories
//! built on top of [`genesis_fabric::Fabric`]'s advertisement stream, plus
//! the agent-to-agent RPC client/server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use genesis_fabric::{Fabric, FabricError, RpcHandler, RpcRequestInfo, SharedFabric};
use genesis_schemas::{
    AdvertKey, AdvertKind, AdvertEvent, AgentAdvertPayload, Function, FunctionAdvertPayload,
    RemoteAgent,
};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

type FunctionCallback = Arc<dyn Fn(&Function) + Send + Sync>;
type FunctionRemovedCallback = Arc<dyn Fn(&str) + Send + Sync>;
type AgentCallback = Arc<dyn Fn(&RemoteAgent) + Send + Sync>;
type AgentRemovedCallback = Arc<dyn Fn(Uuid) + Send + Sync>;

fn catch_unwind_log<F: FnOnce()>(context: &str, f: F) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        tracing::error!(context, ?panic, "discovery callback panicked");
    }
}

/// Aggregates every currently-advertised `FUNCTION` entry and notifies
/// subscribers on add/remove.
pub struct FunctionRegistry {
    cache: dashmap::DashMap<String, Function>,
    discovered: RwLock<Vec<FunctionCallback>>,
    removed: RwLock<Vec<FunctionRemovedCallback>>,
}

impl FunctionRegistry {
    /// Spawns a background task that consumes `fabric`'s FUNCTION
    /// advertisement stream for the lifetime of the returned registry.
    pub fn spawn(fabric: SharedFabric) -> Arc<Self> {
        let registry = Arc::new(Self {
            cache: dashmap::DashMap::new(),
            discovered: RwLock::new(Vec::new()),
            removed: RwLock::new(Vec::new()),
        });

        let task_registry = registry.clone();
        tokio::spawn(async move {
            let mut stream = fabric.subscribe(AdvertKind::Function);
            while let Some(event) = stream.next().await {
                task_registry.apply(event);
            }
        });

        registry
    }

    fn apply(&self, event: AdvertEvent) {
        match event {
            AdvertEvent::Add(advert) | AdvertEvent::Update(advert) => {
                let payload: FunctionAdvertPayload = match serde_json::from_value(advert.payload) {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::warn!(?advert.key, %err, "discarding unparseable function advertisement");
                        return;
                    }
                };
                let function: Function = payload.into();
                self.cache.insert(function.function_id.clone(), function.clone());
                for cb in self.discovered.read().iter() {
                    catch_unwind_log("on_function_discovered", || cb(&function));
                }
            }
            AdvertEvent::Remove(key) => {
                if let Some(function_id) = key.function_id {
                    self.cache.remove(&function_id);
                    for cb in self.removed.read().iter() {
                        catch_unwind_log("on_function_removed", || cb(&function_id));
                    }
                }
            }
        }
    }

    /// Snapshot of all currently known functions keyed by `function_id`.
    pub fn get(&self) -> HashMap<String, Function> {
        self.cache.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }

    pub fn lookup(&self, function_id: &str) -> Option<Function> {
        self.cache.get(function_id).map(|e| e.value().clone())
    }

    /// Invokes `callback` for every currently-live function (catch-up), then
    /// for each future addition.
    pub fn on_function_discovered(&self, callback: impl Fn(&Function) + Send + Sync + 'static) {
        let callback: FunctionCallback = Arc::new(callback);
        for entry in self.cache.iter() {
            catch_unwind_log("on_function_discovered.catch_up", || callback(entry.value()));
        }
        self.discovered.write().push(callback);
    }

    /// Invoked exactly once per removed `function_id`.
    pub fn on_function_removed(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.removed.write().push(Arc::new(callback));
    }
}

/// Peer agent directory plus the agent-to-agent RPC client/server.
pub struct AgentCommunication {
    fabric: SharedFabric,
    self_guid: Uuid,
    /// Base endpoint suffixed with `_AgentRPC` per the §4.2 collision rule.
    agent_endpoint: String,
    cache: dashmap::DashMap<Uuid, RemoteAgent>,
    discovered: RwLock<Vec<AgentCallback>>,
    removed: RwLock<Vec<AgentRemovedCallback>>,
}

impl AgentCommunication {
    /// `base_endpoint` must not collide with the agent's own interface-facing
    /// endpoint (enforced by the caller per the §4.2/S6 startup guard); the
    /// agent-to-agent endpoint is `<base_endpoint>_AgentRPC`.
    pub fn spawn(fabric: SharedFabric, self_guid: Uuid, base_endpoint: &str) -> Arc<Self> {
        let comm = Arc::new(Self {
            fabric: fabric.clone(),
            self_guid,
            agent_endpoint: format!("{base_endpoint}_AgentRPC"),
            cache: dashmap::DashMap::new(),
            discovered: RwLock::new(Vec::new()),
            removed: RwLock::new(Vec::new()),
        });

        let task_comm = comm.clone();
        tokio::spawn(async move {
            let mut stream = fabric.subscribe(AdvertKind::Agent);
            while let Some(event) = stream.next().await {
                task_comm.apply(event);
            }
        });

        comm
    }

    pub fn agent_endpoint(&self) -> &str {
        &self.agent_endpoint
    }

    fn apply(&self, event: AdvertEvent) {
        match event {
            AdvertEvent::Add(advert) | AdvertEvent::Update(advert) => {
                if advert.key.advertiser_guid == self.self_guid {
                    return;
                }
                let payload: AgentAdvertPayload = match serde_json::from_value(advert.payload) {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::warn!(?advert.key, %err, "discarding unparseable agent advertisement");
                        return;
                    }
                };
                let guid = advert.key.advertiser_guid;
                let agent: RemoteAgent = (guid, payload).into();
                self.cache.insert(guid, agent.clone());
                for cb in self.discovered.read().iter() {
                    catch_unwind_log("on_agent_discovered", || cb(&agent));
                }
            }
            AdvertEvent::Remove(key) => {
                if key.advertiser_guid == self.self_guid {
                    return;
                }
                self.cache.remove(&key.advertiser_guid);
                for cb in self.removed.read().iter() {
                    catch_unwind_log("on_agent_removed", || cb(key.advertiser_guid));
                }
            }
        }
    }

    /// Publishes this agent's own `AGENT` advertisement and registers the
    /// agent-to-agent replier, per §4.4 server side. `interface_endpoint` is
    /// carried in the advertisement so `genesis-interface` can discover it
    /// without needing access to this agent's `_AgentRPC` endpoint.
    pub async fn advertise_self(
        &self,
        name: &str,
        interface_endpoint: &str,
        specializations: Vec<String>,
        capabilities: Vec<String>,
        handler: RpcHandler,
    ) -> Result<(), FabricError> {
        self.fabric.serve(&self.agent_endpoint, handler).await?;
        let payload = AgentAdvertPayload {
            name: name.to_string(),
            endpoint: interface_endpoint.to_string(),
            agent_rpc_endpoint: self.agent_endpoint.clone(),
            specializations,
            capabilities,
            description: String::new(),
        };
        self.fabric
            .advertise(AdvertKey::agent(self.self_guid), serde_json::to_value(&payload).expect("serializable"))
            .await
    }

    pub fn on_agent_discovered(&self, callback: impl Fn(&RemoteAgent) + Send + Sync + 'static) {
        let callback: AgentCallback = Arc::new(callback);
        for entry in self.cache.iter() {
            catch_unwind_log("on_agent_discovered.catch_up", || callback(entry.value()));
        }
        self.discovered.write().push(callback);
    }

    pub fn on_agent_removed(&self, callback: impl Fn(Uuid) + Send + Sync + 'static) {
        self.removed.write().push(Arc::new(callback));
    }

    pub fn get(&self) -> HashMap<Uuid, RemoteAgent> {
        self.cache.iter().map(|e| (*e.key(), e.value().clone())).collect()
    }

    pub fn lookup(&self, guid: Uuid) -> Option<RemoteAgent> {
        self.cache.get(&guid).map(|e| e.value().clone())
    }

    /// Looks up `target_guid`'s endpoint, connects, and calls it with
    /// `payload`. Used by `genesis-core`'s tool router for agent-as-tool
    /// invocations.
    pub async fn send_agent_request(
        &self,
        target_guid: Uuid,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, FabricError> {
        let agent = self
            .cache
            .get(&target_guid)
            .map(|e| e.value().clone())
            .ok_or_else(|| FabricError::transport(format!("agent/{target_guid}"), "not in discovered-agent cache"))?;

        self.fabric.connect(&agent.endpoint, timeout).await?;
        let reply = self.fabric.call(&agent.endpoint, payload, timeout).await?;
        if reply.status != 0 {
            return Err(FabricError::transport(&agent.endpoint, format!("remote status {}", reply.status)));
        }
        Ok(reply.payload)
    }
}

/// Helper for assembling an `RpcRequestInfo`-aware handler from a plain
/// async closure; used by `genesis-core`/`genesis-service` so their handler
/// signatures don't depend on `genesis-fabric`'s type directly.
pub fn rpc_handler<F, Fut>(f: F) -> RpcHandler
where
    F: Fn(RpcRequestInfo, Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = (i32, Value)> + Send + 'static,
{
    Arc::new(move |info, payload| Box::pin(f(info, payload)))
}
