//! In-process [`Fabric`] implementation backed by tokio channels and
//! `DashMap` caches.
//!
//! This is the reference/test double for the "external primitive" the
//! specification treats the pub/sub middleware as: every unit and
//! integration test in this workspace runs against it, and a single-process
//! demo can use it directly. A production deployment is expected to provide
//! a different `Fabric` implementation backed by a real DDS/NATS/Zenoh bus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use genesis_schemas::{
    ActivityEvent, AdvertEvent, AdvertKind, AdvertKey, Advertisement, GraphEdge, GraphNode,
    RpcReply, TopologyRecord,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{Fabric, FabricError, RpcHandler, RpcRequestInfo};

const CHANNEL_CAPACITY: usize = 1024;

fn advert_event_kind(event: &AdvertEvent) -> AdvertKind {
    match event {
        AdvertEvent::Add(a) | AdvertEvent::Update(a) => a.key.kind,
        AdvertEvent::Remove(key) => key.kind,
    }
}

/// A single-process [`Fabric`]. Cheap to clone (everything behind an `Arc`);
/// every participant in a test or demo shares one instance.
#[derive(Clone)]
pub struct LocalFabric {
    inner: Arc<Inner>,
}

struct Inner {
    advertisements: DashMap<AdvertKey, Value>,
    advert_tx: broadcast::Sender<AdvertEvent>,

    endpoints: DashMap<String, RpcHandler>,

    nodes: DashMap<Uuid, GraphNode>,
    edges: DashMap<String, GraphEdge>,
    topology_tx: broadcast::Sender<TopologyRecord>,

    activity_tx: broadcast::Sender<ActivityEvent>,
}

impl Default for LocalFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFabric {
    pub fn new() -> Self {
        let (advert_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (topology_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (activity_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                advertisements: DashMap::new(),
                advert_tx,
                endpoints: DashMap::new(),
                nodes: DashMap::new(),
                edges: DashMap::new(),
                topology_tx,
                activity_tx,
            }),
        }
    }
}

#[async_trait]
impl Fabric for LocalFabric {
    async fn advertise(&self, key: AdvertKey, payload: Value) -> Result<(), FabricError> {
        let existed = self.inner.advertisements.insert(key.clone(), payload.clone()).is_some();
        let advert = Advertisement { key: key.clone(), payload };
        let event = if existed { AdvertEvent::Update(advert) } else { AdvertEvent::Add(advert) };
        // No subscribers is not an error: catch-up readers see the cache regardless.
        let _ = self.inner.advert_tx.send(event);
        tracing::debug!(?key, "advertised");
        Ok(())
    }

    async fn dispose(&self, key: &AdvertKey) -> Result<(), FabricError> {
        if self.inner.advertisements.remove(key).is_some() {
            let _ = self.inner.advert_tx.send(AdvertEvent::Remove(key.clone()));
            tracing::debug!(?key, "disposed");
        }
        Ok(())
    }

    fn subscribe(&self, kind: AdvertKind) -> BoxStream<'static, AdvertEvent> {
        let snapshot: Vec<AdvertEvent> = self
            .inner
            .advertisements
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .map(|entry| AdvertEvent::Add(Advertisement { key: entry.key().clone(), payload: entry.value().clone() }))
            .collect();

        let rx = self.inner.advert_tx.subscribe();
        let live = BroadcastStream::new(rx).filter_map(move |res| {
            let kind = kind;
            async move {
                match res {
                    Ok(event) if advert_event_kind(&event) == kind => Some(event),
                    Ok(_) => None,
                    Err(_lagged) => None,
                }
            }
        });

        stream::iter(snapshot).chain(live).boxed()
    }

    async fn serve(&self, endpoint: &str, handler: RpcHandler) -> Result<(), FabricError> {
        if self.inner.endpoints.contains_key(endpoint) {
            return Err(FabricError::EndpointCollision { endpoint: endpoint.to_string() });
        }
        self.inner.endpoints.insert(endpoint.to_string(), handler);
        tracing::debug!(endpoint, "replier registered");
        Ok(())
    }

    async fn connect(&self, endpoint: &str, timeout: Duration) -> Result<(), FabricError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.endpoints.contains_key(endpoint) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FabricError::connect_timeout(endpoint, timeout.as_millis() as u64));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn call(&self, endpoint: &str, payload: Value, timeout: Duration) -> Result<RpcReply, FabricError> {
        let handler = self
            .inner
            .endpoints
            .get(endpoint)
            .map(|e| e.clone())
            .ok_or_else(|| FabricError::transport(endpoint, "no replier registered for endpoint"))?;

        let request_id = Uuid::now_v7();
        let info = RpcRequestInfo { request_id, source_guid: Uuid::nil() };
        let span = tracing::debug_span!("rpc_call", endpoint, %request_id);
        let _enter = span.enter();

        match tokio::time::timeout(timeout, handler(info, payload)).await {
            Ok((status, payload)) => Ok(RpcReply { request_id, status, payload }),
            Err(_elapsed) => Err(FabricError::rpc_timeout(endpoint, request_id, timeout.as_millis() as u64)),
        }
    }

    async fn publish_topology(&self, record: TopologyRecord) -> Result<(), FabricError> {
        match &record {
            TopologyRecord::NodeUpsert(node) => {
                self.inner.nodes.insert(node.id, node.clone());
            }
            TopologyRecord::NodeRemove(id) => {
                self.inner.nodes.remove(id);
            }
            TopologyRecord::EdgeUpsert(edge) => {
                self.inner.edges.insert(edge.edge_key.clone(), edge.clone());
            }
            TopologyRecord::EdgeRemove(key) => {
                self.inner.edges.remove(key);
            }
        }
        let _ = self.inner.topology_tx.send(record);
        Ok(())
    }

    async fn publish_activity(&self, event: ActivityEvent) -> Result<(), FabricError> {
        let _ = self.inner.activity_tx.send(event);
        Ok(())
    }

    fn subscribe_topology(&self) -> BoxStream<'static, TopologyRecord> {
        let snapshot: Vec<TopologyRecord> = self
            .inner
            .nodes
            .iter()
            .map(|e| TopologyRecord::NodeUpsert(e.value().clone()))
            .chain(self.inner.edges.iter().map(|e| TopologyRecord::EdgeUpsert(e.value().clone())))
            .collect();
        let rx = self.inner.topology_tx.subscribe();
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });
        stream::iter(snapshot).chain(live).boxed()
    }

    fn subscribe_activity(&self) -> BoxStream<'static, ActivityEvent> {
        let rx = self.inner.activity_tx.subscribe();
        BroadcastStream::new(rx).filter_map(|res| async move { res.ok() }).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::FutureExt;
    use genesis_schemas::{AgentAdvertPayload, NodeState, ParticipantKind};

    #[tokio::test]
    async fn catch_up_snapshot_precedes_live_updates() {
        let fabric = LocalFabric::new();
        let guid = Uuid::now_v7();
        let payload = AgentAdvertPayload {
            name: "alpha".into(),
            endpoint: "alpha".into(),
            agent_rpc_endpoint: "alpha_AgentRPC".into(),
            specializations: vec![],
            capabilities: vec!["weather".into()],
            description: String::new(),
        };
        fabric
            .advertise(AdvertKey::agent(guid), serde_json::to_value(&payload).unwrap())
            .await
            .unwrap();

        let mut stream = fabric.subscribe(AdvertKind::Agent);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, AdvertEvent::Add(_)));

        fabric.dispose(&AdvertKey::agent(guid)).await.unwrap();
        let second = stream.next().await.unwrap();
        assert!(matches!(second, AdvertEvent::Remove(_)));
    }

    #[tokio::test]
    async fn dispose_twice_is_idempotent() {
        let fabric = LocalFabric::new();
        let key = AdvertKey::agent(Uuid::now_v7());
        fabric.advertise(key.clone(), serde_json::json!({})).await.unwrap();
        fabric.dispose(&key).await.unwrap();
        fabric.dispose(&key).await.unwrap();
    }

    #[tokio::test]
    async fn call_round_trips_through_a_served_endpoint() {
        let fabric = LocalFabric::new();
        let handler: RpcHandler = Arc::new(|_info, payload| {
            async move { (0, serde_json::json!({ "echo": payload })) }.boxed()
        });
        fabric.serve("echo", handler).await.unwrap();
        fabric.connect("echo", Duration::from_millis(50)).await.unwrap();

        let reply = fabric
            .call("echo", serde_json::json!({"x": 1}), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(reply.status, 0);
        assert_eq!(reply.payload["echo"]["x"], 1);
    }

    #[tokio::test]
    async fn call_without_replier_times_out() {
        let fabric = LocalFabric::new();
        let err = fabric
            .call("missing", serde_json::json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::Transport { .. }));
    }

    #[tokio::test]
    async fn second_serve_on_same_endpoint_collides() {
        let fabric = LocalFabric::new();
        let handler: RpcHandler = Arc::new(|_info, payload| async move { (0, payload) }.boxed());
        fabric.serve("dup", handler.clone()).await.unwrap();
        let err = fabric.serve("dup", handler).await.unwrap_err();
        assert!(matches!(err, FabricError::EndpointCollision { .. }));
    }

    #[tokio::test]
    async fn topology_subscribers_see_snapshot_before_live_changes() {
        let fabric = LocalFabric::new();
        let node = GraphNode {
            id: Uuid::now_v7(),
            kind: ParticipantKind::Agent,
            state: NodeState::Ready,
            metadata: serde_json::json!({}),
        };
        fabric.publish_topology(TopologyRecord::NodeUpsert(node.clone())).await.unwrap();

        let mut stream = fabric.subscribe_topology();
        let first = stream.next().await.unwrap();
        assert!(matches!(first, TopologyRecord::NodeUpsert(n) if n.id == node.id));
    }
}
