//! The pub/sub fabric boundary (§4.1, §4.2, §6) and an in-process reference
//! implementation.
//!
//! [`Fabric`] is the single seam at which a real DDS/NATS/Zenoh binding would
//! be substituted. [`local::LocalFabric`] is the tokio-channel-backed
//! implementation every other crate's tests (and single-binary demos) run
//! against.

pub mod error;
pub mod local;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use genesis_schemas::{ActivityEvent, AdvertEvent, AdvertKind, AdvertKey, RpcReply, TopologyRecord};
use serde_json::Value;
use uuid::Uuid;

pub use error::FabricError;

/// A pending RPC request handed to a [`RpcHandler`], paired with enough
/// identity to route the eventual reply back to the requester.
#[derive(Debug, Clone)]
pub struct RpcRequestInfo {
    pub request_id: Uuid,
    pub source_guid: Uuid,
}

/// A replier's handler for inbound requests on a served endpoint. Invoked on
/// the fabric's data-available thread per §4.2 — implementations must
/// marshal any orchestration work onto the owning agent's event loop rather
/// than run it here.
pub type RpcHandler = std::sync::Arc<
    dyn Fn(RpcRequestInfo, Value) -> futures::future::BoxFuture<'static, (i32, Value)> + Send + Sync,
>;

/// The pub/sub + RPC primitive GENESIS is built on (§6).
///
/// A production deployment swaps this trait's implementation for a
/// DDS/NATS/Zenoh-backed one without touching any other crate in the
/// workspace; [`local::LocalFabric`] is the in-process reference
/// implementation used by every test in this repo.
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Publish an announcement. The bus retains the latest sample per key;
    /// late joiners receive all live entries before any live-stream updates.
    async fn advertise(&self, key: AdvertKey, payload: Value) -> Result<(), FabricError>;

    /// Remove a previously advertised key. Idempotent: disposing twice is
    /// equivalent to once.
    async fn dispose(&self, key: &AdvertKey) -> Result<(), FabricError>;

    /// Subscribe to add/update/remove notifications for a kind. The catch-up
    /// pass (all currently-live entries) is delivered before any live
    /// updates.
    fn subscribe(&self, kind: AdvertKind) -> BoxStream<'static, AdvertEvent>;

    /// Register a listener-driven replier for `endpoint`. Fails with
    /// [`FabricError::EndpointCollision`] if the endpoint is already served
    /// by this participant (§4.2 collision rule is enforced one layer up, in
    /// `genesis-core`, which picks distinct endpoint names up front).
    async fn serve(&self, endpoint: &str, handler: RpcHandler) -> Result<(), FabricError>;

    /// Block until a replier for `endpoint` is discovered, or time out.
    async fn connect(&self, endpoint: &str, timeout: Duration) -> Result<(), FabricError>;

    /// Send a request and await the correlated reply.
    async fn call(&self, endpoint: &str, payload: Value, timeout: Duration) -> Result<RpcReply, FabricError>;

    /// Publish a durable topology sample (node or edge upsert/remove).
    async fn publish_topology(&self, record: TopologyRecord) -> Result<(), FabricError>;

    /// Publish a transient activity record.
    async fn publish_activity(&self, event: ActivityEvent) -> Result<(), FabricError>;

    /// Subscribe to the durable topology stream (catch-up, then live).
    fn subscribe_topology(&self) -> BoxStream<'static, TopologyRecord>;

    /// Subscribe to the transient activity stream (no catch-up: volatile).
    fn subscribe_activity(&self) -> BoxStream<'static, ActivityEvent>;
}

/// Shared handle to a fabric, the way every other crate in the workspace
/// accepts one: type-erased, cheap to clone, safe to hand across tasks.
pub type SharedFabric = std::sync::Arc<dyn Fabric>;
