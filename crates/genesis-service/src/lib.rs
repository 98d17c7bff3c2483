//! Service base (§4.8): hosts functions registered at startup, advertises
//! them, serves RPC, and publishes SERVICE→FUNCTION topology and activity.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use genesis_fabric::{Fabric, FabricError, SharedFabric};
use genesis_registry::rpc_handler;
use genesis_schemas::{
    ActivityEvent, ActivityType, AdvertKey, EdgeKind, FunctionAdvertPayload, GraphEdge, TopologyRecord,
};
use serde_json::Value;
use uuid::Uuid;

/// A function a [`Service`] hosts. Implementing one trait and calling
/// [`Service::register_function`] is the GENESIS equivalent of the
/// spec's "decorated/declared at registration" function hosting model.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, ServiceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("function execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

struct RegisteredFunction {
    payload: FunctionAdvertPayload,
    handler: Arc<dyn FunctionHandler>,
}

pub struct Service {
    fabric: SharedFabric,
    guid: Uuid,
    endpoint: String,
    functions: dashmap::DashMap<String, RegisteredFunction>,
}

impl Service {
    pub fn new(fabric: SharedFabric, endpoint: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { fabric, guid: Uuid::now_v7(), endpoint: endpoint.into(), functions: dashmap::DashMap::new() })
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    /// Registers a function, advertises it, and (on first registration on
    /// this service) serves the RPC endpoint. Emits a SERVICE→FUNCTION edge.
    pub async fn register_function(
        self: &Arc<Self>,
        function_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<(), ServiceError> {
        let function_id = function_id.into();
        let payload = FunctionAdvertPayload {
            function_id: function_id.clone(),
            name: name.into(),
            description: description.into(),
            parameter_schema,
            provider_guid: self.guid,
            endpoint: self.endpoint.clone(),
        };

        let was_empty = self.functions.is_empty();
        self.functions.insert(function_id.clone(), RegisteredFunction { payload: payload.clone(), handler });

        if was_empty {
            let service = self.clone();
            self.fabric
                .serve(
                    &self.endpoint,
                    rpc_handler(move |_info, payload| {
                        let service = service.clone();
                        async move { service.handle_call(payload).await }
                    }),
                )
                .await?;
        }

        self.fabric
            .advertise(AdvertKey::function(self.guid, function_id.clone()), serde_json::to_value(&payload).expect("serializable"))
            .await?;

        let edge = GraphEdge {
            edge_key: format!("service:{}->function:{}", self.guid, function_id),
            kind: EdgeKind::ServiceFunction,
            source: self.guid,
            target: self.guid,
            metadata: serde_json::json!({"function_id": function_id}),
        };
        self.fabric.publish_topology(TopologyRecord::EdgeUpsert(edge)).await?;

        Ok(())
    }

    async fn handle_call(&self, payload: Value) -> (i32, Value) {
        let chain_id = Uuid::now_v7();
        let started = Instant::now();

        let function_id = payload.get("function_id").and_then(Value::as_str).unwrap_or_default().to_string();
        let arguments = payload.get("arguments").cloned().unwrap_or(Value::Null);

        let _ = self
            .fabric
            .publish_activity(ActivityEvent::new(chain_id, ActivityType::Call, self.guid, self.guid, &function_id).with_payload(arguments.clone()))
            .await;

        let Some(function) = self.functions.get(&function_id) else {
            let event = ActivityEvent::new(chain_id, ActivityType::Error, self.guid, self.guid, &function_id).with_error("unknown function_id");
            let _ = self.fabric.publish_activity(event).await;
            return (1, serde_json::json!({"error": format!("unknown function_id {function_id}")}));
        };

        let result = function.handler.call(arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                let event = ActivityEvent::new(chain_id, ActivityType::Result, self.guid, self.guid, &function_id).with_duration(duration_ms);
                let _ = self.fabric.publish_activity(event).await;
                (0, value)
            }
            Err(err) => {
                let event = ActivityEvent::new(chain_id, ActivityType::Error, self.guid, self.guid, &function_id)
                    .with_duration(duration_ms)
                    .with_error(err.to_string());
                let _ = self.fabric.publish_activity(event).await;
                (1, serde_json::json!({"error": err.to_string()}))
            }
        }
    }

    /// Disposes every advertised function (shutdown).
    pub async fn shutdown(&self) {
        for entry in self.functions.iter() {
            let key = AdvertKey::function(self.guid, entry.payload.function_id.clone());
            if let Err(err) = self.fabric.dispose(&key).await {
                tracing::error!(%err, "failed to dispose function on shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_fabric::local::LocalFabric;

    struct Add;

    #[async_trait]
    impl FunctionHandler for Add {
        async fn call(&self, arguments: Value) -> Result<Value, ServiceError> {
            let x = arguments["x"].as_i64().unwrap_or(0);
            let y = arguments["y"].as_i64().unwrap_or(0);
            Ok(serde_json::json!({"result": x + y}))
        }
    }

    #[tokio::test]
    async fn registered_function_is_callable_and_advertised() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let service = Service::new(fabric.clone(), "svc.math");
        service
            .register_function("add", "add", "adds two numbers", serde_json::json!({"type": "object"}), Arc::new(Add))
            .await
            .unwrap();

        let reply = fabric
            .call("svc.math", serde_json::json!({"function_id": "add", "arguments": {"x": 2, "y": 3}}), std::time::Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(reply.status, 0);
        assert_eq!(reply.payload["result"], 5);
    }

    #[tokio::test]
    async fn unknown_function_id_returns_an_error_reply() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let service = Service::new(fabric.clone(), "svc.math");
        service
            .register_function("add", "add", "adds two numbers", serde_json::json!({"type": "object"}), Arc::new(Add))
            .await
            .unwrap();

        let reply = fabric
            .call("svc.math", serde_json::json!({"function_id": "missing", "arguments": {}}), std::time::Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(reply.status, 1);
    }
}
