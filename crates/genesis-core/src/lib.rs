//! The provider-agnostic agent core: GenesisAgent (§4.5), ProviderAdapter
//! (§4.6), and MemoryAdapter (§9).

pub mod agent;
pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod tools;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use agent::{GenesisAgent, GenesisAgentBuilder};
pub use config::AgentConfig;
pub use error::{AgentError, ToolRouteError};
pub use memory::{InMemoryMemoryAdapter, MemoryAdapter};
pub use provider::{LlmMessage, MessageRole, ProviderAdapter, ProviderResponse, ToolCall, ToolChoicePolicy};
pub use tools::{validate_arguments, InternalTool, InternalToolSet};

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use genesis_fabric::local::LocalFabric;
    use genesis_fabric::{Fabric, SharedFabric};
    use genesis_registry::rpc_handler;
    use genesis_schemas::{AdvertKey, AgentRequest, FunctionAdvertPayload};
    use uuid::Uuid;

    use crate::agent::GenesisAgentBuilder;
    use crate::config::AgentConfig;
    use crate::memory::{InMemoryMemoryAdapter, MemoryAdapter};
    use crate::mock::MockProviderAdapter;

    // S1 — pure conversation.
    #[tokio::test]
    async fn s1_pure_conversation() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let provider = Arc::new(MockProviderAdapter::always_text("hi"));
        let memory = Arc::new(InMemoryMemoryAdapter::new());
        let config = AgentConfig::new("alpha", "alpha_svc");
        let agent = GenesisAgentBuilder::new(config, provider, memory.clone(), fabric).build().unwrap();

        let reply = agent.process_request(AgentRequest { message: "hello".into(), conversation_id: None, source_agent: None, metadata: None }).await;
        assert_eq!(reply.status, 0);
        assert_eq!(reply.message, "hi");

        let items = memory.retrieve(&agent.config().guid.to_string(), 10).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content, "hello");
        assert_eq!(items[1].content, "hi");
    }

    // S2 — single function call.
    #[tokio::test]
    async fn s2_single_function_call() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let provider = Arc::new(MockProviderAdapter::new([
            crate::mock::MockStep::ToolCalls(vec![crate::provider::ToolCall {
                call_id: "call_1".into(),
                name: "add".into(),
                arguments: serde_json::json!({"x": 2, "y": 3}),
            }]),
            crate::mock::MockStep::Text("5".into()),
        ]));
        let memory = Arc::new(InMemoryMemoryAdapter::new());
        let config = AgentConfig::new("alpha", "alpha_svc");
        let agent = GenesisAgentBuilder::new(config, provider, memory, fabric.clone()).build().unwrap();

        let provider_guid = Uuid::now_v7();
        let invocations = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let invocations_clone = invocations.clone();
        fabric
            .serve(
                "svc.add",
                rpc_handler(move |_info, payload| {
                    let invocations = invocations_clone.clone();
                    async move {
                        invocations.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        let args = &payload["arguments"];
                        let sum = args["x"].as_i64().unwrap_or(0) + args["y"].as_i64().unwrap_or(0);
                        (0, serde_json::json!({"result": sum}))
                    }
                }),
            )
            .await
            .unwrap();
        fabric
            .advertise(
                AdvertKey::function(provider_guid, "add"),
                serde_json::to_value(FunctionAdvertPayload {
                    function_id: "add".into(),
                    name: "add".into(),
                    description: "adds two numbers".into(),
                    parameter_schema: serde_json::json!({"type": "object", "properties": {"x": {"type":"number"}, "y": {"type":"number"}}}),
                    provider_guid,
                    endpoint: "svc.add".into(),
                })
                .unwrap(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let reply = agent.process_request(AgentRequest { message: "add 2 and 3".into(), conversation_id: None, source_agent: None, metadata: None }).await;
        assert_eq!(reply.status, 0);
        assert_eq!(reply.message, "5");
        assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 1, "the service must see exactly one invocation");
    }

    // S5 — loop exhaustion.
    #[tokio::test]
    async fn s5_loop_exhaustion() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let provider = Arc::new(MockProviderAdapter::always_tool_call("unknown_tool", serde_json::json!({})));
        let memory = Arc::new(InMemoryMemoryAdapter::new());
        let mut config = AgentConfig::new("alpha", "alpha_svc");
        config.max_turns = 2;

        // Register an internal tool so the tool set is non-empty and the
        // multi-turn path is taken even though the call itself fails to route.
        struct Noop;
        #[async_trait::async_trait]
        impl crate::tools::InternalTool for Noop {
            fn name(&self) -> &str { "unknown_tool" }
            fn schema(&self) -> genesis_schemas::ToolSchema {
                genesis_schemas::ToolSchema { name: "unknown_tool".into(), description: String::new(), parameters: serde_json::json!({"type":"object"}) }
            }
            async fn call(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, anyhow::Error> {
                Ok(serde_json::Value::Null)
            }
        }

        let agent = GenesisAgentBuilder::new(config, provider.clone(), memory, fabric)
            .register_internal_tool(Arc::new(Noop))
            .build()
            .unwrap();

        let reply = agent.process_request(AgentRequest { message: "loop forever".into(), conversation_id: None, source_agent: None, metadata: None }).await;
        assert_eq!(reply.status, 1);
        assert_eq!(provider.call_count(), 2, "exactly two LLM invocations before exhaustion");
    }

    // S6 — endpoint collision guard.
    #[tokio::test]
    async fn s6_endpoint_collision_guard_fails_fast() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let provider = Arc::new(MockProviderAdapter::always_text("hi"));
        let memory = Arc::new(InMemoryMemoryAdapter::new());
        let mut config = AgentConfig::new("alpha", "alpha_svc");
        config.endpoint = "alpha_svc_AgentRPC".to_string();

        let result = GenesisAgentBuilder::new(config, provider, memory, fabric).build();
        assert!(result.is_err(), "a colliding endpoint configuration must fail at construction, before any advertisement");
    }

    #[tokio::test]
    async fn boundary_zero_tools_zero_memory_yields_one_llm_call_and_one_memory_item() {
        let fabric: SharedFabric = Arc::new(LocalFabric::new());
        let provider = Arc::new(MockProviderAdapter::always_text("ok"));
        let memory = Arc::new(InMemoryMemoryAdapter::new());
        let config = AgentConfig::new("alpha", "alpha_svc");
        let agent = GenesisAgentBuilder::new(config, provider.clone(), memory, fabric).build().unwrap();

        let reply = agent.process_request(AgentRequest { message: "hello".into(), conversation_id: None, source_agent: None, metadata: None }).await;
        assert_eq!(reply.status, 0);
        assert_eq!(provider.call_count(), 1);
    }
}
