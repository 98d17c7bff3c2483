use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default `MAX_TURNS` (§4.5, §9 open question (c): unspecified in the
/// source, 5 is a safe starting value).
pub const DEFAULT_MAX_TURNS: u32 = 5;

const fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

const fn default_memory_window_k() -> usize {
    100
}

const fn default_tool_timeout_secs() -> u64 {
    20
}

fn default_general_prompt() -> String {
    "You are a helpful assistant. Answer the user directly.".to_string()
}

fn default_function_based_prompt() -> String {
    "You are a helpful assistant with access to tools. Use them when they help answer the user's request, and reply with plain text once you have a final answer.".to_string()
}

/// Construction-time agent configuration. GENESIS does not ship a config
/// *loader* (file/env parsing is an external collaborator per scope); callers
/// build this directly or deserialize it from whatever source they choose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub guid: Uuid,
    pub name: String,
    /// The interface-facing endpoint. The agent-to-agent endpoint is derived
    /// from this by suffixing `_AgentRPC` (§4.2); the two must never be equal.
    pub endpoint: String,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_memory_window_k")]
    pub memory_window_k: usize,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_general_prompt")]
    pub general_prompt: String,
    #[serde(default = "default_function_based_prompt")]
    pub function_based_prompt: String,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            guid: Uuid::now_v7(),
            name: name.into(),
            endpoint: endpoint.into(),
            specializations: Vec::new(),
            capabilities: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
            memory_window_k: default_memory_window_k(),
            tool_timeout_secs: default_tool_timeout_secs(),
            general_prompt: default_general_prompt(),
            function_based_prompt: default_function_based_prompt(),
        }
    }

    pub fn agent_to_agent_endpoint(&self) -> String {
        format!("{}_AgentRPC", self.endpoint)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Fails fast if the interface-facing endpoint already carries the
    /// `_AgentRPC` suffix this agent would derive its agent-to-agent endpoint
    /// from (§4.2 collision rule; S6 startup guard) — the two endpoints must
    /// never collide, and a caller hand-constructing such an `endpoint` is
    /// exactly the case that would otherwise collide once suffixed.
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.ends_with("_AgentRPC") {
            return Err(format!(
                "endpoint {:?} collides with its own agent-to-agent endpoint {:?}",
                self.endpoint,
                self.agent_to_agent_endpoint()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_to_agent_endpoint_is_suffixed() {
        let cfg = AgentConfig::new("alpha", "alpha_svc");
        assert_eq!(cfg.agent_to_agent_endpoint(), "alpha_svc_AgentRPC");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_colliding_endpoint() {
        let mut cfg = AgentConfig::new("alpha", "alpha_svc");
        cfg.endpoint = "alpha_svc_AgentRPC".to_string();
        assert!(cfg.validate().is_err());
    }
}
