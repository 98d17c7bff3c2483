//! Error taxonomy for the orchestrator (§7).
//!
//! Errors local to a tool call are recovered inline (recorded as a
//! tool-response, the loop continues) and never reach this enum. Everything
//! here is surfaced to the caller with a stable `status`.

use genesis_fabric::FabricError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The LLM call itself failed. No automatic retry; memory still records
    /// the user turn.
    #[error("provider call failed: {0}")]
    Provider(String),

    /// `turn_count == MAX_TURNS` without a terminal text turn.
    #[error("loop exhausted after {turns} turns without a terminal response")]
    LoopExhaustion { turns: u32, partial_text: Option<String> },

    /// Unrecoverable local state corruption; the process should terminate
    /// rather than mask it.
    #[error("fatal orchestrator error: {0}")]
    Fatal(String),

    /// Construction-time invariant violation (§4.2 collision rule, S6).
    #[error("endpoint collision: {0}")]
    EndpointCollision(String),

    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn provider(reason: impl Into<String>) -> Self {
        Self::Provider(reason.into())
    }

    pub fn loop_exhaustion(turns: u32, partial_text: Option<String>) -> Self {
        Self::LoopExhaustion { turns, partial_text }
    }

    /// The status code carried in the user-visible `AgentReply` for this
    /// error. Every branch here is nonzero per §7's "reply always has
    /// `{message, status}`" contract — `status=0` is reserved for success.
    pub fn status(&self) -> i32 {
        1
    }

    /// The best-effort human-readable message for the caller.
    pub fn user_message(&self) -> String {
        match self {
            Self::LoopExhaustion { partial_text: Some(text), .. } => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors surfaced from routing a single tool call; always recovered into a
/// tool-response message by the caller, never propagated past `route_tool_call`.
#[derive(Debug, thiserror::Error)]
pub enum ToolRouteError {
    #[error("no tool named {0} is known to this agent")]
    Unknown(String),

    #[error("invalid arguments for tool {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("internal tool {0} panicked or returned an error: {1}")]
    InternalFailure(String, String),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}
