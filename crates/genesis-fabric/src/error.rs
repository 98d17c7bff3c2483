use uuid::Uuid;

/// Errors raised by a [`crate::Fabric`] implementation.
///
/// Corresponds to the `DiscoveryError` / `RpcTimeout` / `RpcTransportError`
/// entries of the error taxonomy: fabric-level failures are always
/// surfaced to the caller, never swallowed.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("advertisement for key {key:?} could not be parsed: {reason}")]
    Discovery { key: String, reason: String },

    #[error("no replier discovered for endpoint {endpoint} within {timeout_ms}ms")]
    ConnectTimeout { endpoint: String, timeout_ms: u64 },

    #[error("rpc call to {endpoint} (request {request_id}) timed out after {timeout_ms}ms")]
    RpcTimeout { endpoint: String, request_id: Uuid, timeout_ms: u64 },

    #[error("rpc transport failure on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("endpoint {endpoint} already has a replier registered")]
    EndpointCollision { endpoint: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FabricError {
    pub fn connect_timeout(endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ConnectTimeout { endpoint: endpoint.into(), timeout_ms }
    }

    pub fn rpc_timeout(endpoint: impl Into<String>, request_id: Uuid, timeout_ms: u64) -> Self {
        Self::RpcTimeout { endpoint: endpoint.into(), request_id, timeout_ms }
    }

    pub fn transport(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport { endpoint: endpoint.into(), reason: reason.into() }
    }
}
