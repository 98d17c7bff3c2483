//! MemoryAdapter (§4.5, §9 "memory adapter sum type"): an opaque store of
//! conversation items tagged with role metadata, pluggable by the caller.
//!
//! The orchestrator uses only `write` and `retrieve`; `summarize`/`prune`
//! exist so a disk-backed or remote implementation can manage its own
//! growth without the orchestrator knowing how.

use async_trait::async_trait;
use genesis_schemas::{ConversationRole, ConversationTurn};
use parking_lot::Mutex;

#[async_trait]
pub trait MemoryAdapter: Send + Sync {
    async fn write(&self, conversation_id: &str, item: ConversationTurn) -> Result<(), anyhow::Error>;

    /// Retrieves up to `k` most recent items, oldest first.
    async fn retrieve(&self, conversation_id: &str, k: usize) -> Result<Vec<ConversationTurn>, anyhow::Error>;

    /// Optional: collapse `window` items into a shorter summary turn. The
    /// in-memory adapter does not implement summarization (§4.5: "the
    /// orchestrator does not implement summarization but yields to the
    /// memory adapter for optional summaries").
    async fn summarize(&self, _conversation_id: &str, _window: usize) -> Result<(), anyhow::Error> {
        Ok(())
    }

    /// Optional: drop items matching some adapter-defined criteria.
    async fn prune(&self, _conversation_id: &str) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Returns only `user`/`assistant` items, applying the §4.5 memory context
/// rule: `tool`/`assistant_tool` items are only meaningful with their
/// original, non-durable `tool_calls` references and must be excluded when
/// reconstructing conversation context from durable memory.
pub fn filter_for_context(items: &[ConversationTurn]) -> Vec<&ConversationTurn> {
    items
        .iter()
        .filter(|item| matches!(item.role, ConversationRole::User | ConversationRole::Assistant))
        .collect()
}

/// A sliding-window, process-local [`MemoryAdapter`]. The default for tests
/// and single-process deployments; a disk-backed or remote implementation is
/// an external collaborator out of this crate's scope.
#[derive(Default)]
pub struct InMemoryMemoryAdapter {
    conversations: Mutex<std::collections::HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryAdapter for InMemoryMemoryAdapter {
    async fn write(&self, conversation_id: &str, item: ConversationTurn) -> Result<(), anyhow::Error> {
        self.conversations.lock().entry(conversation_id.to_string()).or_default().push(item);
        Ok(())
    }

    async fn retrieve(&self, conversation_id: &str, k: usize) -> Result<Vec<ConversationTurn>, anyhow::Error> {
        let guard = self.conversations.lock();
        let Some(items) = guard.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = items.len().saturating_sub(k);
        Ok(items[start..].to_vec())
    }
}
