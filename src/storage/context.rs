//! Typed session flags and snapshots over a client storage.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::build::BuildConfig;
use crate::error::BabResult;
use crate::ids::{AgentId, ModuleId};
use crate::storage::ClientStorage;

/// Storage key of the current chat pointer.
pub const CURRENT_CHAT_KEY: &str = "current_chat";
/// Storage key of the build configuration snapshot.
pub const BUILD_CONFIG_KEY: &str = "build_config";

const TRUE: &str = "true";
const FALSE: &str = "false";

/// The chat the user was last sent to after creating an agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPointer {
    /// Agent to talk to.
    pub agent_id: AgentId,
    /// Memory module backing the conversation.
    pub module_id: ModuleId,
}

/// Explicit client-side session state, shared by the chat session and the
/// build reconciler.
#[derive(Clone)]
pub struct SessionContext {
    storage: Arc<dyn ClientStorage>,
    ttl: Duration,
}

impl SessionContext {
    /// Wrap a storage backend; every write expires after `ttl`.
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    /// Underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ClientStorage> {
        &self.storage
    }

    fn created_key(agent_id: AgentId) -> String {
        format!("agent_created:{agent_id}")
    }

    fn started_key(agent_id: AgentId) -> String {
        format!("agent_started:{agent_id}")
    }

    fn read_flag(&self, key: &str) -> bool {
        self.storage.get(key).as_deref() == Some(TRUE)
    }

    /// Record a freshly created agent: created, first turn not yet sent.
    ///
    /// # Errors
    /// Returns an error if the storage write fails.
    pub fn mark_agent_created(&self, agent_id: AgentId) -> BabResult<()> {
        self.storage
            .set(&Self::created_key(agent_id), TRUE, Some(self.ttl))?;
        self.storage
            .set(&Self::started_key(agent_id), FALSE, Some(self.ttl))
    }

    /// Whether the agent was created from this client.
    #[must_use]
    pub fn is_agent_created(&self, agent_id: AgentId) -> bool {
        self.read_flag(&Self::created_key(agent_id))
    }

    /// Whether the first turn since creation has been sent.
    #[must_use]
    pub fn is_agent_started(&self, agent_id: AgentId) -> bool {
        self.read_flag(&Self::started_key(agent_id))
    }

    /// Flip the started flag on.
    ///
    /// # Errors
    /// Returns an error if the storage write fails.
    pub fn mark_agent_started(&self, agent_id: AgentId) -> BabResult<()> {
        self.storage
            .set(&Self::started_key(agent_id), TRUE, Some(self.ttl))
    }

    /// Flip the started flag back off after a failed first send.
    ///
    /// # Errors
    /// Returns an error if the storage write fails.
    pub fn reset_agent_started(&self, agent_id: AgentId) -> BabResult<()> {
        self.storage
            .set(&Self::started_key(agent_id), FALSE, Some(self.ttl))
    }

    /// The chat pointer stored by the last instantiation, if any.
    #[must_use]
    pub fn current_chat(&self) -> Option<ChatPointer> {
        let raw = self.storage.get(CURRENT_CHAT_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(pointer) => Some(pointer),
            Err(err) => {
                tracing::warn!("Ignoring unreadable current chat pointer: {err}");
                None
            }
        }
    }

    /// Store the chat pointer.
    ///
    /// # Errors
    /// Returns an error if serialization or the storage write fails.
    pub fn set_current_chat(&self, pointer: &ChatPointer) -> BabResult<()> {
        let raw = serde_json::to_string(pointer)?;
        self.storage.set(CURRENT_CHAT_KEY, &raw, Some(self.ttl))
    }

    /// The saved build configuration, if any.
    #[must_use]
    pub fn load_build_config(&self) -> Option<BuildConfig> {
        let raw = self.storage.get(BUILD_CONFIG_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("Ignoring unreadable build configuration: {err}");
                None
            }
        }
    }

    /// Persist the build configuration.
    ///
    /// # Errors
    /// Returns an error if serialization or the storage write fails.
    pub fn save_build_config(&self, config: &BuildConfig) -> BabResult<()> {
        let raw = serde_json::to_string(config)?;
        self.storage.set(BUILD_CONFIG_KEY, &raw, Some(self.ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn context() -> SessionContext {
        SessionContext::new(Arc::new(MemoryStorage::new()), Duration::from_secs(3600))
    }

    #[test]
    fn test_unknown_agent_is_not_started() {
        let ctx = context();
        let agent = AgentId::random();
        assert!(!ctx.is_agent_created(agent));
        assert!(!ctx.is_agent_started(agent));
    }

    #[test]
    fn test_created_agent_starts_unstarted() {
        let ctx = context();
        let agent = AgentId::random();
        assert!(ctx.mark_agent_started(agent).is_ok());
        assert!(ctx.mark_agent_created(agent).is_ok());

        assert!(ctx.is_agent_created(agent));
        assert!(!ctx.is_agent_started(agent));

        assert!(ctx.mark_agent_started(agent).is_ok());
        assert!(ctx.is_agent_started(agent));
    }

    #[test]
    fn test_flags_are_per_agent() {
        let ctx = context();
        let first = AgentId::random();
        let second = AgentId::random();
        assert!(ctx.mark_agent_started(first).is_ok());
        assert!(!ctx.is_agent_started(second));
    }

    #[test]
    fn test_current_chat_pointer() {
        let ctx = context();
        assert!(ctx.current_chat().is_none());

        let pointer = ChatPointer {
            agent_id: AgentId::random(),
            module_id: ModuleId::new("0x8d4e"),
        };
        assert!(ctx.set_current_chat(&pointer).is_ok());
        assert_eq!(ctx.current_chat(), Some(pointer));
    }

    #[test]
    fn test_garbage_snapshot_reads_as_absent() {
        let ctx = context();
        assert!(ctx.storage().set(BUILD_CONFIG_KEY, "[1,2", None).is_ok());
        assert!(ctx.load_build_config().is_none());
    }
}
