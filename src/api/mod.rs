//! Clients for the two external REST services.
//!
//! - `chat`: the agent chat backend (messages, agent lifecycle)
//! - `module_store`: the module content store (memory modules, uploads)
//! - `response`: shared response checking and error message extraction
//!
//! The session code depends on the `ChatBackend` and `ModuleStore` traits
//! only, so it can run against in-memory fakes.

pub mod chat;
pub mod module_store;
pub mod response;

pub use chat::{AgentInfo, AgentSummary, ChatClient, FileUpload, ResponseMessage};
pub use module_store::{
    AppendModuleRequest, CreateModuleRequest, ModuleStoreClient, ModuleSummary,
};
pub use response::{OneOrMany, error_message};

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::error::{BabError, BabResult};
use crate::ids::{AgentId, ModuleId};

/// Content of a memory module: entry key to stored message record.
pub type ModuleContent = Map<String, Value>;

/// Boxed future type for service calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read and append access to module content.
pub trait ModuleStore: Send + Sync {
    /// Fetch the raw content of a module.
    ///
    /// # Errors
    /// Returns an error if the request fails or the module is unknown.
    fn fetch_content(&self, module_id: &ModuleId) -> ApiFuture<'_, BabResult<Value>>;

    /// Merge new keyed entries into a module.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    fn append_module(
        &self,
        module_id: &ModuleId,
        entries: ModuleContent,
    ) -> ApiFuture<'_, BabResult<()>>;

    /// Fetch a module's content as a keyed map.
    ///
    /// # Errors
    /// Returns an error if the request fails or the content is not a map.
    fn get_module(&self, module_id: &ModuleId) -> ApiFuture<'_, BabResult<ModuleContent>> {
        let fetch = self.fetch_content(module_id);
        Box::pin(async move { content_map(fetch.await?) })
    }
}

/// Message exchange and agent lifecycle on the chat backend.
pub trait ChatBackend: Send + Sync {
    /// Send a user message and return the agent's reply (at most one message).
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    fn send_message(
        &self,
        agent_id: AgentId,
        text: String,
        file: Option<FileUpload>,
    ) -> ApiFuture<'_, BabResult<Vec<ResponseMessage>>>;

    /// Start a new agent from a composed character.
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    fn start_agent(&self, character: Value) -> ApiFuture<'_, BabResult<AgentInfo>>;
}

/// Interpret raw module content as a keyed map.
///
/// The store may hand back the map itself, the map serialized as a JSON
/// string (as written at creation time), or nothing for a fresh module.
///
/// # Errors
/// Returns an error if the content is neither.
pub fn content_map(content: Value) -> BabResult<ModuleContent> {
    match content {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ModuleContent::new()),
        Value::String(raw) if raw.trim().is_empty() => Ok(ModuleContent::new()),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            other => Err(BabError::UnexpectedResponse(format!(
                "module content is not a map: {other}"
            ))),
        },
        other => Err(BabError::UnexpectedResponse(format!(
            "module content is not a map: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_content_map_accepts_object_and_string() {
        let direct = content_map(json!({"k": {"text": "hi"}}));
        assert_eq!(direct.map(|m| m.len()).ok(), Some(1));

        let encoded = content_map(json!("{\"k\": {\"text\": \"hi\"}}"));
        assert_eq!(encoded.map(|m| m.len()).ok(), Some(1));

        let fresh = content_map(Value::Null);
        assert!(fresh.is_ok_and(|m| m.is_empty()));
    }

    #[test]
    fn test_content_map_rejects_arrays() {
        assert!(matches!(
            content_map(json!(["fact"])),
            Err(BabError::UnexpectedResponse(_))
        ));
    }
}
