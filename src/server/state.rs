//! In-memory module records shared across all request handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use thiserror::Error;

use crate::api::{CreateModuleRequest, ModuleContent, ModuleSummary};
use crate::ids::ModuleId;
use crate::modules::ModuleType;

/// Failures of store operations, mapped to 4xx responses.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No module with this id.
    #[error("Module {0} not found")]
    NotFound(ModuleId),
    /// A module with this id already exists.
    #[error("Module {0} already exists")]
    AlreadyExists(ModuleId),
    /// The submitted content is unusable.
    #[error("{0}")]
    InvalidContent(String),
}

/// A stored module.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleRecord {
    /// Listing metadata.
    pub summary: ModuleSummary,
    /// Decoded content.
    pub content: Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last append.
    pub updated_at: DateTime<Utc>,
}

/// Shared application state.
#[derive(Debug, Default)]
pub struct ModuleStoreState {
    modules: DashMap<ModuleId, ModuleRecord>,
}

impl ModuleStoreState {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of stored modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Register a new module.
    ///
    /// # Errors
    /// Fails if the id is taken or the content is not valid JSON.
    pub fn create(&self, request: CreateModuleRequest) -> Result<ModuleSummary, StoreError> {
        let content = decode_content(&request.content)?;

        match self.modules.entry(request.module_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(request.module_id)),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let summary = ModuleSummary {
                    module_id: request.module_id,
                    name: request.name,
                    module_type: request.module_type,
                    description: request.description,
                    image_url: request.image_url,
                    creator_id: request.creator_id,
                };
                slot.insert(ModuleRecord {
                    summary: summary.clone(),
                    content,
                    created_at: now,
                    updated_at: now,
                });
                Ok(summary)
            }
        }
    }

    /// Merge entries into a module's keyed content; later keys win.
    ///
    /// An unknown module is created as an unnamed memory module.
    ///
    /// # Errors
    /// Fails if the entries are not a JSON object or the module content is not keyed.
    pub fn append(&self, module_id: &ModuleId, raw_entries: &str) -> Result<usize, StoreError> {
        let entries = match decode_content(raw_entries)? {
            Value::Object(map) => map,
            _ => {
                return Err(StoreError::InvalidContent(
                    "content must be a JSON object".to_string(),
                ));
            }
        };
        let added = entries.len();
        let now = Utc::now();

        let mut record = self.modules.entry(module_id.clone()).or_insert_with(|| {
            tracing::debug!("Creating memory module {module_id} on first append");
            ModuleRecord {
                summary: ModuleSummary {
                    module_id: module_id.clone(),
                    name: String::new(),
                    module_type: ModuleType::Memory,
                    description: String::new(),
                    image_url: String::new(),
                    creator_id: String::new(),
                },
                content: Value::Object(ModuleContent::new()),
                created_at: now,
                updated_at: now,
            }
        });

        if record.content.is_null() {
            record.content = Value::Object(ModuleContent::new());
        }
        let Value::Object(content) = &mut record.content else {
            return Err(StoreError::InvalidContent(format!(
                "Module {module_id} does not hold keyed content"
            )));
        };
        content.extend(entries);
        record.updated_at = now;

        Ok(added)
    }

    /// Fetch a module.
    ///
    /// # Errors
    /// Fails if the module does not exist.
    pub fn get(&self, module_id: &ModuleId) -> Result<ModuleRecord, StoreError> {
        self.modules
            .get(module_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::NotFound(module_id.clone()))
    }

    /// Listing metadata of every module, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<ModuleSummary> {
        let mut records: Vec<(DateTime<Utc>, ModuleSummary)> = self
            .modules
            .iter()
            .map(|r| (r.created_at, r.summary.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.module_id.cmp(&b.1.module_id)));
        records.into_iter().map(|(_, summary)| summary).collect()
    }
}

fn decode_content(raw: &str) -> Result<Value, StoreError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(ModuleContent::new()));
    }
    serde_json::from_str(raw).map_err(|e| StoreError::InvalidContent(format!("invalid JSON content: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_request(id: &str) -> CreateModuleRequest {
        CreateModuleRequest {
            module_id: ModuleId::from(id),
            name: "Agent Memory".to_string(),
            module_type: ModuleType::Memory,
            image_url: String::new(),
            content: "{}".to_string(),
            creator_id: "0xabc".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_append_merges_and_last_write_wins() {
        let state = ModuleStoreState::new();
        assert!(state.create(memory_request("mem")).is_ok());

        let id = ModuleId::from("mem");
        assert!(state.append(&id, r#"{"a": 1, "b": 2}"#).is_ok());
        assert!(state.append(&id, r#"{"b": 3}"#).is_ok());

        let content = state.get(&id).map(|r| r.content).unwrap_or_default();
        assert_eq!(content, serde_json::json!({"a": 1, "b": 3}));
    }

    #[test]
    fn test_append_to_unknown_module_creates_it() {
        let state = ModuleStoreState::new();
        let id = ModuleId::from("fresh");
        assert_eq!(state.append(&id, r#"{"k": true}"#).ok(), Some(1));
        assert_eq!(state.list().len(), 1);
        assert_eq!(state.list()[0].module_type, ModuleType::Memory);
    }

    #[test]
    fn test_duplicate_create_is_rejected() {
        let state = ModuleStoreState::new();
        assert!(state.create(memory_request("mem")).is_ok());
        assert!(matches!(
            state.create(memory_request("mem")),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_append_to_list_content_is_rejected() {
        let state = ModuleStoreState::new();
        let mut request = memory_request("lore");
        request.module_type = ModuleType::Knowledge;
        request.content = r#"["fact"]"#.to_string();
        assert!(state.create(request).is_ok());

        assert!(matches!(
            state.append(&ModuleId::from("lore"), r#"{"k": 1}"#),
            Err(StoreError::InvalidContent(_))
        ));
    }

    #[test]
    fn test_unknown_module_not_found() {
        let state = ModuleStoreState::new();
        assert!(matches!(
            state.get(&ModuleId::from("nope")),
            Err(StoreError::NotFound(_))
        ));
    }
}
