//! Module store client.
//!
//! Memory modules hold a conversation as a map of entry keys to message
//! records; appends merge keys server-side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::chat::build_client;
use crate::api::response::ensure_success;
use crate::api::{ApiFuture, ModuleContent, ModuleStore};
use crate::config::ClientConfig;
use crate::error::{BabError, BabResult};
use crate::ids::ModuleId;
use crate::modules::{ModuleType, ModuleUpload};

const FETCH_FAILED: &str = "Failed to fetch memory module";
const APPEND_FAILED: &str = "Failed to append to memory module";
const CREATE_FAILED: &str = "Failed to create module";
const LIST_FAILED: &str = "Failed to list modules";

/// Name given to memory modules created for new agents.
pub const MEMORY_MODULE_NAME: &str = "Agent Memory";
/// Description given to memory modules created for new agents.
pub const MEMORY_MODULE_DESCRIPTION: &str = "Memory storage for agent interactions";

/// Body of `POST /api/appendModule`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendModuleRequest {
    /// Target module.
    pub module_id: ModuleId,
    /// New entries, serialized as a JSON object string.
    pub content: String,
}

/// Body of `POST /api/createModule`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModuleRequest {
    /// Identifier of the new module.
    pub module_id: ModuleId,
    /// Display name.
    pub name: String,
    /// Module type.
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    /// Image URL.
    #[serde(default)]
    pub image_url: String,
    /// Initial content as a JSON string.
    pub content: String,
    /// Owner address.
    #[serde(default)]
    pub creator_id: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

/// Entry of `GET /api/listModules`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    /// Module identifier.
    pub module_id: ModuleId,
    /// Display name.
    pub name: String,
    /// Module type.
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Image URL.
    #[serde(default)]
    pub image_url: String,
    /// Owner address.
    #[serde(default)]
    pub creator_id: String,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ModuleData {
    #[serde(default)]
    content: Value,
}

/// HTTP client for the module store.
#[derive(Clone, Debug)]
pub struct ModuleStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl ModuleStoreClient {
    /// Create a client for the configured module store.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> BabResult<Self> {
        url::Url::parse(&config.module_store_url)?;

        Ok(Self {
            client: build_client(config)?,
            base_url: config.module_store_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    /// Fetch raw module content.
    ///
    /// # Errors
    /// Returns an error if the request fails or the module is unknown.
    pub async fn fetch(&self, module_id: &ModuleId) -> BabResult<Value> {
        let response = self
            .client
            .get(self.endpoint(&format!("/getModule/{module_id}")))
            .send()
            .await?;
        let response = ensure_success(response, FETCH_FAILED).await?;

        let body: DataEnvelope<ModuleData> = response.json().await?;
        Ok(body.data.content)
    }

    /// Merge entries into a module.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn append(&self, module_id: &ModuleId, entries: &ModuleContent) -> BabResult<()> {
        let request = AppendModuleRequest {
            module_id: module_id.clone(),
            content: serde_json::to_string(entries)?,
        };

        let response = self
            .client
            .post(self.endpoint("/appendModule"))
            .json(&request)
            .send()
            .await?;
        ensure_success(response, APPEND_FAILED).await?;

        tracing::debug!("Appended {} entries to module {module_id}", entries.len());
        Ok(())
    }

    /// Publish a user-supplied module.
    ///
    /// # Errors
    /// Returns `InvalidUpload` if the form does not validate, or an error if
    /// the request fails.
    pub async fn create_module(
        &self,
        upload: &ModuleUpload,
        module_id: &ModuleId,
        creator_id: &str,
    ) -> BabResult<()> {
        let errors = upload.validate();
        if !errors.is_empty() {
            return Err(BabError::InvalidUpload(errors));
        }

        self.create(&CreateModuleRequest {
            module_id: module_id.clone(),
            name: upload.name.clone(),
            module_type: upload.module_type,
            image_url: upload.image_url.clone(),
            content: upload.content.clone(),
            creator_id: creator_id.to_string(),
            description: upload.description.clone(),
        })
        .await
    }

    /// Create the empty memory module backing a new agent's conversation.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn create_memory_module(
        &self,
        module_id: &ModuleId,
        creator_id: &str,
    ) -> BabResult<()> {
        self.create(&CreateModuleRequest {
            module_id: module_id.clone(),
            name: MEMORY_MODULE_NAME.to_string(),
            module_type: ModuleType::Memory,
            image_url: String::new(),
            content: "{}".to_string(),
            creator_id: creator_id.to_string(),
            description: MEMORY_MODULE_DESCRIPTION.to_string(),
        })
        .await
    }

    async fn create(&self, request: &CreateModuleRequest) -> BabResult<()> {
        let response = self
            .client
            .post(self.endpoint("/createModule"))
            .json(request)
            .send()
            .await?;
        ensure_success(response, CREATE_FAILED).await?;

        tracing::info!(
            "Created {} module {} ({})",
            request.module_type,
            request.module_id,
            request.name
        );
        Ok(())
    }

    /// List every module known to the store.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_modules(&self) -> BabResult<Vec<ModuleSummary>> {
        let response = self
            .client
            .get(self.endpoint("/listModules"))
            .send()
            .await?;
        let response = ensure_success(response, LIST_FAILED).await?;

        let body: DataEnvelope<Vec<ModuleSummary>> = response.json().await?;
        Ok(body.data)
    }
}

impl ModuleStore for ModuleStoreClient {
    fn fetch_content(&self, module_id: &ModuleId) -> ApiFuture<'_, BabResult<Value>> {
        let module_id = module_id.clone();
        Box::pin(async move { self.fetch(&module_id).await })
    }

    fn append_module(
        &self,
        module_id: &ModuleId,
        entries: ModuleContent,
    ) -> ApiFuture<'_, BabResult<()>> {
        let module_id = module_id.clone();
        Box::pin(async move { self.append(&module_id, &entries).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> ModuleStoreClient {
        // Nothing listens on port 9; validation must fail before any request.
        let config = ClientConfig::new().with_module_store_url("http://127.0.0.1:9");
        match ModuleStoreClient::new(&config) {
            Ok(client) => client,
            Err(err) => panic!("client: {err}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_upload_is_refused_before_sending() {
        let upload = ModuleUpload::new("Lore", ModuleType::Knowledge).with_content("{not json");
        let result = unreachable_client()
            .create_module(&upload, &ModuleId::from("lore-1"), "0xabc")
            .await;

        match result {
            Err(BabError::InvalidUpload(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "content");
            }
            other => panic!("expected InvalidUpload, got {other:?}"),
        }
    }

    #[test]
    fn test_append_request_wire_shape() {
        let request = AppendModuleRequest {
            module_id: ModuleId::from("mem-1"),
            content: "{}".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap_or_default();
        assert_eq!(value, serde_json::json!({"moduleId": "mem-1", "content": "{}"}));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let config = ClientConfig::new().with_module_store_url("not a url");
        assert!(matches!(
            ModuleStoreClient::new(&config),
            Err(BabError::InvalidUrl(_))
        ));
    }
}
