//! Chat backend client.
//!
//! Endpoints: `POST /{agentId}/message` (multipart), `POST /agent/start`,
//! `GET /agents`, `GET /agents/{agentId}`.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::response::{DEFAULT_ERROR_MESSAGE, OneOrMany, ensure_success};
use crate::api::{ApiFuture, ChatBackend};
use crate::chat::message::{Attachment, Message, Sender};
use crate::config::ClientConfig;
use crate::error::{BabError, BabResult};
use crate::ids::AgentId;

/// A message returned by the chat backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Reply text.
    #[serde(default)]
    pub text: String,
    /// Sender label as sent by the backend.
    #[serde(default)]
    pub user: Option<String>,
    /// Attached files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    /// Action the agent decided to take, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Source of the reply, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ResponseMessage {
    /// Normalised sender; replies without a label are the agent's.
    #[must_use]
    pub fn sender(&self) -> Sender {
        self.user
            .as_deref()
            .and_then(Sender::from_label)
            .unwrap_or(Sender::Assistant)
    }

    /// Convert to a conversation message stamped at `created_at`.
    #[must_use]
    pub fn into_message(self, created_at: i64) -> Message {
        let user = self.sender();
        Message {
            text: self.text,
            user,
            created_at,
            attachments: self.attachments,
        }
    }
}

/// A file staged for upload with a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    /// File name sent in the form part.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Build an upload from memory.
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read an upload from disk, guessing the MIME type from the extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> BabResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = guess_content_type(&file_name).to_string();
        Ok(Self::new(file_name, content_type, bytes))
    }

    /// Only images may be attached to chat messages.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Metadata embedded in the local user message.
    #[must_use]
    pub fn attachment(&self) -> Attachment {
        Attachment {
            url: format!("attachment://{}", self.file_name),
            content_type: self.content_type.clone(),
            title: self.file_name.clone(),
        }
    }
}

fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "wav" => "audio/wav",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Agent returned by `start_agent` and `get_agent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent identifier.
    pub id: AgentId,
    /// Character the agent runs with.
    #[serde(default)]
    pub character: Value,
}

/// Entry of the agent listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Agent identifier.
    pub id: AgentId,
    /// Character name.
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct AgentsResponse {
    #[serde(default)]
    agents: Vec<AgentSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartAgentRequest<'a> {
    character_json: &'a Value,
}

/// HTTP client for the chat backend.
#[derive(Clone, Debug)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    /// Create a client for the configured chat backend.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> BabResult<Self> {
        url::Url::parse(&config.chat_base_url)?;

        Ok(Self {
            client: build_client(config)?,
            base_url: config.chat_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a message; see [`ChatBackend::send_message`].
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn send(
        &self,
        agent_id: AgentId,
        text: String,
        file: Option<FileUpload>,
    ) -> BabResult<Vec<ResponseMessage>> {
        let mut form = Form::new().text("text", text).text("user", "user");
        if let Some(file) = file {
            let part = Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.content_type)?;
            form = form.part("file", part);
        }

        let response = self
            .client
            .post(self.endpoint(&format!("/{agent_id}/message")))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response, DEFAULT_ERROR_MESSAGE).await?;

        let body: OneOrMany<ResponseMessage> = response.json().await?;
        let mut messages = body.into_vec();
        messages.truncate(1);
        Ok(messages)
    }

    /// Start an agent; see [`ChatBackend::start_agent`].
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn start(&self, character: &Value) -> BabResult<AgentInfo> {
        let response = self
            .client
            .post(self.endpoint("/agent/start"))
            .json(&StartAgentRequest {
                character_json: character,
            })
            .send()
            .await?;
        let response = ensure_success(response, DEFAULT_ERROR_MESSAGE).await?;
        Ok(response.json().await?)
    }

    /// List running agents.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_agents(&self) -> BabResult<Vec<AgentSummary>> {
        let response = self.client.get(self.endpoint("/agents")).send().await?;
        let response = ensure_success(response, DEFAULT_ERROR_MESSAGE).await?;
        let body: AgentsResponse = response.json().await?;
        Ok(body.agents)
    }

    /// Fetch one agent.
    ///
    /// # Errors
    /// Returns an error if the request fails or the agent is unknown.
    pub async fn get_agent(&self, agent_id: AgentId) -> BabResult<AgentInfo> {
        let response = self
            .client
            .get(self.endpoint(&format!("/agents/{agent_id}")))
            .send()
            .await?;
        let response = ensure_success(response, DEFAULT_ERROR_MESSAGE).await?;
        Ok(response.json().await?)
    }
}

impl ChatBackend for ChatClient {
    fn send_message(
        &self,
        agent_id: AgentId,
        text: String,
        file: Option<FileUpload>,
    ) -> ApiFuture<'_, BabResult<Vec<ResponseMessage>>> {
        Box::pin(self.send(agent_id, text, file))
    }

    fn start_agent(&self, character: Value) -> ApiFuture<'_, BabResult<AgentInfo>> {
        Box::pin(async move { self.start(&character).await })
    }
}

/// Build an HTTP client for JSON services.
pub(crate) fn build_client(config: &ClientConfig) -> BabResult<reqwest::Client> {
    use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .gzip(true)
        .build()
        .map_err(|e| BabError::HttpClient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::extract::{Multipart, Path as AxumPath};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use serde_json::json;

    use super::*;

    const MISSING_AGENT: &str = "00000000-0000-0000-0000-000000000000";

    async fn message_handler(
        AxumPath(agent_id): AxumPath<String>,
        mut multipart: Multipart,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        if agent_id == MISSING_AGENT {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({"message": "Agent not found"})),
            ));
        }

        let mut text = String::new();
        let mut user = String::new();
        let mut file = None;
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "text" => text = field.text().await.unwrap_or_default(),
                "user" => user = field.text().await.unwrap_or_default(),
                "file" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let len = field.bytes().await.map(|b| b.len()).unwrap_or_default();
                    file = Some(format!("{file_name}:{len}"));
                }
                _ => {}
            }
        }

        if let Some(file) = file {
            return Ok(Json(json!({"text": format!("got {file}"), "user": "system"})));
        }

        Ok(Json(json!([
            {"text": format!("{user} said {text}"), "user": "Eliza", "action": "NONE"},
            {"text": "dropped", "user": "Eliza"}
        ])))
    }

    async fn start_handler(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({
            "id": "b850bc30-45f8-0041-a00a-83df46d8555d",
            "character": body["characterJson"].clone(),
        }))
    }

    async fn agents_handler() -> Json<Value> {
        Json(json!({"agents": [
            {"id": "b850bc30-45f8-0041-a00a-83df46d8555d", "name": "Eliza", "clients": []}
        ]}))
    }

    async fn spawn_backend() -> ChatClient {
        let app = Router::new()
            .route("/{agent_id}/message", post(message_handler))
            .route("/agent/start", post(start_handler))
            .route("/agents", get(agents_handler));

        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(err) => panic!("bind: {err}"),
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(err) => panic!("addr: {err}"),
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = ClientConfig::new().with_chat_url(format!("http://{addr}/"));
        match ChatClient::new(&config) {
            Ok(client) => client,
            Err(err) => panic!("client: {err}"),
        }
    }

    #[tokio::test]
    async fn test_send_keeps_only_first_reply() {
        let client = spawn_backend().await;
        let replies = client
            .send_message(AgentId::random(), "hello".to_string(), None)
            .await;

        let Ok(replies) = replies else {
            panic!("send failed: {replies:?}");
        };
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, "user said hello");
        assert_eq!(replies[0].action.as_deref(), Some("NONE"));
        assert_eq!(replies[0].sender(), Sender::Assistant);
    }

    #[tokio::test]
    async fn test_send_with_file_and_single_object_reply() {
        let client = spawn_backend().await;
        let file = FileUpload::new("cat.png", "image/png", vec![1, 2, 3]);
        let replies = client
            .send_message(AgentId::random(), "look".to_string(), Some(file))
            .await
            .unwrap_or_default();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, "got cat.png:3");
        assert_eq!(replies[0].user.as_deref(), Some("system"));
    }

    #[tokio::test]
    async fn test_backend_error_message_is_surfaced() {
        let client = spawn_backend().await;
        let agent: AgentId = MISSING_AGENT.parse().unwrap_or_else(|_| AgentId::random());
        let result = client.send_message(agent, "hi".to_string(), None).await;

        match result {
            Err(BabError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "Agent not found");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_and_list_agents() {
        let client = spawn_backend().await;
        let info = client.start_agent(json!({"name": "Eliza#12"})).await;
        let Ok(info) = info else {
            panic!("start failed: {info:?}");
        };
        assert_eq!(info.character["name"], "Eliza#12");

        let agents = client.list_agents().await.unwrap_or_default();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, info.id);
    }

    #[test]
    fn test_upload_helpers() {
        let upload = FileUpload::new("scan.JPG", guess_content_type("scan.JPG"), Vec::new());
        assert!(upload.is_image());
        assert_eq!(upload.attachment().title, "scan.JPG");

        let doc = FileUpload::new("notes.txt", guess_content_type("notes.txt"), Vec::new());
        assert!(!doc.is_image());
    }
}
