//! HTTP route handlers for the local module store.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};

use crate::api::{AppendModuleRequest, CreateModuleRequest, ModuleSummary};
use crate::ids::ModuleId;

use super::state::{ModuleStoreState, StoreError};

/// Create the API router with all routes.
pub fn create_router(state: Arc<ModuleStoreState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/getModule/{module_id}", get(get_module))
        .route("/api/appendModule", post(append_module))
        .route("/api/createModule", post(create_module))
        .route("/api/listModules", get(list_modules))
        .with_state(state)
}

/// Error body sent with every non-success response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            StoreError::InvalidContent(_) => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<ModuleStoreState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "bab-module-store",
        "version": env!("CARGO_PKG_VERSION"),
        "modules": state.len(),
    }))
}

/// Payload wrapper used by every success response.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    /// Response payload.
    pub data: T,
}

/// A module with its content.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDto {
    /// Listing metadata.
    #[serde(flatten)]
    pub summary: ModuleSummary,
    /// Decoded content.
    pub content: Value,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last update time (RFC 3339).
    pub updated_at: String,
}

async fn get_module(
    State(state): State<Arc<ModuleStoreState>>,
    Path(module_id): Path<String>,
) -> Result<Json<DataResponse<ModuleDto>>, ApiError> {
    let record = state.get(&ModuleId::new(module_id))?;

    Ok(Json(DataResponse {
        data: ModuleDto {
            summary: record.summary,
            content: record.content,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        },
    }))
}

async fn append_module(
    State(state): State<Arc<ModuleStoreState>>,
    Json(request): Json<AppendModuleRequest>,
) -> Result<Json<Value>, ApiError> {
    let added = state.append(&request.module_id, &request.content)?;
    tracing::debug!("Appended {added} entries to module {}", request.module_id);

    Ok(Json(json!({ "success": true, "added": added })))
}

async fn create_module(
    State(state): State<Arc<ModuleStoreState>>,
    Json(request): Json<CreateModuleRequest>,
) -> Result<(StatusCode, Json<DataResponse<ModuleSummary>>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "name is required".to_string(),
        });
    }

    let summary = state.create(request)?;
    tracing::info!("Created {} module {}", summary.module_type, summary.module_id);

    Ok((StatusCode::CREATED, Json(DataResponse { data: summary })))
}

async fn list_modules(
    State(state): State<Arc<ModuleStoreState>>,
) -> Json<DataResponse<Vec<ModuleSummary>>> {
    Json(DataResponse { data: state.list() })
}
