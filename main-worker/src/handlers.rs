//! HTTP handlers for the client-facing REST surface.
//!
//! Mirrors the teacher's `handlers.rs` shape — a `State<Arc<AppState>>`
//! extractor per handler, `utoipa::path` annotations, REST errors
//! mapped straight from `StoreError` — generalized from NDA process
//! CRUD onto the entity/schema contracts this service actually serves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json as ResponseJson;
use chrono::Utc;
use store_core::error::StoreError;
use store_proto::ProcessRequest;

use crate::auth::{Authorizer, Permission};
use crate::models::{
    EntityKeyQuery, ErrorResponse, HealthResponse, LoginRequest, LoginResponse, PutEntityBody, PutEntityQuery,
    StatusOkResponse, WorkerSummary,
};
use crate::registry::WorkerRegistry;
use crate::router::Router;

pub struct AppState {
    pub registry: Arc<WorkerRegistry>,
    pub router: Router,
    pub authorizer: Authorizer,
    pub templates: Arc<dyn store_core::storage::StorageBackend>,
    pub client_ttl: Duration,
    pub rest_max_body_size: usize,
}

impl From<StoreError> for (StatusCode, ResponseJson<ErrorResponse>) {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            StoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            StoreError::Forbidden => StatusCode::FORBIDDEN,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::AlreadyLocked(_) => StatusCode::CONFLICT,
            StoreError::IntegrityError(_) | StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, ResponseJson(ErrorResponse { error: err.wire_message() }))
    }
}

fn bearer_from(headers: &HeaderMap) -> Result<&str, (StatusCode, ResponseJson<ErrorResponse>)> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| StoreError::Unauthorized.into())
}

fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    required: Permission,
) -> Result<(), (StatusCode, ResponseJson<ErrorResponse>)> {
    let bearer = bearer_from(headers)?;
    let granted = state.authorizer.authorize_bearer(bearer).map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    Authorizer::require(&granted, required).map_err(Into::into)
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is healthy", body = HealthResponse)), tag = "Health")]
pub async fn health() -> ResponseJson<HealthResponse> {
    ResponseJson(HealthResponse { status: "ok".to_string() })
}

/// `POST /api/login`. Authorizes the credential and, on success, issues
/// a session token inheriting its exact permission set.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credential")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    axum::Json(payload): axum::Json<LoginRequest>,
) -> Result<ResponseJson<LoginResponse>, (StatusCode, ResponseJson<ErrorResponse>)> {
    let credential = payload
        .key
        .clone()
        .or_else(|| payload.client_id.clone())
        .ok_or(StoreError::InvalidArgument("body must set 'key' or 'client_id'".into()))
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

    let permissions = state
        .authorizer
        .authorize_credential(&credential)
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

    let token = crate::session::issue(&credential, &permissions, state.client_ttl, &state.authorizer.session_secret);
    let expires_at = Utc::now() + chrono::Duration::seconds(state.client_ttl.as_secs() as i64);

    Ok(ResponseJson(LoginResponse {
        token,
        client_id: credential,
        expires_at,
        permissions: permissions.iter().map(|p| p.as_str().to_string()).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/entity/{database}",
    params(("database" = String, Path), ("key" = String, Query), ("schema_id" = Option<String>, Query)),
    responses(
        (status = 200, description = "Entity body"),
        (status = 400, description = "Missing key/database"),
        (status = 404, description = "Entity not found")
    ),
    tag = "Entity"
)]
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(database): Path<String>,
    Query(query): Query<EntityKeyQuery>,
    headers: HeaderMap,
) -> Result<ResponseJson<serde_json::Value>, (StatusCode, ResponseJson<ErrorResponse>)> {
    authorize(&state, &headers, Permission::Read)?;
    let key = query.key.ok_or(StoreError::InvalidArgument("missing 'key' query parameter".into())).map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

    let entity_id = store_core::entity::entity_id(&database, &key).map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    let response = state
        .router
        .dispatch(
            &entity_id,
            ProcessRequest {
                database_name: database,
                entity_key: key,
                operation: "GET".to_string(),
                schema_id: query.schema_id.unwrap_or_default(),
                payload: Vec::new(),
                token: String::new(),
            },
        )
        .await
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

    if response.status != "OK" {
        return Err(process_error(&response));
    }
    let value: serde_json::Value = serde_json::from_slice(&response.result)
        .map_err(|e| StoreError::Internal(format!("stored body is not valid JSON: {e}")))
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    Ok(ResponseJson(value))
}

#[utoipa::path(
    put,
    path = "/entity/{database}",
    params(("database" = String, Path), ("schema_id" = Option<String>, Query)),
    request_body = PutEntityBody,
    responses(
        (status = 200, description = "All entities stored", body = StatusOkResponse),
        (status = 400, description = "Invalid JSON, oversize body, or schema violation")
    ),
    tag = "Entity"
)]
pub async fn put_entity(
    State(state): State<Arc<AppState>>,
    Path(database): Path<String>,
    Query(query): Query<PutEntityQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<ResponseJson<StatusOkResponse>, (StatusCode, ResponseJson<ErrorResponse>)> {
    authorize(&state, &headers, Permission::Write)?;

    if body.len() > state.rest_max_body_size {
        return Err(StoreError::InvalidArgument(format!(
            "body of {} bytes exceeds rest_max_body_size of {}",
            body.len(),
            state.rest_max_body_size
        ))
        .into());
    }

    let entries: HashMap<String, serde_json::Value> = serde_json::from_slice(&body)
        .map_err(|e| StoreError::InvalidArgument(format!("body is not a JSON object: {e}")))
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

    for (key, value) in entries {
        let payload = serde_json::to_vec(&value)
            .map_err(|e| StoreError::InvalidArgument(format!("entity '{key}' is not serializable: {e}")))
            .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
        let entity_id = store_core::entity::entity_id(&database, &key).map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

        let response = state
            .router
            .dispatch(
                &entity_id,
                ProcessRequest {
                    database_name: database.clone(),
                    entity_key: key,
                    operation: "PUT".to_string(),
                    schema_id: query.schema_id.clone().unwrap_or_default(),
                    payload,
                    token: String::new(),
                },
            )
            .await
            .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

        if response.status != "OK" {
            return Err(process_error(&response));
        }
    }

    Ok(ResponseJson(StatusOkResponse { status: "ok".to_string() }))
}

#[utoipa::path(
    delete,
    path = "/entity/{database}",
    params(("database" = String, Path), ("key" = String, Query)),
    responses((status = 200, description = "Deleted (idempotent)", body = StatusOkResponse), (status = 400, description = "Missing key")),
    tag = "Entity"
)]
pub async fn delete_entity(
    State(state): State<Arc<AppState>>,
    Path(database): Path<String>,
    Query(query): Query<EntityKeyQuery>,
    headers: HeaderMap,
) -> Result<ResponseJson<StatusOkResponse>, (StatusCode, ResponseJson<ErrorResponse>)> {
    authorize(&state, &headers, Permission::Write)?;
    let key = query.key.ok_or(StoreError::InvalidArgument("missing 'key' query parameter".into())).map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    let entity_id = store_core::entity::entity_id(&database, &key).map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

    let response = state
        .router
        .dispatch(
            &entity_id,
            ProcessRequest {
                database_name: database,
                entity_key: key,
                operation: "DELETE".to_string(),
                schema_id: String::new(),
                payload: Vec::new(),
                token: String::new(),
            },
        )
        .await
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;

    // Delete is idempotent on missing: a worker-side NotFound is not
    // surfaced as a REST error here.
    if response.status != "OK" && response.status != "NotFound" {
        return Err(process_error(&response));
    }
    Ok(ResponseJson(StatusOkResponse { status: "ok".to_string() }))
}

#[utoipa::path(get, path = "/admin/workers", responses((status = 200, description = "Registered workers", body = [WorkerSummary])), tag = "Admin")]
pub async fn list_workers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<ResponseJson<Vec<WorkerSummary>>, (StatusCode, ResponseJson<ErrorResponse>)> {
    authorize(&state, &headers, Permission::Admin)?;
    let workers: Vec<WorkerSummary> = state.registry.snapshot().into_iter().map(Into::into).collect();
    Ok(ResponseJson(workers))
}

#[utoipa::path(get, path = "/admin/schemas", responses((status = 200, description = "Known schema ids", body = [String])), tag = "Schema")]
pub async fn list_schemas(
    State(state): State<Arc<AppState>>,
) -> Result<ResponseJson<Vec<String>>, (StatusCode, ResponseJson<ErrorResponse>)> {
    let dir = state
        .templates
        .templates_dir()
        .await
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    let mut ids = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    ids.push(name.to_string());
                }
            }
        }
    }
    Ok(ResponseJson(ids))
}

#[utoipa::path(get, path = "/schema/{id}", params(("id" = String, Path)), responses((status = 200, description = "Schema document"), (status = 404, description = "Unknown schema")), tag = "Schema")]
pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Path(schema_id): Path<String>,
) -> Result<ResponseJson<serde_json::Value>, (StatusCode, ResponseJson<ErrorResponse>)> {
    let bytes = state
        .templates
        .read_template(&schema_id)
        .await
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Internal(format!("stored schema is not valid JSON: {e}")))
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    Ok(ResponseJson(value))
}

#[utoipa::path(put, path = "/schema/{id}", params(("id" = String, Path)), responses((status = 200, description = "Schema stored", body = StatusOkResponse)), tag = "Schema")]
pub async fn put_schema(
    State(state): State<Arc<AppState>>,
    Path(schema_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<ResponseJson<StatusOkResponse>, (StatusCode, ResponseJson<ErrorResponse>)> {
    authorize(&state, &headers, Permission::Write)?;
    state
        .templates
        .write_template(&schema_id, &body)
        .await
        .map_err(Into::<(StatusCode, ResponseJson<ErrorResponse>)>::into)?;
    Ok(ResponseJson(StatusOkResponse { status: "ok".to_string() }))
}

fn process_error(response: &store_proto::ProcessResponse) -> (StatusCode, ResponseJson<ErrorResponse>) {
    let status = match response.status.as_str() {
        "InvalidArgument" => StatusCode::BAD_REQUEST,
        "Unauthorized" => StatusCode::UNAUTHORIZED,
        "Forbidden" => StatusCode::FORBIDDEN,
        "NotFound" => StatusCode::NOT_FOUND,
        "AlreadyLocked" => StatusCode::CONFLICT,
        "Unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, ResponseJson(ErrorResponse { error: response.error.clone() }))
}
