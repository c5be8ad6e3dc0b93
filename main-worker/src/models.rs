//! REST request/response shapes for the client-facing surface,
//! annotated with `utoipa::ToSchema` in the teacher's `models.rs`
//! style.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::registry::{WorkerRecord, WorkerStatus};

/// `POST /api/login` body. `key` is the primary credential; `client_id`
/// is accepted as a legacy alias in dev mode.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub key: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusOkResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EntityKeyQuery {
    pub key: Option<String>,
    pub schema_id: Option<String>,
}

/// Query parameters accepted alongside a `PUT /entity/{database}` body.
/// `schema_id`, when set, is validated against for every entity in the
/// batch.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PutEntityQuery {
    pub schema_id: Option<String>,
}

/// `PUT /entity/{database}` body: one or more `entity_key → entity_body`
/// pairs, each stored as a separate entity.
pub type PutEntityBody = HashMap<String, serde_json::Value>;

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkerSummary {
    pub worker_id: String,
    pub status: String,
    pub key_id: String,
    pub last_seen: String,
    pub tags: HashMap<String, String>,
}

impl From<WorkerRecord> for WorkerSummary {
    fn from(record: WorkerRecord) -> Self {
        let last_seen = Utc::now() - chrono::Duration::from_std(record.last_seen.elapsed()).unwrap_or_default();
        Self {
            worker_id: record.worker_id,
            status: match record.status {
                WorkerStatus::Available => "available".to_string(),
                WorkerStatus::Deallocating => "deallocating".to_string(),
            },
            key_id: record.key_id,
            last_seen: last_seen.to_rfc3339(),
            tags: record.tags,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
