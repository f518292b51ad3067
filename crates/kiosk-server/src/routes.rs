use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use kiosk_core::{CheckInRecord, CreatedDocument, StoredDocument};

use crate::error::ApiError;
use crate::storage::{DocumentDatabase, FieldValue, is_valid_name};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: DocumentDatabase,
    /// Collection `POST /api/checkin` writes into.
    pub checkin_collection: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/v1/collections/{name}/documents",
            post(add_document).get(query_documents),
        )
        .route("/api/checkin", post(submit_checkin))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    field: Option<String>,
    value: Option<String>,
}

fn check_name(kind: &str, name: &str) -> Result<(), ApiError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid {kind} name '{name}'")))
    }
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /v1/collections/{name}/documents`
pub async fn add_document(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<CreatedDocument>), ApiError> {
    check_name("collection", &name)?;
    let Value::Object(fields) = payload else {
        return Err(ApiError::BadRequest("Document must be a JSON object".into()));
    };

    let doc = state.db.insert_document(&name, fields).await?;
    debug!(collection = %name, id = %doc.id, "Document stored");
    Ok((StatusCode::CREATED, Json(CreatedDocument { id: doc.id })))
}

/// `GET /v1/collections/{name}/documents[?field=..&value=..]`
pub async fn query_documents(
    Path(name): Path<String>,
    Query(query): Query<DocumentQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredDocument>>, ApiError> {
    check_name("collection", &name)?;

    let docs = match (query.field, query.value) {
        (None, None) => state.db.list_documents(&name).await?,
        (Some(field), Some(value)) => {
            check_name("field", &field)?;
            state
                .db
                .find_documents(&name, &field, &FieldValue::parse(&value))
                .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "field and value must be given together".into(),
            ));
        }
    };
    Ok(Json(docs))
}

/// `POST /api/checkin`
pub async fn submit_checkin(
    State(state): State<AppState>,
    Json(record): Json<CheckInRecord>,
) -> Result<(StatusCode, Json<CreatedDocument>), ApiError> {
    record
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let Ok(Value::Object(fields)) = serde_json::to_value(&record) else {
        return Err(ApiError::BadRequest("Check-in is not a JSON object".into()));
    };
    let doc = state
        .db
        .insert_document(&state.checkin_collection, fields)
        .await?;
    info!(id = %doc.id, room = %record.room, "Check-in received");
    Ok((StatusCode::CREATED, Json(CreatedDocument { id: doc.id })))
}
