use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::core::errors::ApiError;
use crate::index::{MetadataFilter, NewDocument};
use crate::server::handlers::utils::require_field;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub content: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub id: Option<String>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUploadRequest {
    pub documents: Option<Vec<Value>>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub content: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub organization_id: Option<String>,
    pub k: Option<usize>,
    pub filter: Option<MetadataFilter>,
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let organization_id = require_field(payload.organization_id.as_deref(), "organization_id")?;
    let content = payload
        .content
        .ok_or_else(|| ApiError::BadRequest("content is required".to_string()))?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let id = tenant
        .index
        .add_document(&content, payload.metadata.as_ref(), payload.id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "organization_id": organization_id
        })),
    ))
}

pub async fn upload_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let organization_id = require_field(payload.organization_id.as_deref(), "organization_id")?;
    let documents = payload.documents.unwrap_or_default();
    if documents.is_empty() {
        return Err(ApiError::BadRequest(
            "documents must be a non-empty array".to_string(),
        ));
    }

    let records = documents
        .into_iter()
        .map(|value| {
            serde_json::from_value::<NewDocument>(value)
                .map_err(|err| ApiError::BadRequest(format!("invalid document: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let ids = tenant.index.add_documents(&records).await?;
    let count = ids.len();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ids": ids,
            "count": count,
            "organization_id": organization_id
        })),
    ))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let organization_id = require_field(
        params.get("organization_id").map(String::as_str),
        "organization_id",
    )?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let document = tenant
        .index
        .get(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;
    Ok(Json(document))
}

pub async fn update_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
    Json(payload): Json<UpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let organization_id = require_field(payload.organization_id.as_deref(), "organization_id")?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let updated = tenant
        .index
        .update(
            &document_id,
            payload.content.as_deref(),
            payload.metadata.as_ref(),
        )
        .await?;
    if !updated {
        return Err(ApiError::NotFound("Document not found".to_string()));
    }

    Ok(Json(json!({
        "status": "updated",
        "id": document_id
    })))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let organization_id = require_field(
        params.get("organization_id").map(String::as_str),
        "organization_id",
    )?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let deleted = tenant.index.delete(&document_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Document not found".to_string()));
    }

    Ok(Json(json!({
        "status": "deleted",
        "id": document_id
    })))
}

pub async fn search_documents(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let organization_id = require_field(payload.organization_id.as_deref(), "organization_id")?;
    let query = require_field(payload.query.as_deref(), "query")?;
    let k = payload.k.unwrap_or(5);

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let results = tenant
        .index
        .search(&query, k, payload.filter.as_ref())
        .await?;
    let count = results.len();

    Ok(Json(json!({
        "results": results,
        "query": query,
        "count": count
    })))
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let organization_id = require_field(
        params.get("organization_id").map(String::as_str),
        "organization_id",
    )?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let stats = tenant.index.stats().await?;
    Ok(Json(stats))
}
