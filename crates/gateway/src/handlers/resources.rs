//! Generic CRUD handlers shared by every resource

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value;

use super::{display_name, into_document, query_options, ItemResponse, ListResponse, Resource};
use crate::AppState;
use funfood_common::{errors::Result, Document};

/// GET / - filtered, sorted, paginated list
pub async fn list(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    let service = state.services.get(name)?;
    let options = query_options(&state, pairs, &[]);
    Ok(Json(service.find_all(options).await?.into()))
}

/// GET /search?q= - full-text search over the configured fields
pub async fn search(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    let service = state.services.get(name)?;
    let q = pairs
        .iter()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value.clone())
        .unwrap_or_default();
    let options = query_options(&state, pairs, &["q"]);
    Ok(Json(service.search(&q, options).await?.into()))
}

/// GET /{id} - one record, with `_embed` / `_expand` honoured
pub async fn get_one(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Path(id): Path<i64>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ItemResponse<Document>>> {
    let service = state.services.get(name)?;
    let relations = query_options(&state, pairs, &[]).relations();
    let record = service.find_by_id(id, &relations).await?;
    Ok(Json(ItemResponse::new(record)))
}

/// POST / - create
pub async fn create(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ItemResponse<Document>>)> {
    let service = state.services.get(name)?;
    let created = service.create(into_document(body)?).await?;
    let message = format!("{} created successfully", display_name(service));
    Ok((StatusCode::CREATED, Json(ItemResponse::with_message(created, message))))
}

/// PUT or PATCH /{id} - partial update
pub async fn update(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<ItemResponse<Document>>> {
    let service = state.services.get(name)?;
    let updated = service.update(id, into_document(body)?).await?;
    let message = format!("{} updated successfully", display_name(service));
    Ok(Json(ItemResponse::with_message(updated, message)))
}

/// DELETE /{id}
pub async fn remove(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Path(id): Path<i64>,
) -> Result<Json<ItemResponse<Document>>> {
    let service = state.services.get(name)?;
    let removed = service.delete(id).await?;
    let message = format!("{} deleted successfully", display_name(service));
    Ok(Json(ItemResponse::with_message(removed, message)))
}
