//! Address book under /users/{id}/addresses

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use super::ItemResponse;
use crate::AppState;
use funfood_common::{
    errors::Result,
    services::{clear_non_default, default_address, delete_address, set_default_address, user_addresses},
    Document,
};

/// GET /users/{id}/addresses
pub async fn list(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<Vec<Document>>>> {
    let addresses = user_addresses(state.services.get("addresses")?, user_id).await?;
    Ok(Json(ItemResponse::new(addresses)))
}

/// GET /users/{id}/addresses/default
pub async fn default(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<Document>>> {
    let address = default_address(state.services.get("addresses")?, user_id).await?;
    Ok(Json(ItemResponse::new(address)))
}

/// PATCH /users/{id}/addresses/{address_id}/default
pub async fn set_default(
    State(state): State<AppState>,
    Path((user_id, address_id)): Path<(i64, i64)>,
) -> Result<Json<ItemResponse<Document>>> {
    let address = set_default_address(state.services.get("addresses")?, user_id, address_id).await?;
    Ok(Json(ItemResponse::with_message(address, "Default address updated")))
}

/// DELETE /users/{id}/addresses/{address_id}
pub async fn remove(
    State(state): State<AppState>,
    Path((user_id, address_id)): Path<(i64, i64)>,
) -> Result<Json<ItemResponse<Document>>> {
    let removed = delete_address(state.services.get("addresses")?, user_id, address_id).await?;
    Ok(Json(ItemResponse::with_message(removed, "Address deleted successfully")))
}

/// DELETE /users/{id}/addresses
pub async fn clear_others(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<Value>>> {
    let cleared = clear_non_default(state.services.get("addresses")?, user_id).await?;
    let message = if cleared == 0 {
        "No non-default addresses to clear"
    } else {
        "Non-default addresses cleared"
    };
    Ok(Json(ItemResponse::with_message(json!({ "cleared": cleared }), message)))
}
