//! Per-user cart endpoints under /users/{id}/cart

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use super::{validate_request, ItemResponse};
use crate::AppState;
use funfood_common::{
    errors::Result,
    services::{
        add_to_cart, clear_cart, clear_restaurant_cart, get_cart, remove_from_cart, sync_cart, update_cart_item,
        CartChange, CartView, SyncLine, SyncReport,
    },
    Document,
};

/// GET /users/{id}/cart
pub async fn show(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<CartView>>> {
    let view = get_cart(state.services.get("cart")?, user_id).await?;
    Ok(Json(ItemResponse::new(view)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub product_id: i64,

    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

fn change_response(change: CartChange) -> Json<ItemResponse<Option<Document>>> {
    let message = change.message();
    Json(ItemResponse::with_message(change.into_item(), message))
}

/// POST /users/{id}/cart
pub async fn add(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<AddRequest>,
) -> Result<Json<ItemResponse<Option<Document>>>> {
    let change = add_to_cart(state.services.get("cart")?, user_id, request.product_id, request.quantity).await?;
    Ok(change_response(change))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuantityRequest {
    #[validate(range(min = 0, message = "Quantity must not be negative"))]
    pub quantity: i64,
}

/// PUT /users/{id}/cart/{item_id}
pub async fn update_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(i64, i64)>,
    Json(request): Json<QuantityRequest>,
) -> Result<Json<ItemResponse<Option<Document>>>> {
    validate_request(&request)?;
    let change = update_cart_item(state.services.get("cart")?, user_id, item_id, request.quantity).await?;
    Ok(change_response(change))
}

/// DELETE /users/{id}/cart/{item_id}
pub async fn remove_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(i64, i64)>,
) -> Result<Json<ItemResponse<Value>>> {
    remove_from_cart(state.services.get("cart")?, user_id, item_id).await?;
    Ok(Json(ItemResponse::with_message(Value::Null, "Item removed from cart")))
}

/// DELETE /users/{id}/cart
pub async fn clear(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<Value>>> {
    let cleared = clear_cart(state.services.get("cart")?, user_id).await?;
    let message = if cleared == 0 { "Cart is already empty" } else { "Cart cleared successfully" };
    Ok(Json(ItemResponse::with_message(json!({ "cleared": cleared }), message)))
}

/// DELETE /users/{id}/cart/restaurant/{restaurant_id}
pub async fn clear_restaurant(
    State(state): State<AppState>,
    Path((user_id, restaurant_id)): Path<(i64, i64)>,
) -> Result<Json<ItemResponse<Value>>> {
    let cleared = clear_restaurant_cart(state.services.get("cart")?, user_id, restaurant_id).await?;
    let message = if cleared == 0 {
        "No items from this restaurant in cart"
    } else {
        "Restaurant items removed from cart"
    };
    Ok(Json(ItemResponse::with_message(json!({ "cleared": cleared }), message)))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub items: Vec<SyncLine>,
}

/// POST /users/{id}/cart/sync
pub async fn sync(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<ItemResponse<SyncReport>>> {
    let report = sync_cart(state.services.get("cart")?, user_id, &request.items).await?;
    Ok(Json(ItemResponse::with_message(report, "Cart synced successfully")))
}
