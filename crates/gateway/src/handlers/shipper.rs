//! Shipper endpoints under /shippers/{id}

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;

use super::{catalog::StatusRequest, query_options, ItemResponse, ListResponse};
use crate::AppState;
use funfood_common::{
    errors::{AppError, Result},
    services::{
        accept_order, available_orders, delivery_history, my_deliveries, shipper_stats, shipper_update_status,
        OrderStatus, ShipperStats,
    },
    Document,
};

/// GET /shippers/{id}/orders/available
pub async fn available(
    State(state): State<AppState>,
    Path(_shipper_id): Path<i64>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    let options = query_options(&state, pairs, &[]);
    let result = available_orders(state.services.get("orders")?, options).await?;
    Ok(Json(result.into()))
}

/// POST /shippers/{id}/orders/{order_id}/accept
pub async fn accept(
    State(state): State<AppState>,
    Path((shipper_id, order_id)): Path<(i64, i64)>,
) -> Result<Json<ItemResponse<Document>>> {
    let order = accept_order(state.services.get("orders")?, order_id, shipper_id).await?;
    Ok(Json(ItemResponse::with_message(order, "Order accepted successfully")))
}

/// GET /shippers/{id}/orders/my-deliveries
pub async fn deliveries(
    State(state): State<AppState>,
    Path(shipper_id): Path<i64>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    let options = query_options(&state, pairs, &[]);
    let result = my_deliveries(state.services.get("orders")?, shipper_id, options).await?;
    Ok(Json(result.into()))
}

/// GET /shippers/{id}/orders/history
pub async fn history(
    State(state): State<AppState>,
    Path(shipper_id): Path<i64>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    let options = query_options(&state, pairs, &[]);
    let result = delivery_history(state.services.get("orders")?, shipper_id, options).await?;
    Ok(Json(result.into()))
}

/// PATCH /shippers/{id}/orders/{order_id}/status
pub async fn status(
    State(state): State<AppState>,
    Path((shipper_id, order_id)): Path<(i64, i64)>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<ItemResponse<Document>>> {
    let to = OrderStatus::parse(&request.status).ok_or_else(|| AppError::Validation {
        message: "status must be delivering or delivered".to_string(),
        field: Some("status".to_string()),
    })?;
    let order = shipper_update_status(state.services.get("orders")?, order_id, shipper_id, to).await?;
    Ok(Json(ItemResponse::with_message(order, "Order status updated successfully")))
}

/// GET /shippers/{id}/stats
pub async fn stats(State(state): State<AppState>, Path(shipper_id): Path<i64>) -> Result<Json<ItemResponse<ShipperStats>>> {
    let stats = shipper_stats(state.services.get("orders")?, shipper_id, Utc::now()).await?;
    Ok(Json(ItemResponse::new(stats)))
}
