//! Resource-specific endpoints: nearby search, menus, pricing and workflow

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use super::{query_options, validate_request, ItemResponse, ListResponse};
use crate::AppState;
use funfood_common::{
    errors::{AppError, Result},
    services::{
        apply_promotion, bulk_update_availability, discounted_products, nearby_restaurants,
        products_in_price_range, restaurant_menu, update_order_status, GeoPoint, OrderStatus,
        PromotionQuote,
    },
    Document,
};

#[derive(Debug, Deserialize, Validate)]
pub struct NearbyParams {
    #[validate(range(min = -90.0, max = 90.0, message = "lat must be between -90 and 90"))]
    pub lat: f64,

    #[validate(range(min = -180.0, max = 180.0, message = "lng must be between -180 and 180"))]
    pub lng: f64,

    #[validate(range(exclusive_min = 0.0, message = "radius must be positive"))]
    pub radius: Option<f64>,
}

/// GET /restaurants/nearby?lat&lng&radius
pub async fn nearby(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    validate_request(&params)?;
    let restaurants = state.services.get("restaurants")?;
    let options = query_options(&state, pairs, &["lat", "lng", "radius"]);

    let result = nearby_restaurants(
        restaurants,
        GeoPoint::new(params.lat, params.lng),
        params.radius,
        options,
    )
    .await?;
    Ok(Json(result.into()))
}

/// GET /restaurants/{id}/products
pub async fn menu(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    let options = query_options(&state, pairs, &[]);
    let result = restaurant_menu(
        state.services.get("restaurants")?,
        state.services.get("products")?,
        id,
        options,
    )
    .await?;
    Ok(Json(result.into()))
}

/// GET /products/discounted
pub async fn discounted(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    let options = query_options(&state, pairs, &[]);
    let result = discounted_products(state.services.get("products")?, options).await?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PriceRangeParams {
    #[validate(range(min = 0.0, message = "min must not be negative"))]
    pub min: f64,

    #[validate(range(min = 0.0, message = "max must not be negative"))]
    pub max: f64,
}

/// GET /products/price-range?min&max
pub async fn price_range(
    State(state): State<AppState>,
    Query(params): Query<PriceRangeParams>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse>> {
    validate_request(&params)?;
    let options = query_options(&state, pairs, &["min", "max"]);
    let result =
        products_in_price_range(state.services.get("products")?, params.min, params.max, options).await?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkAvailabilityRequest {
    #[validate(length(min = 1, message = "ids must not be empty"))]
    pub ids: Vec<i64>,
    pub available: bool,
}

/// PATCH /products/bulk-availability
pub async fn bulk_availability(
    State(state): State<AppState>,
    Json(request): Json<BulkAvailabilityRequest>,
) -> Result<Json<ItemResponse<Vec<Document>>>> {
    validate_request(&request)?;
    let updated =
        bulk_update_availability(state.services.get("products")?, &request.ids, request.available).await?;
    let message = format!("{} products updated", updated.len());
    Ok(Json(ItemResponse::with_message(updated, message)))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromotionRequest {
    #[validate(length(min = 1, max = 20, message = "code is required"))]
    pub code: String,

    #[validate(range(min = 0.0, message = "orderValue must not be negative"))]
    pub order_value: f64,

    #[validate(range(min = 0.0, message = "deliveryFee must not be negative"))]
    #[serde(default)]
    pub delivery_fee: Option<f64>,

    #[serde(default)]
    pub user_id: Option<i64>,
}

/// POST /promotions/validate
pub async fn validate_promotion(
    State(state): State<AppState>,
    Json(request): Json<ValidatePromotionRequest>,
) -> Result<Json<ItemResponse<PromotionQuote>>> {
    validate_request(&request)?;
    let promotions = state.services.get("promotions")?;
    let user = request.user_id.map(Value::from);

    let quote = apply_promotion(
        promotions.repo(),
        &request.code,
        request.order_value,
        request.delivery_fee.unwrap_or(0.0),
        user.as_ref(),
        Utc::now(),
    )
    .await?;
    Ok(Json(ItemResponse::with_message(quote, "Promotion code is valid")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: String,
    #[serde(default)]
    pub shipper_id: Option<i64>,
}

/// PATCH /orders/{id}/status
pub async fn order_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<ItemResponse<Document>>> {
    let status = OrderStatus::parse(&request.status).ok_or_else(|| AppError::Validation {
        message: format!(
            "status must be one of: {}",
            OrderStatus::ALL.map(OrderStatus::as_str).join(", ")
        ),
        field: Some("status".to_string()),
    })?;

    let orders = state.services.get("orders")?;
    let updated = update_order_status(orders, id, status, request.shipper_id).await?;
    let message = format!("Order status updated to {status}");
    Ok(Json(ItemResponse::with_message(updated, message)))
}
