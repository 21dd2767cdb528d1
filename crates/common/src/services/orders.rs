//! Order pricing and the order status workflow

use super::accounts::notify;
use super::catalog::{distance_km, GeoPoint};
use super::promotions::apply_promotion;
use super::schema::{FieldRule, Schema};
use super::{now_iso, HookContext, ResourceHooks, ResourceService};
use crate::db::{record_id, Document};
use crate::errors::{AppError, Result};
use crate::query::{as_number, loose_eq, value_key, FilterClause, FilterOp};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// Delivery fee charged when the restaurant does not set one
pub const DEFAULT_DELIVERY_FEE: f64 = 15000.0;

/// Orders a customer may have open and unpaid at once
pub const MAX_UNPAID_ORDERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Delivering,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Delivering,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == text)
    }

    /// Statuses reachable in one step
    pub fn next(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
            OrderStatus::Confirmed => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::Delivering],
            OrderStatus::Delivering => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition(self, to: OrderStatus) -> bool {
        self.next().contains(&to)
    }

    /// Timestamp field stamped when an order enters this status
    fn stamp_field(self) -> Option<&'static str> {
        match self {
            OrderStatus::Pending => None,
            OrderStatus::Confirmed => Some("confirmedAt"),
            OrderStatus::Preparing => Some("preparingAt"),
            OrderStatus::Delivering => Some("deliveringAt"),
            OrderStatus::Delivered => Some("deliveredAt"),
            OrderStatus::Cancelled => Some("cancelledAt"),
        }
    }

    fn customer_message(self) -> Option<&'static str> {
        match self {
            OrderStatus::Pending => None,
            OrderStatus::Confirmed => Some("Your order has been confirmed by the restaurant"),
            OrderStatus::Preparing => Some("Your order is being prepared"),
            OrderStatus::Delivering => Some("Your order is on the way!"),
            OrderStatus::Delivered => Some("Your order has been delivered. Enjoy your meal!"),
            OrderStatus::Cancelled => Some("Your order has been cancelled"),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn order_schema() -> Schema {
    let statuses: Vec<&str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();
    Schema::new()
        .field("userId", FieldRule::number().required().references("users"))
        .field("restaurantId", FieldRule::number().required().references("restaurants"))
        .field("items", FieldRule::array().required())
        .field("deliveryAddress", FieldRule::string().required().length(10, 200))
        .field("deliveryLatitude", FieldRule::number().min(-90.0).max(90.0))
        .field("deliveryLongitude", FieldRule::number().min(-180.0).max(180.0))
        .field("paymentMethod", FieldRule::one_of(&["cash", "card", "momo", "zalopay"]).required())
        .field("status", FieldRule::one_of(&statuses).default_value("pending"))
        .field("note", FieldRule::string().length(0, 500).default_value(""))
        .field("promotionCode", FieldRule::string().length(0, 20))
        .field("shipperId", FieldRule::number().references("users"))
}

/// One requested line of an order
struct LineRequest {
    product_id: Value,
    quantity: f64,
}

fn line_requests(items: &[Value]) -> Result<Vec<LineRequest>> {
    if items.is_empty() {
        return Err(AppError::Validation {
            message: "Order must have at least one item".to_string(),
            field: Some("items".to_string()),
        });
    }

    items
        .iter()
        .map(|item| {
            let product_id = item.get("productId").filter(|v| value_key(v).is_some()).cloned();
            let quantity = item.get("quantity").and_then(as_number);
            match (product_id, quantity) {
                (Some(product_id), Some(quantity)) if quantity > 0.0 => Ok(LineRequest { product_id, quantity }),
                _ => Err(AppError::Validation {
                    message: "Each item needs a productId and a positive quantity".to_string(),
                    field: Some("items".to_string()),
                }),
            }
        })
        .collect()
}

/// Prices orders from the catalog and drives notifications
pub struct OrderHooks;

#[async_trait]
impl ResourceHooks for OrderHooks {
    async fn validate_create(&self, ctx: &HookContext, data: &Document) -> Result<()> {
        let restaurant_id = data.get("restaurantId").and_then(as_number).unwrap_or(0.0) as i64;
        let restaurant = ctx
            .repo()
            .find_by_id("restaurants", restaurant_id)
            .await?
            .ok_or_else(|| AppError::not_found("restaurant", restaurant_id))?;
        if restaurant.get("isOpen") == Some(&Value::Bool(false)) {
            return Err(AppError::validation("Restaurant is currently closed"));
        }

        let user = data.get("userId").cloned().unwrap_or(Value::Null);
        let unpaid = ctx
            .repo()
            .find_many(
                "orders",
                &[
                    FilterClause::eq("userId", user),
                    FilterClause::eq("paymentStatus", "pending"),
                    FilterClause::new("status", FilterOp::In, json!("pending,confirmed,preparing")),
                ],
            )
            .await?
            .len();
        if unpaid >= MAX_UNPAID_ORDERS {
            return Err(AppError::InUse {
                message: "Too many unpaid orders. Complete or cancel existing orders first.".to_string(),
                details: json!({ "unpaidOrders": unpaid }),
            });
        }
        Ok(())
    }

    async fn before_create(&self, ctx: &HookContext, mut data: Document) -> Result<Document> {
        let items = data.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
        let lines = line_requests(&items)?;
        let restaurant_id = data.get("restaurantId").cloned().unwrap_or(Value::Null);

        let ids: Vec<Value> = lines.iter().map(|line| line.product_id.clone()).collect();
        let products: HashMap<_, Document> = ctx
            .repo()
            .find_where_in("products", "id", &ids)
            .await?
            .into_iter()
            .filter_map(|p| p.get("id").and_then(value_key).map(|key| (key, p)))
            .collect();

        let mut problems = Vec::new();
        let mut priced = Vec::with_capacity(lines.len());
        let mut subtotal = 0.0;

        for line in &lines {
            let Some(product) = value_key(&line.product_id).and_then(|key| products.get(&key)) else {
                problems.push(json!({ "productId": line.product_id, "error": "Product not found" }));
                continue;
            };
            if product.get("available") == Some(&Value::Bool(false)) {
                problems.push(json!({ "productId": line.product_id, "error": "Product is not available" }));
                continue;
            }
            if !loose_eq(product.get("restaurantId").unwrap_or(&Value::Null), &restaurant_id) {
                problems.push(json!({ "productId": line.product_id, "error": "Product does not belong to this restaurant" }));
                continue;
            }

            let price = product.get("price").and_then(as_number).unwrap_or(0.0);
            let discount = product.get("discount").and_then(as_number).unwrap_or(0.0);
            let unit = price * (1.0 - discount / 100.0);
            subtotal += unit * line.quantity;

            priced.push(json!({
                "productId": product.get("id"),
                "productName": product.get("name"),
                "quantity": line.quantity,
                "price": price,
                "discount": discount,
                "finalPrice": unit.round(),
                "itemTotal": (unit * line.quantity).round(),
            }));
        }

        if !problems.is_empty() {
            return Err(AppError::InUse {
                message: "Invalid products in order".to_string(),
                details: Value::Array(problems),
            });
        }

        let restaurant = match restaurant_id.as_i64() {
            Some(id) => ctx.repo().find_by_id("restaurants", id).await?,
            None => None,
        }
        .unwrap_or_default();

        let delivery_fee = restaurant
            .get("deliveryFee")
            .and_then(as_number)
            .unwrap_or(DEFAULT_DELIVERY_FEE);

        let destination = match (
            data.get("deliveryLatitude").and_then(as_number),
            data.get("deliveryLongitude").and_then(as_number),
        ) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        let distance = match (GeoPoint::of(&restaurant), destination) {
            (Some(from), Some(to)) => distance_km(from, to),
            _ => 0.0,
        };
        let minutes = (15.0 + distance * 3.0).ceil() as i64;

        let mut discount = 0.0;
        let mut promotion_id = Value::Null;
        if let Some(code) = data.get("promotionCode").and_then(Value::as_str).filter(|c| !c.trim().is_empty()) {
            let quote = apply_promotion(ctx.repo(), code, subtotal, delivery_fee, data.get("userId"), Utc::now()).await?;
            discount = quote.discount;
            promotion_id = quote.promotion.get("id").cloned().unwrap_or(Value::Null);
            data.insert("promotionCode".to_string(), json!(quote.code));
        }

        let total = (subtotal + delivery_fee - discount).max(0.0).round();

        data.insert("items".to_string(), Value::Array(priced));
        data.insert("subtotal".to_string(), json!(subtotal.round()));
        data.insert("deliveryFee".to_string(), json!(delivery_fee));
        data.insert("discount".to_string(), json!(discount));
        data.insert("total".to_string(), json!(total));
        data.insert("promotionId".to_string(), promotion_id);
        data.insert("status".to_string(), json!(OrderStatus::Pending));
        data.insert("paymentStatus".to_string(), json!("pending"));
        data.insert("estimatedDistance".to_string(), json!((distance * 10.0).round() / 10.0));
        data.insert("estimatedDeliveryTime".to_string(), json!(format!("{}-{} min", minutes, minutes + 10)));
        data.insert("shipperId".to_string(), Value::Null);
        Ok(data)
    }

    async fn after_create(&self, ctx: &HookContext, order: &Document) -> Result<()> {
        if let Some(promotion_id) = order.get("promotionId").and_then(Value::as_i64) {
            ctx.repo().increment("promotions", promotion_id, "usageCount", 1.0).await?;
        }

        if let Some(user) = order.get("userId") {
            let total = order.get("total").and_then(as_number).unwrap_or(0.0);
            notify(
                ctx.repo(),
                user,
                "Order Created",
                format!("Order #{} has been placed successfully. Total: {total}", record_id(order).unwrap_or(0)),
                "order",
                order.get("id"),
            )
            .await?;
        }

        let restaurant = match order.get("restaurantId").and_then(Value::as_i64) {
            Some(id) => ctx.repo().find_by_id("restaurants", id).await?,
            None => None,
        };
        if let Some(manager) = restaurant.as_ref().and_then(|r| r.get("managerId")).filter(|m| !m.is_null()) {
            notify(
                ctx.repo(),
                manager,
                "New Order",
                format!("You have a new order #{}", record_id(order).unwrap_or(0)),
                "order",
                order.get("id"),
            )
            .await?;
        }
        Ok(())
    }

    async fn validate_update(&self, _ctx: &HookContext, _existing: &Document, patch: &Document) -> Result<()> {
        if patch.contains_key("status") {
            return Err(AppError::Validation {
                message: "Use the status endpoint to change an order's status".to_string(),
                field: Some("status".to_string()),
            });
        }
        Ok(())
    }
}

/// Move an order along the status workflow
///
/// Stamps `<status>At`, settles `paymentStatus` on delivery or
/// cancellation, records `shipperId` when delivery starts, and notifies
/// the customer.
pub async fn update_order_status(
    orders: &ResourceService,
    id: i64,
    to: OrderStatus,
    shipper_id: Option<i64>,
) -> Result<Document> {
    let order = orders.get(id).await?;
    let from = order
        .get("status")
        .and_then(Value::as_str)
        .and_then(OrderStatus::parse)
        .unwrap_or(OrderStatus::Pending);

    if !from.can_transition(to) {
        return Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            allowed: from.next().iter().map(|s| s.to_string()).collect(),
        });
    }

    let now = now_iso();
    let mut patch = Document::new();
    patch.insert("status".to_string(), json!(to));
    patch.insert("updatedAt".to_string(), json!(now));
    if let Some(field) = to.stamp_field() {
        patch.insert(field.to_string(), json!(now));
    }
    match to {
        OrderStatus::Delivered => {
            patch.insert("paymentStatus".to_string(), json!("completed"));
        }
        OrderStatus::Cancelled => {
            patch.insert("paymentStatus".to_string(), json!("cancelled"));
        }
        OrderStatus::Delivering => {
            if let Some(shipper) = shipper_id {
                patch.insert("shipperId".to_string(), json!(shipper));
                patch.insert("assignedAt".to_string(), json!(now));
            }
        }
        _ => {}
    }

    let updated = orders
        .repo()
        .update(orders.collection(), id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("order", id))?;

    if let (Some(user), Some(message)) = (updated.get("userId"), to.customer_message()) {
        notify(orders.repo(), user, "Order Status Update", message.to_string(), "order", updated.get("id")).await?;
    }

    tracing::info!(order_id = id, from = %from, to = %to, "Order status changed");
    Ok(updated)
}
