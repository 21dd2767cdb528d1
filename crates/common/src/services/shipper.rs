//! Shipper workflow
//!
//! A shipper picks up an unassigned order once the restaurant is
//! preparing it, then drives it through `delivering` to `delivered`.
//! Each shipper keeps a `currentOrders` list and an `isAvailable` flag.

use super::accounts::notify;
use super::orders::{update_order_status, OrderStatus};
use super::{now_iso, ResourceService};
use crate::db::{Document, Repository};
use crate::errors::{AppError, Result};
use crate::query::{
    as_number, loose_eq, parse_timestamp, value_key, FilterClause, FilterOp, QueryOptions, QueryResult, SortKey,
    ValueKey,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Share of the delivery fee paid to the shipper
pub const SHIPPER_FEE_SHARE: f64 = 0.8;

fn index(docs: Vec<Document>) -> HashMap<ValueKey, Document> {
    docs.into_iter()
        .filter_map(|doc| doc.get("id").and_then(value_key).map(|key| (key, doc)))
        .collect()
}

fn status_of(order: &Document) -> Option<OrderStatus> {
    order.get("status").and_then(Value::as_str).and_then(OrderStatus::parse)
}

fn timestamp(order: &Document, field: &str) -> Option<DateTime<Utc>> {
    order
        .get(field)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .and_then(DateTime::from_timestamp_millis)
}

/// Orders waiting for a shipper, with pickup and customer details
pub async fn available_orders(orders: &ResourceService, options: QueryOptions) -> Result<QueryResult> {
    let options = options
        .clause(FilterClause::eq("status", OrderStatus::Preparing.as_str()))
        .clause(FilterClause::eq("shipperId", Value::Null));
    let mut result = orders.find_all(options).await?;

    let repo = orders.repo();
    let restaurant_ids: Vec<Value> = result.data.iter().filter_map(|o| o.get("restaurantId").cloned()).collect();
    let customer_ids: Vec<Value> = result.data.iter().filter_map(|o| o.get("userId").cloned()).collect();
    let restaurants = index(repo.find_where_in("restaurants", "id", &restaurant_ids).await?);
    let customers = index(repo.find_where_in("users", "id", &customer_ids).await?);

    for order in &mut result.data {
        let restaurant = order.get("restaurantId").and_then(value_key).and_then(|k| restaurants.get(&k));
        let customer = order.get("userId").and_then(value_key).and_then(|k| customers.get(&k));
        let restaurant = restaurant.map_or(Value::Null, |r| {
            json!({
                "id": r.get("id"),
                "name": r.get("name"),
                "address": r.get("address"),
                "latitude": r.get("latitude"),
                "longitude": r.get("longitude"),
                "phone": r.get("phone"),
            })
        });
        let customer = customer.map_or(Value::Null, |c| json!({ "name": c.get("name"), "phone": c.get("phone") }));
        order.insert("restaurant".to_string(), restaurant);
        order.insert("customer".to_string(), customer);
    }
    Ok(result)
}

async fn shipper_account(repo: &dyn Repository, shipper_id: i64) -> Result<Document> {
    let shipper = repo
        .find_by_id("users", shipper_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", shipper_id))?;
    if shipper.get("role").and_then(Value::as_str) != Some("shipper") {
        return Err(AppError::Forbidden {
            message: "Only shippers can take deliveries".to_string(),
        });
    }
    Ok(shipper)
}

fn current_orders(shipper: &Document) -> Vec<i64> {
    shipper
        .get("currentOrders")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

async fn set_current_orders(repo: &dyn Repository, shipper_id: i64, current: Vec<i64>) -> Result<()> {
    let mut patch = Document::new();
    patch.insert("isAvailable".to_string(), json!(current.is_empty()));
    patch.insert("currentOrders".to_string(), json!(current));
    repo.update("users", shipper_id, patch).await?;
    Ok(())
}

/// Assign an order that is being prepared to a shipper
pub async fn accept_order(orders: &ResourceService, order_id: i64, shipper_id: i64) -> Result<Document> {
    let order = orders.get(order_id).await?;
    if status_of(&order) != Some(OrderStatus::Preparing) {
        return Err(AppError::validation("Order is not ready for pickup"));
    }
    if order.get("shipperId").is_some_and(|s| !s.is_null()) {
        return Err(AppError::validation("Order already assigned to another shipper"));
    }

    let repo = orders.repo();
    let shipper = shipper_account(repo, shipper_id).await?;

    let now = now_iso();
    let mut patch = Document::new();
    patch.insert("shipperId".to_string(), json!(shipper_id));
    patch.insert("assignedAt".to_string(), json!(now));
    patch.insert("updatedAt".to_string(), json!(now));
    let updated = repo
        .update(orders.collection(), order_id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("order", order_id))?;

    let mut current = current_orders(&shipper);
    current.push(order_id);
    set_current_orders(repo, shipper_id, current).await?;

    if let Some(customer) = order.get("userId") {
        notify(
            repo,
            customer,
            "Shipper Assigned",
            format!("Your order #{order_id} has been picked up by shipper"),
            "order",
            updated.get("id"),
        )
        .await?;
    }

    tracing::info!(order_id, shipper_id, "Order accepted by shipper");
    Ok(updated)
}

fn shipper_filter(options: QueryOptions, shipper_id: i64) -> QueryOptions {
    options.clause(FilterClause::eq("shipperId", shipper_id))
}

/// Orders a shipper has taken and not yet delivered
pub async fn my_deliveries(orders: &ResourceService, shipper_id: i64, options: QueryOptions) -> Result<QueryResult> {
    let options = shipper_filter(options, shipper_id).clause(FilterClause::new(
        "status",
        FilterOp::In,
        json!([OrderStatus::Preparing.as_str(), OrderStatus::Delivering.as_str()]),
    ));
    orders.find_all(options).await
}

/// Delivered orders, newest delivery first unless the caller sorts
pub async fn delivery_history(orders: &ResourceService, shipper_id: i64, mut options: QueryOptions) -> Result<QueryResult> {
    if options.sort.is_empty() {
        options = options.sort_by(SortKey::desc("deliveredAt"));
    }
    let options = shipper_filter(options, shipper_id).clause(FilterClause::eq("status", OrderStatus::Delivered.as_str()));
    orders.find_all(options).await
}

/// Status change made by the assigned shipper
///
/// Only `preparing -> delivering` and `delivering -> delivered` are open
/// to shippers. Delivery frees the order from the shipper's current list.
pub async fn shipper_update_status(
    orders: &ResourceService,
    order_id: i64,
    shipper_id: i64,
    to: OrderStatus,
) -> Result<Document> {
    let order = orders.get(order_id).await?;
    let assigned = order.get("shipperId").is_some_and(|s| loose_eq(s, &json!(shipper_id)));
    if !assigned {
        return Err(AppError::Forbidden {
            message: "This order is not assigned to you".to_string(),
        });
    }

    let from = status_of(&order).unwrap_or(OrderStatus::Pending);
    let allowed = match from {
        OrderStatus::Preparing => Some(OrderStatus::Delivering),
        OrderStatus::Delivering => Some(OrderStatus::Delivered),
        _ => None,
    };
    if allowed != Some(to) {
        return Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        });
    }

    let updated = update_order_status(orders, order_id, to, None).await?;

    if to == OrderStatus::Delivered {
        let repo = orders.repo();
        if let Some(shipper) = repo.find_by_id("users", shipper_id).await? {
            let current = current_orders(&shipper).into_iter().filter(|id| *id != order_id).collect();
            set_current_orders(repo, shipper_id, current).await?;
        }
    }
    Ok(updated)
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShipperStats {
    pub total: usize,
    pub delivering: usize,
    pub delivered: usize,
    pub total_earnings: f64,
    /// Whole minutes from pickup to delivery
    pub avg_delivery_time: i64,
    pub today_deliveries: usize,
}

/// Counts, earnings and delivery times of one shipper
pub async fn shipper_stats(orders: &ResourceService, shipper_id: i64, now: DateTime<Utc>) -> Result<ShipperStats> {
    let all = orders
        .repo()
        .find_many(orders.collection(), &[FilterClause::eq("shipperId", shipper_id)])
        .await?;
    let delivered: Vec<&Document> = all.iter().filter(|o| status_of(o) == Some(OrderStatus::Delivered)).collect();

    let durations: Vec<i64> = all
        .iter()
        .filter_map(|o| Some((timestamp(o, "deliveredAt")? - timestamp(o, "deliveringAt")?).num_milliseconds()))
        .collect();
    let avg_delivery_time = if durations.is_empty() {
        0
    } else {
        (durations.iter().sum::<i64>() as f64 / durations.len() as f64 / 60_000.0).round() as i64
    };

    let today = now.date_naive();
    Ok(ShipperStats {
        total: all.len(),
        delivering: all.iter().filter(|o| status_of(o) == Some(OrderStatus::Delivering)).count(),
        delivered: delivered.len(),
        total_earnings: delivered
            .iter()
            .map(|o| o.get("deliveryFee").and_then(as_number).unwrap_or(0.0) * SHIPPER_FEE_SHARE)
            .sum(),
        avg_delivery_time,
        today_deliveries: delivered
            .iter()
            .filter(|o| timestamp(o, "deliveredAt").is_some_and(|at| at.date_naive() == today))
            .count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::record_id;
    use crate::services::test_support::registry;
    use crate::services::ServiceRegistry;

    fn ids(result: &QueryResult) -> Vec<i64> {
        result.data.iter().filter_map(record_id).collect()
    }

    async fn preparing_order(registry: &ServiceRegistry) -> i64 {
        let orders = registry.get("orders").unwrap();
        update_order_status(orders, 1, OrderStatus::Confirmed, None).await.unwrap();
        update_order_status(orders, 1, OrderStatus::Preparing, None).await.unwrap();
        1
    }

    #[tokio::test]
    async fn test_available_orders_are_unassigned_and_preparing() {
        let registry = registry();
        let orders = registry.get("orders").unwrap();
        assert!(available_orders(orders, QueryOptions::new()).await.unwrap().data.is_empty());

        preparing_order(&registry).await;
        let available = available_orders(orders, QueryOptions::new()).await.unwrap();
        assert_eq!(ids(&available), vec![1]);
        assert_eq!(available.data[0]["restaurant"]["name"], "Pho 24");
        assert_eq!(available.data[0]["customer"]["name"], "An");
        assert!(available.data[0]["customer"].get("password").is_none());
    }

    #[tokio::test]
    async fn test_accept_assigns_and_marks_shipper_busy() {
        let registry = registry();
        let orders = registry.get("orders").unwrap();

        let err = accept_order(orders, 1, 2).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { ref message, .. } if message == "Order is not ready for pickup"));

        let order_id = preparing_order(&registry).await;
        assert!(matches!(accept_order(orders, order_id, 1).await, Err(AppError::Forbidden { .. })));

        let accepted = accept_order(orders, order_id, 2).await.unwrap();
        assert_eq!(accepted["shipperId"], 2);
        assert_eq!(accepted["status"], "preparing");

        let shipper = registry.get("users").unwrap().get(2).await.unwrap();
        assert_eq!(shipper["currentOrders"], json!([1]));
        assert_eq!(shipper["isAvailable"], false);

        let err = accept_order(orders, order_id, 2).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { ref message, .. } if message.contains("already assigned")));
        assert!(available_orders(orders, QueryOptions::new()).await.unwrap().data.is_empty());
        assert_eq!(ids(&my_deliveries(orders, 2, QueryOptions::new()).await.unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn test_shipper_drives_delivery_to_completion() {
        let registry = registry();
        let orders = registry.get("orders").unwrap();
        let order_id = preparing_order(&registry).await;
        accept_order(orders, order_id, 2).await.unwrap();

        let err = shipper_update_status(orders, order_id, 3, OrderStatus::Delivering).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        let err = shipper_update_status(orders, order_id, 2, OrderStatus::Delivered).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { ref allowed, .. } if allowed == &vec!["delivering".to_string()]));

        let delivering = shipper_update_status(orders, order_id, 2, OrderStatus::Delivering).await.unwrap();
        assert!(delivering["deliveringAt"].is_string());
        let delivered = shipper_update_status(orders, order_id, 2, OrderStatus::Delivered).await.unwrap();
        assert_eq!(delivered["paymentStatus"], "completed");

        let shipper = registry.get("users").unwrap().get(2).await.unwrap();
        assert_eq!(shipper["currentOrders"], json!([]));
        assert_eq!(shipper["isAvailable"], true);

        assert!(my_deliveries(orders, 2, QueryOptions::new()).await.unwrap().data.is_empty());
        assert_eq!(ids(&delivery_history(orders, 2, QueryOptions::new()).await.unwrap()), vec![1]);

        let stats = shipper_stats(orders, 2, Utc::now()).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.today_deliveries, 1);
    }

    #[tokio::test]
    async fn test_stats_from_history() {
        let registry = registry();
        let orders = registry.get("orders").unwrap();
        for (status, fee, picked, done) in [
            ("delivered", 15000, "2024-03-02T10:00:00.000Z", "2024-03-02T10:30:00.000Z"),
            ("delivered", 10000, "2024-03-03T09:00:00.000Z", "2024-03-03T09:20:00.000Z"),
        ] {
            let mut order = Document::new();
            order.insert("shipperId".to_string(), json!(2));
            order.insert("status".to_string(), json!(status));
            order.insert("deliveryFee".to_string(), json!(fee));
            order.insert("deliveringAt".to_string(), json!(picked));
            order.insert("deliveredAt".to_string(), json!(done));
            orders.repo().insert("orders", order).await.unwrap();
        }
        let mut in_flight = Document::new();
        in_flight.insert("shipperId".to_string(), json!(2));
        in_flight.insert("status".to_string(), json!("delivering"));
        in_flight.insert("deliveryFee".to_string(), json!(20000));
        orders.repo().insert("orders", in_flight).await.unwrap();

        let now: DateTime<Utc> = "2024-03-03T18:00:00Z".parse().unwrap();
        let stats = shipper_stats(orders, 2, now).await.unwrap();
        assert_eq!(
            stats,
            ShipperStats {
                total: 3,
                delivering: 1,
                delivered: 2,
                total_earnings: 20000.0,
                avg_delivery_time: 25,
                today_deliveries: 1,
            }
        );
    }
}
