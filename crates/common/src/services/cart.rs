//! Shopping cart
//!
//! One cart line per (user, product). Lines carry only ids and a
//! quantity; prices are read from the catalog whenever the cart is shown.

use super::schema::{FieldRule, Schema};
use super::{now_iso, ResourceService};
use crate::db::{record_id, Document, Repository};
use crate::errors::{AppError, Result};
use crate::query::{as_number, loose_eq, value_key, FilterClause, ValueKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

pub fn cart_schema() -> Schema {
    Schema::new()
        .field("userId", FieldRule::number().required().references("users"))
        .field("productId", FieldRule::number().required().references("products"))
        .field("quantity", FieldRule::number().required().min(1.0))
}

/// One priced cart line
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub product: Value,
    pub restaurant: Value,
    pub item_total: f64,
}

/// Cart lines of one restaurant
#[derive(Debug, Clone, Serialize)]
pub struct CartGroup {
    pub restaurant: Value,
    pub items: Vec<CartLine>,
    pub subtotal: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub total_items: i64,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub grouped_by_restaurant: Vec<CartGroup>,
    pub summary: CartSummary,
}

/// Outcome of a quantity change
#[derive(Debug, Clone, PartialEq)]
pub enum CartChange {
    Added(Document),
    Updated(Document),
    Removed,
}

impl CartChange {
    pub fn message(&self) -> &'static str {
        match self {
            CartChange::Added(_) => "Item added to cart",
            CartChange::Updated(_) => "Cart updated successfully",
            CartChange::Removed => "Item removed from cart",
        }
    }

    pub fn into_item(self) -> Option<Document> {
        match self {
            CartChange::Added(doc) | CartChange::Updated(doc) => Some(doc),
            CartChange::Removed => None,
        }
    }
}

/// A line sent by a client that kept its cart offline
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLine {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Value>,
}

fn number(doc: &Document, field: &str) -> f64 {
    doc.get(field).and_then(as_number).unwrap_or(0.0)
}

fn by_id(docs: Vec<Document>) -> HashMap<ValueKey, Document> {
    docs.into_iter()
        .filter_map(|doc| doc.get("id").and_then(value_key).map(|key| (key, doc)))
        .collect()
}

fn owned_by(doc: &Document, user_id: i64) -> bool {
    doc.get("userId").is_some_and(|owner| loose_eq(owner, &json!(user_id)))
}

async fn user_lines(cart: &ResourceService, user_id: i64) -> Result<Vec<Document>> {
    cart.repo()
        .find_many(cart.collection(), &[FilterClause::eq("userId", user_id)])
        .await
}

async fn owned_line(cart: &ResourceService, user_id: i64, item_id: i64) -> Result<Document> {
    let line = cart
        .repo()
        .find_by_id(cart.collection(), item_id)
        .await?
        .ok_or_else(|| AppError::not_found("cart item", item_id))?;
    if !owned_by(&line, user_id) {
        return Err(AppError::Forbidden {
            message: "Not authorized".to_string(),
        });
    }
    Ok(line)
}

async fn set_quantity(cart: &ResourceService, item_id: i64, quantity: i64) -> Result<Document> {
    let mut patch = Document::new();
    patch.insert("quantity".to_string(), json!(quantity));
    patch.insert("updatedAt".to_string(), json!(now_iso()));
    cart.repo()
        .update(cart.collection(), item_id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("cart item", item_id))
}

async fn available_product(repo: &dyn Repository, product_id: i64) -> Result<Document> {
    let product = repo
        .find_by_id("products", product_id)
        .await?
        .ok_or_else(|| AppError::not_found("product", product_id))?;
    if product.get("available") == Some(&Value::Bool(false)) {
        return Err(AppError::validation("Product is not available"));
    }
    Ok(product)
}

/// Price every line of a user's cart and group it by restaurant
///
/// Lines whose product no longer exists are left out.
pub async fn get_cart(cart: &ResourceService, user_id: i64) -> Result<CartView> {
    let lines = user_lines(cart, user_id).await?;
    let repo = cart.repo();

    let product_ids: Vec<Value> = lines.iter().filter_map(|l| l.get("productId").cloned()).collect();
    let products = by_id(repo.find_where_in("products", "id", &product_ids).await?);
    let restaurant_ids: Vec<Value> = products.values().filter_map(|p| p.get("restaurantId").cloned()).collect();
    let restaurants = by_id(repo.find_where_in("restaurants", "id", &restaurant_ids).await?);

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        let Some(product) = line.get("productId").and_then(value_key).and_then(|k| products.get(&k)) else {
            continue;
        };
        let restaurant = product
            .get("restaurantId")
            .and_then(value_key)
            .and_then(|k| restaurants.get(&k));

        let quantity = number(line, "quantity") as i64;
        let final_price = number(product, "price") * (1.0 - number(product, "discount") / 100.0);

        items.push(CartLine {
            id: record_id(line).unwrap_or(0),
            product_id: record_id(product).unwrap_or(0),
            quantity,
            product: json!({
                "id": product.get("id"),
                "name": product.get("name"),
                "description": product.get("description"),
                "price": product.get("price"),
                "discount": product.get("discount"),
                "finalPrice": final_price.round(),
                "image": product.get("image"),
                "available": product.get("available"),
            }),
            restaurant: restaurant.map_or(Value::Null, |r| {
                json!({ "id": r.get("id"), "name": r.get("name"), "deliveryFee": r.get("deliveryFee") })
            }),
            item_total: (final_price * quantity as f64).round(),
        });
    }

    let mut groups: BTreeMap<i64, CartGroup> = BTreeMap::new();
    for item in &items {
        let restaurant_id = item.restaurant.get("id").and_then(Value::as_i64).unwrap_or(0);
        let group = groups.entry(restaurant_id).or_insert_with(|| CartGroup {
            restaurant: item.restaurant.clone(),
            items: Vec::new(),
            subtotal: 0.0,
        });
        group.items.push(item.clone());
        group.subtotal += item.item_total;
    }

    let subtotal: f64 = items.iter().map(|i| i.item_total).sum();
    let delivery_fee: f64 = groups
        .values()
        .filter_map(|g| g.restaurant.get("deliveryFee").and_then(as_number))
        .sum();
    let summary = CartSummary {
        total_items: items.iter().map(|i| i.quantity).sum(),
        subtotal: subtotal.round(),
        delivery_fee,
        total: (subtotal + delivery_fee).round(),
    };

    Ok(CartView {
        items,
        grouped_by_restaurant: groups.into_values().collect(),
        summary,
    })
}

/// Add a product, merging with an existing line
///
/// A merged quantity of zero or less drops the line.
pub async fn add_to_cart(cart: &ResourceService, user_id: i64, product_id: i64, quantity: i64) -> Result<CartChange> {
    available_product(cart.repo(), product_id).await?;

    let existing = cart
        .repo()
        .find_one(
            cart.collection(),
            &[FilterClause::eq("userId", user_id), FilterClause::eq("productId", product_id)],
        )
        .await?;

    let Some(existing) = existing else {
        let mut line = Document::new();
        line.insert("userId".to_string(), json!(user_id));
        line.insert("productId".to_string(), json!(product_id));
        line.insert("quantity".to_string(), json!(quantity));
        return Ok(CartChange::Added(cart.create(line).await?));
    };

    let id = record_id(&existing).unwrap_or(0);
    let merged = number(&existing, "quantity") as i64 + quantity;
    if merged <= 0 {
        cart.repo().delete(cart.collection(), id).await?;
        return Ok(CartChange::Removed);
    }
    Ok(CartChange::Updated(set_quantity(cart, id, merged).await?))
}

/// Set a line's quantity; zero removes it
pub async fn update_cart_item(cart: &ResourceService, user_id: i64, item_id: i64, quantity: i64) -> Result<CartChange> {
    owned_line(cart, user_id, item_id).await?;

    if quantity < 0 {
        return Err(AppError::Validation {
            message: "Quantity must not be negative".to_string(),
            field: Some("quantity".to_string()),
        });
    }
    if quantity == 0 {
        cart.repo().delete(cart.collection(), item_id).await?;
        return Ok(CartChange::Removed);
    }
    Ok(CartChange::Updated(set_quantity(cart, item_id, quantity).await?))
}

pub async fn remove_from_cart(cart: &ResourceService, user_id: i64, item_id: i64) -> Result<()> {
    owned_line(cart, user_id, item_id).await?;
    cart.repo().delete(cart.collection(), item_id).await?;
    Ok(())
}

/// Empty a user's cart, returning how many lines went
pub async fn clear_cart(cart: &ResourceService, user_id: i64) -> Result<usize> {
    let lines = user_lines(cart, user_id).await?;
    for line in &lines {
        if let Some(id) = record_id(line) {
            cart.repo().delete(cart.collection(), id).await?;
        }
    }
    tracing::debug!(user_id, cleared = lines.len(), "Cart cleared");
    Ok(lines.len())
}

/// Drop the lines whose product belongs to one restaurant
pub async fn clear_restaurant_cart(cart: &ResourceService, user_id: i64, restaurant_id: i64) -> Result<usize> {
    let lines = user_lines(cart, user_id).await?;
    let product_ids: Vec<Value> = lines.iter().filter_map(|l| l.get("productId").cloned()).collect();
    let products = by_id(cart.repo().find_where_in("products", "id", &product_ids).await?);

    let mut cleared = 0;
    for line in &lines {
        let from_restaurant = line
            .get("productId")
            .and_then(value_key)
            .and_then(|k| products.get(&k))
            .and_then(|p| p.get("restaurantId"))
            .is_some_and(|r| loose_eq(r, &json!(restaurant_id)));
        if let (true, Some(id)) = (from_restaurant, record_id(line)) {
            cart.repo().delete(cart.collection(), id).await?;
            cleared += 1;
        }
    }
    Ok(cleared)
}

/// Merge lines kept by a client; existing lines keep the larger quantity
pub async fn sync_cart(cart: &ResourceService, user_id: i64, lines: &[SyncLine]) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for line in lines {
        if line.quantity < 1 {
            report.details.push(json!({ "productId": line.product_id, "error": "Quantity must be at least 1" }));
            continue;
        }
        if available_product(cart.repo(), line.product_id).await.is_err() {
            report.details.push(json!({ "productId": line.product_id, "error": "Product not available" }));
            continue;
        }

        let existing = cart
            .repo()
            .find_one(
                cart.collection(),
                &[FilterClause::eq("userId", user_id), FilterClause::eq("productId", line.product_id)],
            )
            .await?;
        match existing {
            Some(existing) => {
                let id = record_id(&existing).unwrap_or(0);
                let quantity = (number(&existing, "quantity") as i64).max(line.quantity);
                set_quantity(cart, id, quantity).await?;
            }
            None => {
                let mut doc = Document::new();
                doc.insert("userId".to_string(), json!(user_id));
                doc.insert("productId".to_string(), json!(line.product_id));
                doc.insert("quantity".to_string(), json!(line.quantity));
                cart.create(doc).await?;
            }
        }
        report.synced += 1;
    }

    report.errors = report.details.len();
    tracing::info!(user_id, synced = report.synced, errors = report.errors, "Cart synced");
    Ok(report)
}
