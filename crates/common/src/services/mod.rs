//! Resource services
//!
//! Every collection is served by a [`ResourceService`]: schema checks,
//! reference and uniqueness checks, then optional per-resource hooks
//! around each write. Read operations delegate to the query engine.

mod accounts;
mod addresses;
mod cart;
mod catalog;
mod favorites;
mod orders;
mod promotions;
mod reviews;
mod schema;
mod shipper;
mod transfer;

pub use accounts::{change_password, login, notification_schema, register, user_schema, UserHooks};
pub use addresses::{
    address_schema, clear_non_default, default_address, delete_address, set_default_address, user_addresses,
    AddressHooks,
};
pub use cart::{
    add_to_cart, cart_schema, clear_cart, clear_restaurant_cart, get_cart, remove_from_cart, sync_cart,
    update_cart_item, CartChange, CartGroup, CartLine, CartSummary, CartView, SyncLine, SyncReport,
};
pub use favorites::{
    add_favorite, check_favorite, clear_favorites, favorite_ids, favorite_schema, favorite_stats, favorites_by_type,
    list_favorites, remove_favorite, toggle_favorite, trending_favorites, FavoriteHooks, FavoriteKind,
    FavoriteStats, TrendingItem,
};
pub use catalog::{
    bulk_update_availability, category_schema, discounted_products, distance_km, nearby_restaurants,
    product_schema, products_in_price_range, refresh_rating, restaurant_menu,
    restaurant_schema, CategoryHooks, GeoPoint, RestaurantHooks, DEFAULT_RADIUS_KM,
};
pub use orders::{order_schema, update_order_status, OrderHooks, OrderStatus};
pub use promotions::{apply_promotion, compute_discount, promotion_schema, PromotionHooks, PromotionQuote};
pub use reviews::{review_schema, ReviewHooks};
pub use shipper::{
    accept_order, available_orders, delivery_history, my_deliveries, shipper_stats, shipper_update_status,
    ShipperStats, SHIPPER_FEE_SHARE,
};
pub use schema::{FieldKind, FieldRule, Schema, ValidationMode};
pub use transfer::{export_rows, import_rows, template_rows, ImportReport, RowError, IMPORT_BATCH_SIZE};

use crate::db::{record_id, Document, Repository};
use crate::errors::{AppError, Result};
use crate::query::{
    FilterClause, FilterOp, QueryEngine, QueryOptions, QueryResult, RelationDescriptor, RelationRegistry,
    RelationRequest, SortKey,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every collection the API exposes
pub const COLLECTIONS: [&str; 11] = [
    "categories",
    "restaurants",
    "products",
    "orders",
    "users",
    "notifications",
    "promotions",
    "reviews",
    "cart",
    "favorites",
    "addresses",
];

/// Current time as an RFC 3339 string with millisecond precision
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Singular display name of a collection, used in error messages
pub fn singular(collection: &str) -> String {
    match collection {
        "categories" => "category".to_string(),
        "addresses" => "address".to_string(),
        "cart" => "cart item".to_string(),
        other => other.strip_suffix('s').unwrap_or(other).to_string(),
    }
}

/// Handles passed to hooks so they can read other collections
#[derive(Clone)]
pub struct HookContext {
    engine: QueryEngine,
}

impl HookContext {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    pub fn repo(&self) -> &dyn Repository {
        self.engine.repository().as_ref()
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }
}

/// Per-resource customization points around writes
///
/// Every method defaults to a no-op. `prepare` normalizes the raw payload
/// before any check runs, `validate_*` may reject, `before_*` may rewrite
/// the payload, `after_*` runs once the write has landed.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    fn prepare(&self, _data: &mut Document) {}

    async fn validate_create(&self, _ctx: &HookContext, _data: &Document) -> Result<()> {
        Ok(())
    }

    async fn before_create(&self, _ctx: &HookContext, data: Document) -> Result<Document> {
        Ok(data)
    }

    async fn after_create(&self, _ctx: &HookContext, _created: &Document) -> Result<()> {
        Ok(())
    }

    async fn validate_update(&self, _ctx: &HookContext, _existing: &Document, _patch: &Document) -> Result<()> {
        Ok(())
    }

    async fn before_update(&self, _ctx: &HookContext, _existing: &Document, patch: Document) -> Result<Document> {
        Ok(patch)
    }

    async fn after_update(&self, _ctx: &HookContext, _updated: &Document) -> Result<()> {
        Ok(())
    }

    async fn validate_delete(&self, _ctx: &HookContext, _existing: &Document) -> Result<()> {
        Ok(())
    }

    async fn before_delete(&self, _ctx: &HookContext, _existing: &Document) -> Result<()> {
        Ok(())
    }

    async fn after_delete(&self, _ctx: &HookContext, _removed: &Document) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing
pub struct NoHooks;

impl ResourceHooks for NoHooks {}

/// CRUD and query service for one collection
#[derive(Clone)]
pub struct ResourceService {
    collection: String,
    model_name: String,
    schema: Option<Arc<Schema>>,
    hooks: Arc<dyn ResourceHooks>,
    default_sort: Vec<SortKey>,
    ctx: HookContext,
}

impl ResourceService {
    pub fn new(collection: &str, engine: QueryEngine) -> Self {
        Self {
            collection: collection.to_string(),
            model_name: singular(collection),
            schema: None,
            hooks: Arc::new(NoHooks),
            default_sort: Vec::new(),
            ctx: HookContext::new(engine),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn with_hooks(mut self, hooks: impl ResourceHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Order applied when the caller does not sort
    pub fn with_default_sort(mut self, key: SortKey) -> Self {
        self.default_sort.push(key);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    pub fn engine(&self) -> &QueryEngine {
        self.ctx.engine()
    }

    pub fn repo(&self) -> &dyn Repository {
        self.ctx.repo()
    }

    /// Fields of this collection that are never returned
    pub fn hidden_fields(&self) -> &[String] {
        self.engine().relations().hidden(&self.collection)
    }

    pub(crate) fn present(&self, mut doc: Document) -> Document {
        self.engine().relations().strip_hidden(&self.collection, &mut doc);
        doc
    }

    fn not_found(&self, id: impl ToString) -> AppError {
        AppError::not_found(self.model_name.clone(), id)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// List records with filtering, search, sorting, paging and relations
    pub async fn find_all(&self, mut options: QueryOptions) -> Result<QueryResult> {
        if options.sort.is_empty() {
            options.sort = self.default_sort.clone();
        }

        self.engine().find_all_advanced(&self.collection, &options).await
    }

    /// Full-text search; the query must not be blank
    pub async fn search(&self, q: &str, options: QueryOptions) -> Result<QueryResult> {
        if q.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Search query is required".to_string(),
                field: Some("q".to_string()),
            });
        }
        self.find_all(options.search(q)).await
    }

    /// Fetch one record with relations attached
    pub async fn find_by_id(&self, id: i64, relations: &[RelationRequest]) -> Result<Document> {
        self.engine()
            .find_one_expanded(&self.collection, id, relations)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    /// Raw record lookup, hidden fields included
    pub async fn get(&self, id: i64) -> Result<Document> {
        self.repo()
            .find_by_id(&self.collection, id)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Validate and insert a new record
    pub async fn create(&self, mut data: Document) -> Result<Document> {
        self.hooks.prepare(&mut data);

        if let Some(schema) = &self.schema {
            let errors = schema.validate(&data, ValidationMode::Create);
            if !errors.is_empty() {
                return Err(AppError::InvalidFields { errors });
            }
            self.check_references(schema, &data).await?;
            self.check_unique(schema, &data, None).await?;
            schema.apply_defaults(&mut data);
        }

        self.hooks.validate_create(&self.ctx, &data).await?;
        let mut data = self.hooks.before_create(&self.ctx, data).await?;

        let now = now_iso();
        data.entry("createdAt").or_insert_with(|| Value::String(now.clone()));
        data.entry("updatedAt").or_insert_with(|| Value::String(now));

        let created = self.repo().insert(&self.collection, data).await?;
        self.hooks.after_create(&self.ctx, &created).await?;

        tracing::info!(collection = %self.collection, id = ?record_id(&created), "Record created");
        Ok(self.present(created))
    }

    /// Validate and merge a partial update
    pub async fn update(&self, id: i64, mut patch: Document) -> Result<Document> {
        let existing = self.get(id).await?;
        self.hooks.prepare(&mut patch);

        if let Some(schema) = &self.schema {
            let errors = schema.validate(&patch, ValidationMode::Update);
            if !errors.is_empty() {
                return Err(AppError::InvalidFields { errors });
            }
            self.check_references(schema, &patch).await?;
            self.check_unique(schema, &patch, Some(id)).await?;
        }

        self.hooks.validate_update(&self.ctx, &existing, &patch).await?;
        let mut patch = self.hooks.before_update(&self.ctx, &existing, patch).await?;
        patch.insert("updatedAt".to_string(), Value::String(now_iso()));

        let updated = self
            .repo()
            .update(&self.collection, id, patch)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        self.hooks.after_update(&self.ctx, &updated).await?;

        tracing::info!(collection = %self.collection, id, "Record updated");
        Ok(self.present(updated))
    }

    /// Delete a record, returning what was removed
    pub async fn delete(&self, id: i64) -> Result<Document> {
        let existing = self.get(id).await?;

        self.hooks.validate_delete(&self.ctx, &existing).await?;
        self.hooks.before_delete(&self.ctx, &existing).await?;

        let removed = self
            .repo()
            .delete(&self.collection, id)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        self.hooks.after_delete(&self.ctx, &removed).await?;

        tracing::info!(collection = %self.collection, id, "Record deleted");
        Ok(self.present(removed))
    }

    /// Every non-blank foreign key must point at an existing record
    async fn check_references(&self, schema: &Schema, data: &Document) -> Result<()> {
        for (field, target) in schema.foreign_keys() {
            let Some(value) = data.get(field).filter(|v| !v.is_null()) else {
                continue;
            };

            let found = match value.as_i64().or_else(|| value.as_str().and_then(|s| s.trim().parse().ok())) {
                Some(id) => self.repo().find_by_id(target, id).await?.is_some(),
                None => false,
            };
            if !found {
                return Err(AppError::not_found(singular(target), value));
            }
        }
        Ok(())
    }

    /// Unique fields may not collide with another record
    async fn check_unique(&self, schema: &Schema, data: &Document, exclude: Option<i64>) -> Result<()> {
        for field in schema.unique_fields() {
            let Some(value) = data.get(field).filter(|v| !v.is_null()) else {
                continue;
            };

            let clause = FilterClause::new(field, FilterOp::Eq, value.clone());
            let clash = self
                .repo()
                .find_many(&self.collection, &[clause])
                .await?
                .into_iter()
                .any(|doc| record_id(&doc) != exclude);
            if clash {
                return Err(AppError::Duplicate {
                    message: format!("{} with {field} {value} already exists", self.model_name),
                });
            }
        }
        Ok(())
    }
}

/// Relation catalog of the food-delivery domain
pub fn food_delivery_relations() -> RelationRegistry {
    RelationRegistry::new()
        .with("categories", "restaurants", RelationDescriptor::many("restaurants", "categoryId"))
        .with("categories", "products", RelationDescriptor::many("products", "categoryId"))
        .with("restaurants", "products", RelationDescriptor::many("products", "restaurantId"))
        .with("restaurants", "reviews", RelationDescriptor::many("reviews", "restaurantId"))
        .with("restaurants", "orders", RelationDescriptor::many("orders", "restaurantId"))
        .with("restaurants", "category", RelationDescriptor::one("categories", "categoryId"))
        .with("products", "restaurant", RelationDescriptor::one("restaurants", "restaurantId"))
        .with("products", "category", RelationDescriptor::one("categories", "categoryId"))
        .with("products", "reviews", RelationDescriptor::many("reviews", "productId"))
        .with("users", "orders", RelationDescriptor::many("orders", "userId"))
        .with("users", "reviews", RelationDescriptor::many("reviews", "userId"))
        .with("users", "notifications", RelationDescriptor::many("notifications", "userId"))
        .with("orders", "user", RelationDescriptor::one("users", "userId"))
        .with("orders", "restaurant", RelationDescriptor::one("restaurants", "restaurantId"))
        .with("orders", "shipper", RelationDescriptor::one("users", "shipperId"))
        .with("reviews", "user", RelationDescriptor::one("users", "userId"))
        .with("reviews", "restaurant", RelationDescriptor::one("restaurants", "restaurantId"))
        .with("reviews", "product", RelationDescriptor::one("products", "productId"))
        .with("reviews", "order", RelationDescriptor::one("orders", "orderId"))
        .with("notifications", "user", RelationDescriptor::one("users", "userId"))
        .with("users", "cart", RelationDescriptor::many("cart", "userId"))
        .with("users", "favorites", RelationDescriptor::many("favorites", "userId"))
        .with("users", "addresses", RelationDescriptor::many("addresses", "userId"))
        .with("cart", "user", RelationDescriptor::one("users", "userId"))
        .with("cart", "product", RelationDescriptor::one("products", "productId"))
        .with("favorites", "user", RelationDescriptor::one("users", "userId"))
        .with("addresses", "user", RelationDescriptor::one("users", "userId"))
        .hide("users", "password")
}

/// Lookup table of every resource service
#[derive(Clone)]
pub struct ServiceRegistry {
    engine: QueryEngine,
    services: BTreeMap<String, ResourceService>,
}

impl ServiceRegistry {
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            engine,
            services: BTreeMap::new(),
        }
    }

    pub fn register(mut self, service: ResourceService) -> Self {
        self.services.insert(service.collection().to_string(), service);
        self
    }

    /// Every food-delivery resource with its schema and hooks
    pub fn food_delivery(engine: QueryEngine) -> Self {
        let service = |name: &str| ResourceService::new(name, engine.clone());

        Self::new(engine.clone())
            .register(
                service("categories")
                    .with_schema(category_schema())
                    .with_hooks(CategoryHooks),
            )
            .register(
                service("restaurants")
                    .with_schema(restaurant_schema())
                    .with_hooks(RestaurantHooks),
            )
            .register(
                service("products").with_schema(product_schema()),
            )
            .register(
                service("orders")
                    .with_schema(order_schema())
                    .with_hooks(OrderHooks)
                    .with_default_sort(SortKey::desc("createdAt")),
            )
            .register(
                service("users")
                    .with_schema(user_schema())
                    .with_hooks(UserHooks),
            )
            .register(
                service("notifications")
                    .with_schema(notification_schema())
                    .with_default_sort(SortKey::desc("createdAt")),
            )
            .register(
                service("promotions")
                    .with_schema(promotion_schema())
                    .with_hooks(PromotionHooks),
            )
            .register(
                service("reviews")
                    .with_schema(review_schema())
                    .with_hooks(ReviewHooks)
                    .with_default_sort(SortKey::desc("createdAt")),
            )
            .register(service("cart").with_schema(cart_schema()))
            .register(
                service("favorites")
                    .with_schema(favorite_schema())
                    .with_hooks(FavoriteHooks),
            )
            .register(
                service("addresses")
                    .with_schema(address_schema())
                    .with_hooks(AddressHooks),
            )
    }

    /// Service for a collection, or `UnknownResource`
    pub fn get(&self, name: &str) -> Result<&ResourceService> {
        self.services.get(name).ok_or_else(|| AppError::UnknownResource {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }
}
