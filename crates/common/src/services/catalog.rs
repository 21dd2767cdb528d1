//! Categories, restaurants and products

use super::{now_iso, HookContext, ResourceHooks, ResourceService};
use super::schema::{FieldRule, Schema};
use crate::db::{Document, Repository};
use crate::errors::{AppError, Result};
use crate::query::{as_number, FilterClause, QueryOptions, QueryResult, SortKey};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Radius used by nearby search when the caller gives none
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn category_schema() -> Schema {
    Schema::new()
        .field("name", FieldRule::string().required().unique().length(2, 50))
        .field("icon", FieldRule::string().default_value("📦"))
        .field("image", FieldRule::string().default_value(""))
        .field("description", FieldRule::string().length(0, 500))
}

pub fn restaurant_schema() -> Schema {
    Schema::new()
        .field("name", FieldRule::string().required().unique().length(2, 100))
        .field("description", FieldRule::string().length(0, 1000))
        .field("categoryId", FieldRule::number().required().references("categories"))
        .field("address", FieldRule::string().required().length(10, 200))
        .field("latitude", FieldRule::number().min(-90.0).max(90.0))
        .field("longitude", FieldRule::number().min(-180.0).max(180.0))
        .field("phone", FieldRule::string().length(10, 15))
        .field("image", FieldRule::string().default_value(""))
        .field("deliveryFee", FieldRule::number().min(0.0).default_value(15000))
        .field("deliveryTime", FieldRule::string().default_value("20-30 min"))
        .field("openTime", FieldRule::string().default_value("08:00"))
        .field("closeTime", FieldRule::string().default_value("22:00"))
        .field("isOpen", FieldRule::boolean().default_value(true))
        .field("managerId", FieldRule::number().references("users"))
}

pub fn product_schema() -> Schema {
    Schema::new()
        .field("name", FieldRule::string().required().length(2, 100))
        .field("description", FieldRule::string().length(0, 1000))
        .field("restaurantId", FieldRule::number().required().references("restaurants"))
        .field("categoryId", FieldRule::number().references("categories"))
        .field("price", FieldRule::number().required().min(0.0))
        .field("image", FieldRule::string().default_value(""))
        .field("available", FieldRule::boolean().default_value(true))
        .field("discount", FieldRule::number().min(0.0).max(100.0).default_value(0))
}

async fn count_where(repo: &dyn Repository, collection: &str, field: &str, id: &Value) -> Result<usize> {
    let clause = FilterClause::eq(field, id.clone());
    Ok(repo.find_many(collection, &[clause]).await?.len())
}

/// Refuses to delete a category still referenced by restaurants or products
pub struct CategoryHooks;

#[async_trait]
impl ResourceHooks for CategoryHooks {
    async fn validate_delete(&self, ctx: &HookContext, existing: &Document) -> Result<()> {
        let id = existing.get("id").cloned().unwrap_or(Value::Null);
        let restaurants = count_where(ctx.repo(), "restaurants", "categoryId", &id).await?;
        let products = count_where(ctx.repo(), "products", "categoryId", &id).await?;

        if restaurants > 0 || products > 0 {
            return Err(AppError::InUse {
                message: "Cannot delete category that is in use".to_string(),
                details: json!({ "restaurants": restaurants, "products": products }),
            });
        }
        Ok(())
    }
}

/// New restaurants start unrated; restaurants with products cannot be deleted
pub struct RestaurantHooks;

#[async_trait]
impl ResourceHooks for RestaurantHooks {
    async fn before_create(&self, _ctx: &HookContext, mut data: Document) -> Result<Document> {
        data.insert("rating".to_string(), json!(0));
        data.insert("totalReviews".to_string(), json!(0));
        Ok(data)
    }

    async fn before_update(&self, _ctx: &HookContext, _existing: &Document, mut patch: Document) -> Result<Document> {
        // rating is derived from reviews
        patch.remove("rating");
        patch.remove("totalReviews");
        Ok(patch)
    }

    async fn validate_delete(&self, ctx: &HookContext, existing: &Document) -> Result<()> {
        let id = existing.get("id").cloned().unwrap_or(Value::Null);
        let products = count_where(ctx.repo(), "products", "restaurantId", &id).await?;
        if products > 0 {
            return Err(AppError::InUse {
                message: "Cannot delete restaurant with existing products".to_string(),
                details: json!({ "products": products }),
            });
        }
        Ok(())
    }
}

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Coordinates stored on a record, if both are present and numeric
    pub fn of(doc: &Document) -> Option<Self> {
        let latitude = doc.get("latitude").and_then(as_number)?;
        let longitude = doc.get("longitude").and_then(as_number)?;
        Some(Self::new(latitude, longitude))
    }
}

/// Great-circle distance in kilometres (haversine)
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Restaurants within `radius_km` of `origin`, closest first
///
/// Each record gains a `distance` field (km, two decimals). Records without
/// coordinates are skipped. Filters, search and paging from `options`
/// apply on top.
pub async fn nearby_restaurants(
    restaurants: &ResourceService,
    origin: GeoPoint,
    radius_km: Option<f64>,
    mut options: QueryOptions,
) -> Result<QueryResult> {
    let radius = radius_km.filter(|r| *r > 0.0).unwrap_or(DEFAULT_RADIUS_KM);
    let records = restaurants.repo().snapshot(restaurants.collection()).await?;

    let within: Vec<Document> = records
        .into_iter()
        .filter_map(|mut doc| {
            let distance = round_to(distance_km(origin, GeoPoint::of(&doc)?), 2);
            if distance > radius {
                return None;
            }
            doc.insert("distance".to_string(), json!(distance));
            Some(doc)
        })
        .collect();

    if options.sort.is_empty() {
        options.sort.push(SortKey::asc("distance"));
    }

    tracing::debug!(radius_km = radius, candidates = within.len(), "Nearby search");
    restaurants
        .engine()
        .find_in(restaurants.collection(), within, &options)
        .await
}

/// Products of one restaurant; 404 when the restaurant does not exist
pub async fn restaurant_menu(
    restaurants: &ResourceService,
    products: &ResourceService,
    restaurant_id: i64,
    options: QueryOptions,
) -> Result<QueryResult> {
    restaurants.get(restaurant_id).await?;
    products
        .find_all(options.clause(FilterClause::eq("restaurantId", restaurant_id)))
        .await
}

/// Recompute a restaurant's or product's rating from its reviews
///
/// Only reviews of the matching `type` count. The average is rounded to
/// one decimal; no reviews resets the rating to 0.
pub async fn refresh_rating(repo: &dyn Repository, target: &str, id: i64) -> Result<Option<Document>> {
    let (collection, field) = match target {
        "product" => ("products", "productId"),
        _ => ("restaurants", "restaurantId"),
    };

    let reviews = repo
        .find_many(
            "reviews",
            &[FilterClause::eq(field, id), FilterClause::eq("type", target)],
        )
        .await?;

    let ratings: Vec<f64> = reviews
        .iter()
        .filter_map(|review| review.get("rating").and_then(as_number))
        .collect();
    let rating = if ratings.is_empty() {
        0.0
    } else {
        round_to(ratings.iter().sum::<f64>() / ratings.len() as f64, 1)
    };

    let mut patch = Document::new();
    patch.insert("rating".to_string(), json!(rating));
    patch.insert("totalReviews".to_string(), json!(ratings.len()));

    let updated = repo.update(collection, id, patch).await?;
    tracing::debug!(collection, id, rating, reviews = ratings.len(), "Rating refreshed");
    Ok(updated)
}

/// Available products with a non-zero discount
pub async fn discounted_products(products: &ResourceService, options: QueryOptions) -> Result<QueryResult> {
    products
        .find_all(options.filter("discount_ne", 0).filter("available", true))
        .await
}

/// Products priced within `[min, max]`
pub async fn products_in_price_range(
    products: &ResourceService,
    min: f64,
    max: f64,
    options: QueryOptions,
) -> Result<QueryResult> {
    if min > max {
        return Err(AppError::validation("minPrice must not exceed maxPrice"));
    }
    products
        .find_all(options.filter("price_gte", min).filter("price_lte", max))
        .await
}

/// Set `available` on many products; unknown ids are skipped
pub async fn bulk_update_availability(
    products: &ResourceService,
    ids: &[i64],
    available: bool,
) -> Result<Vec<Document>> {
    let mut updated = Vec::with_capacity(ids.len());
    for &id in ids {
        let mut patch = Document::new();
        patch.insert("available".to_string(), Value::Bool(available));
        patch.insert("updatedAt".to_string(), Value::String(now_iso()));

        if let Some(doc) = products.repo().update(products.collection(), id, patch).await? {
            updated.push(doc);
        }
    }

    tracing::info!(requested = ids.len(), updated = updated.len(), available, "Bulk availability update");
    Ok(updated)
}
