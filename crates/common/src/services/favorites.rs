//! Favorite restaurants and products

use super::schema::{FieldRule, Schema};
use super::{HookContext, ResourceHooks, ResourceService};
use crate::db::{record_id, Document, Repository};
use crate::errors::{AppError, Result};
use crate::query::{value_key, FilterClause, ValueKey};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// What a favorite points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteKind {
    Restaurant,
    Product,
}

impl FavoriteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FavoriteKind::Restaurant => "restaurant",
            FavoriteKind::Product => "product",
        }
    }

    /// Collection holding the favorited records
    pub fn collection(self) -> &'static str {
        match self {
            FavoriteKind::Restaurant => "restaurants",
            FavoriteKind::Product => "products",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "restaurant" => Ok(FavoriteKind::Restaurant),
            "product" => Ok(FavoriteKind::Product),
            _ => Err(AppError::Validation {
                message: "Invalid type. Must be \"restaurant\" or \"product\"".to_string(),
                field: Some("type".to_string()),
            }),
        }
    }
}

impl fmt::Display for FavoriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn favorite_schema() -> Schema {
    Schema::new()
        .field("userId", FieldRule::number().required().references("users"))
        .field("type", FieldRule::one_of(&["restaurant", "product"]).required())
        .field("referenceId", FieldRule::number().required())
}

/// A favorite must point at a live record and may not repeat
pub struct FavoriteHooks;

#[async_trait]
impl ResourceHooks for FavoriteHooks {
    async fn validate_create(&self, ctx: &HookContext, data: &Document) -> Result<()> {
        let kind = FavoriteKind::parse(data.get("type").and_then(Value::as_str).unwrap_or_default())?;
        let user = data.get("userId").cloned().unwrap_or(Value::Null);
        let reference = data.get("referenceId").cloned().unwrap_or(Value::Null);
        ensure_target(ctx.repo(), kind, &reference).await?;
        ensure_new(ctx.repo(), user, kind, reference).await
    }
}

async fn ensure_target(repo: &dyn Repository, kind: FavoriteKind, reference: &Value) -> Result<Document> {
    let found = match reference.as_i64() {
        Some(id) => repo.find_by_id(kind.collection(), id).await?,
        None => None,
    };
    found.ok_or_else(|| AppError::not_found(kind.as_str(), reference))
}

async fn ensure_new(repo: &dyn Repository, user: Value, kind: FavoriteKind, reference: Value) -> Result<()> {
    let clauses = [
        FilterClause::eq("userId", user),
        FilterClause::eq("type", kind.as_str()),
        FilterClause::eq("referenceId", reference),
    ];
    if repo.find_one("favorites", &clauses).await?.is_some() {
        return Err(AppError::validation(format!("{kind} already in favorites")));
    }
    Ok(())
}

fn user_clauses(user_id: i64, kind: Option<FavoriteKind>) -> Vec<FilterClause> {
    let mut clauses = vec![FilterClause::eq("userId", user_id)];
    if let Some(kind) = kind {
        clauses.push(FilterClause::eq("type", kind.as_str()));
    }
    clauses
}

async fn find_favorite(
    favorites: &ResourceService,
    user_id: i64,
    kind: FavoriteKind,
    reference_id: i64,
) -> Result<Option<Document>> {
    let mut clauses = user_clauses(user_id, Some(kind));
    clauses.push(FilterClause::eq("referenceId", reference_id));
    favorites.repo().find_one(favorites.collection(), &clauses).await
}

fn index(docs: Vec<Document>) -> HashMap<ValueKey, Document> {
    docs.into_iter()
        .filter_map(|doc| doc.get("id").and_then(value_key).map(|key| (key, doc)))
        .collect()
}

/// Batched lookup of every record a list of favorites points at
///
/// Products come back with a `restaurant` summary attached.
async fn targets(
    repo: &dyn Repository,
    kind: FavoriteKind,
    references: Vec<Value>,
) -> Result<HashMap<ValueKey, Document>> {
    let mut found = index(repo.find_where_in(kind.collection(), "id", &references).await?);
    if kind == FavoriteKind::Product {
        let restaurant_ids: Vec<Value> = found.values().filter_map(|p| p.get("restaurantId").cloned()).collect();
        let restaurants = index(repo.find_where_in("restaurants", "id", &restaurant_ids).await?);
        for product in found.values_mut() {
            let summary = product
                .get("restaurantId")
                .and_then(value_key)
                .and_then(|k| restaurants.get(&k))
                .map_or(Value::Null, |r| json!({ "id": r.get("id"), "name": r.get("name"), "rating": r.get("rating") }));
            product.insert("restaurant".to_string(), summary);
        }
    }
    Ok(found)
}

fn references(favorites: &[Document], kind: FavoriteKind) -> Vec<Value> {
    favorites
        .iter()
        .filter(|f| f.get("type").and_then(Value::as_str) == Some(kind.as_str()))
        .filter_map(|f| f.get("referenceId").cloned())
        .collect()
}

fn lookup<'a>(found: &'a HashMap<ValueKey, Document>, favorite: &Document) -> Option<&'a Document> {
    favorite.get("referenceId").and_then(value_key).and_then(|k| found.get(&k))
}

/// Every favorite of a user with `restaurant` or `product` filled in
///
/// Favorites whose target is gone are left out.
pub async fn list_favorites(favorites: &ResourceService, user_id: i64) -> Result<Vec<Document>> {
    let repo = favorites.repo();
    let rows = repo.find_many(favorites.collection(), &user_clauses(user_id, None)).await?;
    let restaurants = targets(repo, FavoriteKind::Restaurant, references(&rows, FavoriteKind::Restaurant)).await?;
    let products = targets(repo, FavoriteKind::Product, references(&rows, FavoriteKind::Product)).await?;

    Ok(rows
        .into_iter()
        .filter_map(|mut favorite| {
            let (restaurant, product) = match favorite.get("type").and_then(Value::as_str) {
                Some("restaurant") => (lookup(&restaurants, &favorite).cloned(), None),
                Some("product") => (None, lookup(&products, &favorite).cloned()),
                _ => (None, None),
            };
            if restaurant.is_none() && product.is_none() {
                return None;
            }
            favorite.insert("restaurant".to_string(), restaurant.map_or(Value::Null, Value::Object));
            favorite.insert("product".to_string(), product.map_or(Value::Null, Value::Object));
            Some(favorite)
        })
        .collect())
}

/// Favorites of one kind with the target under `item`
pub async fn favorites_by_type(favorites: &ResourceService, user_id: i64, kind: FavoriteKind) -> Result<Vec<Document>> {
    let repo = favorites.repo();
    let rows = repo.find_many(favorites.collection(), &user_clauses(user_id, Some(kind))).await?;
    let found = targets(repo, kind, references(&rows, kind)).await?;

    Ok(rows
        .into_iter()
        .filter_map(|mut favorite| {
            let item = lookup(&found, &favorite)?.clone();
            favorite.insert("item".to_string(), Value::Object(item));
            Some(favorite)
        })
        .collect())
}

/// Referenced ids only
pub async fn favorite_ids(favorites: &ResourceService, user_id: i64, kind: FavoriteKind) -> Result<Vec<Value>> {
    let rows = favorites
        .repo()
        .find_many(favorites.collection(), &user_clauses(user_id, Some(kind)))
        .await?;
    Ok(references(&rows, kind))
}

pub async fn add_favorite(
    favorites: &ResourceService,
    user_id: i64,
    kind: FavoriteKind,
    reference_id: i64,
) -> Result<Document> {
    let mut doc = Document::new();
    doc.insert("userId".to_string(), json!(user_id));
    doc.insert("type".to_string(), json!(kind));
    doc.insert("referenceId".to_string(), json!(reference_id));
    favorites.create(doc).await
}

pub async fn remove_favorite(
    favorites: &ResourceService,
    user_id: i64,
    kind: FavoriteKind,
    reference_id: i64,
) -> Result<Document> {
    let favorite = find_favorite(favorites, user_id, kind, reference_id)
        .await?
        .ok_or_else(|| AppError::not_found("favorite", reference_id))?;
    favorites.delete(record_id(&favorite).unwrap_or(0)).await
}

/// Add or remove; returns whether the item is now a favorite
pub async fn toggle_favorite(
    favorites: &ResourceService,
    user_id: i64,
    kind: FavoriteKind,
    reference_id: i64,
) -> Result<(bool, Option<Document>)> {
    match find_favorite(favorites, user_id, kind, reference_id).await? {
        Some(existing) => {
            favorites.delete(record_id(&existing).unwrap_or(0)).await?;
            Ok((false, None))
        }
        None => {
            let created = add_favorite(favorites, user_id, kind, reference_id).await?;
            Ok((true, Some(created)))
        }
    }
}

pub async fn check_favorite(
    favorites: &ResourceService,
    user_id: i64,
    kind: FavoriteKind,
    reference_id: i64,
) -> Result<Option<Document>> {
    find_favorite(favorites, user_id, kind, reference_id).await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingItem {
    pub item: Document,
    pub favorite_count: usize,
    #[serde(rename = "type")]
    pub kind: FavoriteKind,
}

/// Most favorited targets across all users
///
/// Ties keep the order in which targets were first favorited.
pub async fn trending_favorites(favorites: &ResourceService, kind: FavoriteKind, limit: usize) -> Result<Vec<TrendingItem>> {
    let repo = favorites.repo();
    let rows = repo
        .find_many(favorites.collection(), &[FilterClause::eq("type", kind.as_str())])
        .await?;

    let mut counts: Vec<(Value, usize)> = Vec::new();
    let mut slots: HashMap<ValueKey, usize> = HashMap::new();
    for reference in references(&rows, kind) {
        let Some(key) = value_key(&reference) else {
            continue;
        };
        let slot = *slots.entry(key).or_insert_with(|| {
            counts.push((reference.clone(), 0));
            counts.len() - 1
        });
        counts[slot].1 += 1;
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);

    let found = targets(repo, kind, counts.iter().map(|(r, _)| r.clone()).collect()).await?;
    Ok(counts
        .into_iter()
        .filter_map(|(reference, favorite_count)| {
            let item = value_key(&reference).and_then(|k| found.get(&k))?.clone();
            Some(TrendingItem { item, favorite_count, kind })
        })
        .collect())
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteStats {
    pub total: usize,
    pub by_type: HashMap<FavoriteKind, usize>,
}

pub async fn favorite_stats(favorites: &ResourceService, user_id: i64) -> Result<FavoriteStats> {
    let rows = favorites
        .repo()
        .find_many(favorites.collection(), &user_clauses(user_id, None))
        .await?;

    let by_type = [FavoriteKind::Restaurant, FavoriteKind::Product]
        .into_iter()
        .map(|kind| (kind, references(&rows, kind).len()))
        .collect();
    Ok(FavoriteStats { total: rows.len(), by_type })
}

/// Remove every favorite of a user, or only those of one kind
pub async fn clear_favorites(favorites: &ResourceService, user_id: i64, kind: Option<FavoriteKind>) -> Result<usize> {
    let rows = favorites
        .repo()
        .find_many(favorites.collection(), &user_clauses(user_id, kind))
        .await?;
    for id in rows.iter().filter_map(record_id) {
        favorites.repo().delete(favorites.collection(), id).await?;
    }
    Ok(rows.len())
}
