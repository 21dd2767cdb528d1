//! Favorites under /users/{id}/favorites, plus trending across users

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ItemResponse;
use crate::AppState;
use funfood_common::{
    errors::Result,
    services::{
        add_favorite, check_favorite, clear_favorites, favorite_ids, favorite_stats, favorites_by_type,
        list_favorites, remove_favorite, toggle_favorite, trending_favorites, FavoriteKind, FavoriteStats,
        TrendingItem,
    },
    Document,
};

/// GET /users/{id}/favorites
pub async fn list(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<Vec<Document>>>> {
    let favorites = list_favorites(state.services.get("favorites")?, user_id).await?;
    Ok(Json(ItemResponse::new(favorites)))
}

/// GET /users/{id}/favorites/{kind}
pub async fn by_type(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(i64, String)>,
) -> Result<Json<ItemResponse<Vec<Document>>>> {
    let kind = FavoriteKind::parse(&kind)?;
    let favorites = favorites_by_type(state.services.get("favorites")?, user_id, kind).await?;
    Ok(Json(ItemResponse::new(favorites)))
}

/// GET /users/{id}/favorites/{kind}/ids
pub async fn ids(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(i64, String)>,
) -> Result<Json<ItemResponse<Vec<Value>>>> {
    let kind = FavoriteKind::parse(&kind)?;
    let ids = favorite_ids(state.services.get("favorites")?, user_id, kind).await?;
    Ok(Json(ItemResponse::new(ids)))
}

/// POST /users/{id}/favorites/{kind}/{reference_id}
pub async fn add(
    State(state): State<AppState>,
    Path((user_id, kind, reference_id)): Path<(i64, String, i64)>,
) -> Result<(StatusCode, Json<ItemResponse<Document>>)> {
    let kind = FavoriteKind::parse(&kind)?;
    let favorite = add_favorite(state.services.get("favorites")?, user_id, kind, reference_id).await?;
    let message = format!("{kind} added to favorites");
    Ok((StatusCode::CREATED, Json(ItemResponse::with_message(favorite, message))))
}

/// DELETE /users/{id}/favorites/{kind}/{reference_id}
pub async fn remove(
    State(state): State<AppState>,
    Path((user_id, kind, reference_id)): Path<(i64, String, i64)>,
) -> Result<Json<ItemResponse<Document>>> {
    let kind = FavoriteKind::parse(&kind)?;
    let removed = remove_favorite(state.services.get("favorites")?, user_id, kind, reference_id).await?;
    Ok(Json(ItemResponse::with_message(removed, format!("{kind} removed from favorites"))))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteState {
    pub is_favorite: bool,
    pub favorite: Option<Document>,
}

/// POST /users/{id}/favorites/{kind}/{reference_id}/toggle
pub async fn toggle(
    State(state): State<AppState>,
    Path((user_id, kind, reference_id)): Path<(i64, String, i64)>,
) -> Result<Json<ItemResponse<FavoriteState>>> {
    let kind = FavoriteKind::parse(&kind)?;
    let (is_favorite, favorite) = toggle_favorite(state.services.get("favorites")?, user_id, kind, reference_id).await?;
    let message = if is_favorite {
        format!("{kind} added to favorites")
    } else {
        format!("{kind} removed from favorites")
    };
    Ok(Json(ItemResponse::with_message(FavoriteState { is_favorite, favorite }, message)))
}

/// GET /users/{id}/favorites/{kind}/{reference_id}
pub async fn check(
    State(state): State<AppState>,
    Path((user_id, kind, reference_id)): Path<(i64, String, i64)>,
) -> Result<Json<ItemResponse<FavoriteState>>> {
    let kind = FavoriteKind::parse(&kind)?;
    let favorite = check_favorite(state.services.get("favorites")?, user_id, kind, reference_id).await?;
    Ok(Json(ItemResponse::new(FavoriteState {
        is_favorite: favorite.is_some(),
        favorite,
    })))
}

/// GET /users/{id}/favorites/stats
pub async fn stats(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<FavoriteStats>>> {
    let stats = favorite_stats(state.services.get("favorites")?, user_id).await?;
    Ok(Json(ItemResponse::new(stats)))
}

/// DELETE /users/{id}/favorites
pub async fn clear_all(State(state): State<AppState>, Path(user_id): Path<i64>) -> Result<Json<ItemResponse<Value>>> {
    let cleared = clear_favorites(state.services.get("favorites")?, user_id, None).await?;
    let message = if cleared == 0 { "No favorites to clear" } else { "All favorites cleared" };
    Ok(Json(ItemResponse::with_message(json!({ "cleared": cleared }), message)))
}

/// DELETE /users/{id}/favorites/{kind}
pub async fn clear_by_type(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(i64, String)>,
) -> Result<Json<ItemResponse<Value>>> {
    let kind = FavoriteKind::parse(&kind)?;
    let cleared = clear_favorites(state.services.get("favorites")?, user_id, Some(kind)).await?;
    let message = if cleared == 0 {
        format!("No {kind} favorites to clear")
    } else {
        format!("{kind} favorites cleared")
    };
    Ok(Json(ItemResponse::with_message(json!({ "cleared": cleared }), message)))
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    pub limit: Option<usize>,
}

/// GET /favorites/trending/{kind}?limit
pub async fn trending(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<TrendingParams>,
) -> Result<Json<ItemResponse<Vec<TrendingItem>>>> {
    let kind = FavoriteKind::parse(&kind)?;
    let limit = params.limit.unwrap_or(10).max(1);
    let trending = trending_favorites(state.services.get("favorites")?, kind, limit).await?;
    Ok(Json(ItemResponse::new(trending)))
}
