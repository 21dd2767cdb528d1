//! Sign-up, sign-in and password changes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use super::{into_document, validate_request, ItemResponse};
use crate::AppState;
use funfood_common::{
    errors::Result,
    services::{change_password, login, register},
    Document,
};

/// POST /auth/register
pub async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ItemResponse<Document>>)> {
    let user = register(state.services.get("users")?, into_document(body)?).await?;
    Ok((StatusCode::CREATED, Json(ItemResponse::with_message(user, "User registered successfully"))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// POST /auth/login
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ItemResponse<Document>>> {
    validate_request(&request)?;
    let user = login(state.services.get("users")?, &request.email, &request.password).await?;
    Ok(Json(ItemResponse::with_message(user, "Login successful")))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,
}

/// PUT /users/{id}/password
pub async fn password(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<ItemResponse<Document>>> {
    validate_request(&request)?;
    let users = state.services.get("users")?;
    let user = change_password(users, id, &request.current_password, &request.new_password).await?;
    Ok(Json(ItemResponse::with_message(user, "Password changed successfully")))
}
