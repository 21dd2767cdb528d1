//! Users, sign-in and notifications

use super::schema::{FieldRule, Schema};
use super::{now_iso, HookContext, ResourceHooks, ResourceService};
use crate::db::{record_id, Document, Repository};
use crate::query::FilterClause;
use crate::errors::{AppError, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const USER_ROLES: [&str; 4] = ["customer", "admin", "manager", "shipper"];

pub fn user_schema() -> Schema {
    Schema::new()
        .field("name", FieldRule::string().required().length(2, 100))
        .field("email", FieldRule::email().required().unique())
        .field("password", FieldRule::string().required().length(6, 128))
        .field("phone", FieldRule::string().length(10, 11))
        .field("address", FieldRule::string().default_value(""))
        .field("avatar", FieldRule::string().default_value(""))
        .field("role", FieldRule::one_of(&USER_ROLES).default_value("customer"))
        .field("isActive", FieldRule::boolean().default_value(true))
}

pub fn notification_schema() -> Schema {
    Schema::new()
        .field("userId", FieldRule::number().required().references("users"))
        .field("title", FieldRule::string().required().length(1, 200))
        .field("message", FieldRule::string().required().length(1, 1000))
        .field("type", FieldRule::one_of(&["order", "review", "promotion", "system"]).default_value("system"))
        .field("refId", FieldRule::number())
        .field("isRead", FieldRule::boolean().default_value(false))
}

fn normalize_email(doc: &mut Document) {
    if let Some(Value::String(email)) = doc.get_mut("email") {
        *email = email.trim().to_lowercase();
    }
}

/// Hash a plaintext password into a PHC string
pub async fn hash_password(plain: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal {
                message: format!("password hashing failed: {e}"),
            })
    })
    .await
    .map_err(|e| AppError::Internal {
        message: format!("password hashing task failed: {e}"),
    })?
}

/// Check a plaintext password against a stored PHC string
pub fn verify_password(plain: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|hash| Argon2::default().verify_password(plain.as_bytes(), &hash).is_ok())
        .unwrap_or(false)
}

async fn password_matches(plain: &str, stored: Option<&Value>) -> Result<bool> {
    let Some(stored) = stored.and_then(Value::as_str).map(str::to_string) else {
        return Ok(false);
    };
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || verify_password(&plain, &stored))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("password check task failed: {e}"),
        })
}

async fn hash_password_field(doc: &mut Document) -> Result<()> {
    if let Some(Value::String(plain)) = doc.get("password") {
        let hashed = hash_password(plain.clone()).await?;
        doc.insert("password".to_string(), Value::String(hashed));
    }
    Ok(())
}

/// Emails are stored trimmed and lowercased; passwords only as argon2 hashes
pub struct UserHooks;

#[async_trait]
impl ResourceHooks for UserHooks {
    fn prepare(&self, data: &mut Document) {
        normalize_email(data);
    }

    async fn before_create(&self, _ctx: &HookContext, mut data: Document) -> Result<Document> {
        hash_password_field(&mut data).await?;
        Ok(data)
    }

    async fn before_update(&self, _ctx: &HookContext, _existing: &Document, mut patch: Document) -> Result<Document> {
        hash_password_field(&mut patch).await?;
        Ok(patch)
    }
}

const BAD_CREDENTIALS: &str = "Invalid email or password";

/// Create a customer account
///
/// Role and activity flags are fixed regardless of the payload.
pub async fn register(users: &ResourceService, mut data: Document) -> Result<Document> {
    normalize_email(&mut data);
    if let Some(email) = data.get("email").filter(|e| !e.is_null()) {
        let clause = FilterClause::eq("email", email.clone());
        if users.repo().find_one(users.collection(), &[clause]).await?.is_some() {
            return Err(AppError::Duplicate {
                message: "Email already registered".to_string(),
            });
        }
    }

    let name = data.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    data.insert("role".to_string(), json!("customer"));
    data.insert("isActive".to_string(), json!(true));
    data.insert("lastLogin".to_string(), json!(now_iso()));
    if data.get("avatar").and_then(Value::as_str).map_or(true, str::is_empty) {
        data.insert(
            "avatar".to_string(),
            json!(format!("https://ui-avatars.com/api/?name={}&background=random", name.replace(' ', "+"))),
        );
    }

    let user = users.create(data).await?;
    tracing::info!(user_id = ?record_id(&user), "User registered");
    Ok(user)
}

/// Check credentials and stamp `lastLogin`
pub async fn login(users: &ResourceService, email: &str, password: &str) -> Result<Document> {
    let email = email.trim().to_lowercase();
    let user = users
        .repo()
        .find_one(users.collection(), &[FilterClause::eq("email", email)])
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: BAD_CREDENTIALS.to_string(),
        })?;

    if user.get("isActive") == Some(&Value::Bool(false)) {
        return Err(AppError::Unauthorized {
            message: "Account is inactive".to_string(),
        });
    }
    if !password_matches(password, user.get("password")).await? {
        return Err(AppError::Unauthorized {
            message: BAD_CREDENTIALS.to_string(),
        });
    }

    let id = record_id(&user).ok_or_else(|| AppError::Internal {
        message: "stored user has no id".to_string(),
    })?;
    let mut patch = Document::new();
    patch.insert("lastLogin".to_string(), json!(now_iso()));
    let user = users
        .repo()
        .update(users.collection(), id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("user", id))?;

    tracing::info!(user_id = id, "User logged in");
    Ok(users.present(user))
}

/// Replace a password after checking the current one
///
/// New passwords need six characters and an uppercase letter or a digit.
pub async fn change_password(users: &ResourceService, id: i64, current: &str, new: &str) -> Result<Document> {
    let user = users.get(id).await?;
    if !password_matches(current, user.get("password")).await? {
        return Err(AppError::Validation {
            message: "Current password is incorrect".to_string(),
            field: Some("currentPassword".to_string()),
        });
    }

    let strong = new.chars().count() >= 6
        && new.chars().any(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !strong {
        return Err(AppError::Validation {
            message: "New password must be at least 6 characters and contain an uppercase letter or number"
                .to_string(),
            field: Some("newPassword".to_string()),
        });
    }

    let mut patch = Document::new();
    patch.insert("password".to_string(), json!(new));
    let updated = users.update(id, patch).await?;
    tracing::info!(user_id = id, "Password changed");
    Ok(updated)
}

/// Append a notification for `user_id`
pub(crate) async fn notify(
    repo: &dyn Repository,
    user_id: &Value,
    title: &str,
    message: String,
    kind: &str,
    ref_id: Option<&Value>,
) -> Result<Document> {
    let mut doc = Document::new();
    doc.insert("userId".to_string(), user_id.clone());
    doc.insert("title".to_string(), json!(title));
    doc.insert("message".to_string(), json!(message));
    doc.insert("type".to_string(), json!(kind));
    doc.insert("refId".to_string(), ref_id.cloned().unwrap_or(Value::Null));
    doc.insert("isRead".to_string(), json!(false));
    doc.insert("createdAt".to_string(), json!(now_iso()));

    repo.insert("notifications", doc).await
}
