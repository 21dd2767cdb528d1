//! API handlers module

pub mod account;
pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod favorites;
pub mod health;
pub mod resources;
pub mod shipper;
pub mod transfer;

use funfood_common::{
    errors::{AppError, FieldError, Result},
    query::Pagination,
    services::ResourceService,
    Document, QueryOptions, QueryResult,
};
use serde::Serialize;
use validator::Validate;

use crate::AppState;

/// Collection served by a nested resource router
#[derive(Debug, Clone, Copy)]
pub struct Resource(pub &'static str);

/// Envelope for every list endpoint
#[derive(Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Document>,
    pub pagination: Pagination,
}

impl From<QueryResult> for ListResponse {
    fn from(result: QueryResult) -> Self {
        Self {
            success: true,
            count: result.data.len(),
            data: result.data,
            pagination: result.pagination,
        }
    }
}

/// Envelope for single items and mutations
#[derive(Serialize)]
pub struct ItemResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ItemResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// Capitalized model name for response messages
pub fn display_name(service: &ResourceService) -> String {
    let name = service.model_name();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Decode query pairs, skipping keys an endpoint consumes itself
pub fn query_options(state: &AppState, pairs: Vec<(String, String)>, consumed: &[&str]) -> QueryOptions {
    let pairs = pairs.into_iter().filter(|(key, _)| !consumed.contains(&key.as_str()));
    QueryOptions::from_pairs(pairs, state.config.query.default_limit)
}

/// Require a JSON object body
pub fn into_document(body: serde_json::Value) -> Result<Document> {
    match body {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(AppError::validation("Request body must be a JSON object")),
    }
}

/// Run `validator` rules and report every failing field
pub fn validate_request<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|errors| {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, failures)| {
                failures.iter().map(move |failure| {
                    let message = failure
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid"));
                    FieldError::new(field.to_string(), message)
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::InvalidFields { errors: fields }
    })
}
