//! Promotion codes and discount computation

use super::schema::{FieldRule, Schema};
use super::ResourceHooks;
use crate::db::{Document, Repository};
use crate::errors::{AppError, Result};
use crate::query::{as_number, parse_timestamp, FilterClause};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub fn promotion_schema() -> Schema {
    Schema::new()
        .field("code", FieldRule::string().required().unique().length(3, 20))
        .field("description", FieldRule::string().required().length(1, 500))
        .field("discountType", FieldRule::one_of(&["percentage", "fixed", "delivery"]).required())
        .field("discountValue", FieldRule::number().required().min(0.0))
        .field("minOrderValue", FieldRule::number().min(0.0).default_value(0))
        .field("maxDiscount", FieldRule::number().min(0.0))
        .field("validFrom", FieldRule::date().required())
        .field("validTo", FieldRule::date().required())
        .field("usageLimit", FieldRule::number().min(0.0))
        .field("perUserLimit", FieldRule::number().min(0.0))
        .field("isActive", FieldRule::boolean().default_value(true))
}

fn normalize_code(doc: &mut Document) {
    if let Some(Value::String(code)) = doc.get_mut("code") {
        *code = code.trim().to_uppercase();
    }
}

/// Codes are stored uppercased so lookups are case-insensitive
pub struct PromotionHooks;

impl ResourceHooks for PromotionHooks {
    fn prepare(&self, data: &mut Document) {
        normalize_code(data);
    }
}

/// Outcome of applying a code to an order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionQuote {
    pub code: String,
    pub discount: f64,
    pub promotion: Document,
}

fn number(doc: &Document, field: &str) -> Option<f64> {
    doc.get(field).and_then(as_number)
}

/// Discount a promotion grants, rounded to the nearest whole unit
///
/// Percentage discounts are capped by `maxDiscount` when present; a
/// delivery promotion waives the delivery fee.
pub fn compute_discount(promotion: &Document, order_value: f64, delivery_fee: f64) -> f64 {
    let value = number(promotion, "discountValue").unwrap_or(0.0);
    let discount = match promotion.get("discountType").and_then(Value::as_str) {
        Some("percentage") => {
            let raw = order_value * value / 100.0;
            match number(promotion, "maxDiscount") {
                Some(cap) if cap > 0.0 => raw.min(cap),
                _ => raw,
            }
        }
        Some("fixed") => value,
        Some("delivery") => delivery_fee,
        _ => 0.0,
    };
    discount.max(0.0).round()
}

/// Validate `code` against an order and compute its discount
///
/// The code must exist and be active, `now` must fall inside the
/// validity window, the order must reach `minOrderValue`, and the usage
/// limits must not be exhausted. `user_id` enables the per-user limit.
pub async fn apply_promotion(
    repo: &dyn Repository,
    code: &str,
    order_value: f64,
    delivery_fee: f64,
    user_id: Option<&Value>,
    now: DateTime<Utc>,
) -> Result<PromotionQuote> {
    let code = code.trim().to_uppercase();
    let promotion = repo
        .find_one(
            "promotions",
            &[FilterClause::eq("code", code.as_str()), FilterClause::eq("isActive", true)],
        )
        .await?
        .ok_or_else(|| AppError::not_found("promotion", &code))?;

    let now_ms = now.timestamp_millis();
    let from = promotion.get("validFrom").and_then(Value::as_str).and_then(parse_timestamp);
    let to = promotion.get("validTo").and_then(Value::as_str).and_then(parse_timestamp);
    if from.is_some_and(|from| from > now_ms) || to.is_some_and(|to| to < now_ms) {
        return Err(AppError::validation("Promotion code is not valid at this time"));
    }

    if let Some(min) = number(&promotion, "minOrderValue") {
        if order_value < min {
            return Err(AppError::Validation {
                message: format!("Minimum order value is {min}"),
                field: Some("orderValue".to_string()),
            });
        }
    }

    let used = number(&promotion, "usageCount").unwrap_or(0.0);
    if let Some(limit) = number(&promotion, "usageLimit").filter(|l| *l > 0.0) {
        if used >= limit {
            return Err(AppError::validation("Promotion usage limit reached"));
        }
    }

    if let (Some(user), Some(limit)) = (user_id, number(&promotion, "perUserLimit").filter(|l| *l > 0.0)) {
        let promotion_id = promotion.get("id").cloned().unwrap_or(Value::Null);
        let redeemed = repo
            .find_many(
                "orders",
                &[FilterClause::eq("userId", user.clone()), FilterClause::eq("promotionId", promotion_id)],
            )
            .await?
            .len();
        if redeemed as f64 >= limit {
            return Err(AppError::validation("You have already used this promotion"));
        }
    }

    let discount = compute_discount(&promotion, order_value, delivery_fee);
    tracing::debug!(code = %code, order_value, discount, "Promotion applied");

    Ok(PromotionQuote {
        code,
        discount,
        promotion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{doc, registry};
    use serde_json::json;

    #[test]
    fn test_compute_discount_by_type() {
        let pct = doc(json!({ "discountType": "percentage", "discountValue": 10, "maxDiscount": 20000 }));
        assert_eq!(compute_discount(&pct, 150000.0, 15000.0), 15000.0);
        assert_eq!(compute_discount(&pct, 500000.0, 15000.0), 20000.0);

        let uncapped = doc(json!({ "discountType": "percentage", "discountValue": 15 }));
        assert_eq!(compute_discount(&uncapped, 1000.5, 0.0), 150.0);

        let fixed = doc(json!({ "discountType": "fixed", "discountValue": 5000 }));
        assert_eq!(compute_discount(&fixed, 10.0, 0.0), 5000.0);

        let ship = doc(json!({ "discountType": "delivery", "discountValue": 0 }));
        assert_eq!(compute_discount(&ship, 10.0, 12000.0), 12000.0);
    }

    #[tokio::test]
    async fn test_apply_checks_window_minimum_and_case() {
        let registry = registry();
        let repo = registry.engine().repository().clone();
        let now = Utc::now();

        let quote = apply_promotion(repo.as_ref(), "sale10", 100000.0, 15000.0, None, now)
            .await
            .unwrap();
        assert_eq!(quote.code, "SALE10");
        assert_eq!(quote.discount, 10000.0);

        let err = apply_promotion(repo.as_ref(), "SALE10", 20000.0, 15000.0, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: Minimum order value is 50000");

        assert!(apply_promotion(repo.as_ref(), "OLD", 100000.0, 0.0, None, now).await.is_err());
        let err = apply_promotion(repo.as_ref(), "NOPE", 1.0, 0.0, None, now).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_code_is_uppercased_and_unique() {
        let registry = registry();
        let promotions = registry.get("promotions").unwrap();
        let body = json!({
            "code": "summer25",
            "description": "Summer sale",
            "discountType": "fixed",
            "discountValue": 25000,
            "validFrom": "2024-06-01",
            "validTo": "2099-08-31"
        });

        let created = promotions.create(doc(body.clone())).await.unwrap();
        assert_eq!(created["code"], "SUMMER25");
        assert_eq!(created["isActive"], true);

        let err = promotions.create(doc(body)).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));
    }
}
