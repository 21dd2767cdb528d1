//! Restaurant and product reviews

use super::accounts::notify;
use super::catalog::refresh_rating;
use super::schema::{FieldRule, Schema};
use super::{HookContext, ResourceHooks};
use crate::db::{record_id, Document};
use crate::errors::{AppError, Result};
use crate::query::{loose_eq, value_key, FilterClause};
use async_trait::async_trait;
use serde_json::Value;

pub fn review_schema() -> Schema {
    Schema::new()
        .field("type", FieldRule::one_of(&["restaurant", "product"]).required())
        .field("userId", FieldRule::number().required().references("users"))
        .field("restaurantId", FieldRule::number().required().references("restaurants"))
        .field("productId", FieldRule::number().references("products"))
        .field("orderId", FieldRule::number().references("orders"))
        .field("rating", FieldRule::number().required().min(1.0).max(5.0))
        .field("comment", FieldRule::string().length(5, 500))
}

fn id_of(doc: &Document, field: &str) -> Option<i64> {
    match doc.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Review targets whose rating depends on `review`
fn rating_targets(review: &Document) -> Vec<(&'static str, i64)> {
    let mut targets = Vec::new();
    if let Some(id) = id_of(review, "restaurantId") {
        targets.push(("restaurant", id));
    }
    if review.get("type").and_then(Value::as_str) == Some("product") {
        if let Some(id) = id_of(review, "productId") {
            targets.push(("product", id));
        }
    }
    targets
}

/// One review per user and target; ratings follow every change
pub struct ReviewHooks;

impl ReviewHooks {
    async fn refresh(&self, ctx: &HookContext, review: &Document) -> Result<()> {
        for (target, id) in rating_targets(review) {
            refresh_rating(ctx.repo(), target, id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceHooks for ReviewHooks {
    async fn validate_create(&self, ctx: &HookContext, data: &Document) -> Result<()> {
        let kind = data.get("type").and_then(Value::as_str).unwrap_or("restaurant");
        let user = data.get("userId").cloned().unwrap_or(Value::Null);
        let restaurant = data.get("restaurantId").cloned().unwrap_or(Value::Null);

        let mut duplicate = vec![
            FilterClause::eq("userId", user),
            FilterClause::eq("type", kind),
        ];

        if kind == "product" {
            let Some(product_id) = id_of(data, "productId") else {
                return Err(AppError::Validation {
                    message: "productId is required for product reviews".to_string(),
                    field: Some("productId".to_string()),
                });
            };

            let product = ctx
                .repo()
                .find_by_id("products", product_id)
                .await?
                .ok_or_else(|| AppError::not_found("product", product_id))?;
            let owner = product.get("restaurantId").unwrap_or(&Value::Null);
            if !loose_eq(owner, &restaurant) {
                return Err(AppError::validation("Product does not belong to this restaurant"));
            }
            duplicate.push(FilterClause::eq("productId", product_id));
        } else {
            duplicate.push(FilterClause::eq("restaurantId", restaurant));
        }

        if ctx.repo().find_one("reviews", &duplicate).await?.is_some() {
            return Err(AppError::Duplicate {
                message: format!("You have already reviewed this {kind}"),
            });
        }
        Ok(())
    }

    async fn after_create(&self, ctx: &HookContext, created: &Document) -> Result<()> {
        self.refresh(ctx, created).await?;

        let kind = created.get("type").and_then(Value::as_str).unwrap_or("restaurant");
        if let Some(user) = created.get("userId") {
            notify(
                ctx.repo(),
                user,
                "Review Submitted",
                format!("Your {kind} review has been submitted successfully"),
                "review",
                created.get("id"),
            )
            .await?;
        }
        Ok(())
    }

    async fn validate_update(&self, _ctx: &HookContext, existing: &Document, patch: &Document) -> Result<()> {
        // a review cannot move to another author or target
        for field in ["userId", "type", "restaurantId", "productId"] {
            if let Some(new) = patch.get(field) {
                let same = match existing.get(field) {
                    Some(old) => value_key(old) == value_key(new),
                    None => new.is_null(),
                };
                if !same {
                    return Err(AppError::Validation {
                        message: format!("{field} cannot be changed"),
                        field: Some(field.to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    async fn after_update(&self, ctx: &HookContext, updated: &Document) -> Result<()> {
        self.refresh(ctx, updated).await
    }

    async fn after_delete(&self, ctx: &HookContext, removed: &Document) -> Result<()> {
        tracing::debug!(review = ?record_id(removed), "Refreshing ratings after review removal");
        self.refresh(ctx, removed).await
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AppError;
    use crate::query::{FilterClause, QueryOptions};
    use crate::services::test_support::{doc, registry};
    use serde_json::json;

    #[tokio::test]
    async fn test_review_updates_restaurant_rating_and_notifies() {
        let registry = registry();
        let reviews = registry.get("reviews").unwrap();

        reviews
            .create(doc(json!({
                "type": "restaurant",
                "userId": 2,
                "restaurantId": 2,
                "rating": 5,
                "comment": "Best coffee in town"
            })))
            .await
            .unwrap();

        let cafe = registry.get("restaurants").unwrap().get(2).await.unwrap();
        assert_eq!(cafe["rating"], 4.5);
        assert_eq!(cafe["totalReviews"], 2);

        let notes = registry
            .get("notifications")
            .unwrap()
            .find_all(QueryOptions::new().clause(FilterClause::eq("userId", 2)))
            .await
            .unwrap();
        assert_eq!(notes.pagination.total, 1);
        assert_eq!(notes.data[0]["type"], "review");
    }

    #[tokio::test]
    async fn test_duplicate_review_rejected() {
        let registry = registry();
        let err = registry
            .get("reviews")
            .unwrap()
            .create(doc(json!({ "type": "restaurant", "userId": 1, "restaurantId": 1, "rating": 3 })))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Duplicate resource: You have already reviewed this restaurant");
    }

    #[tokio::test]
    async fn test_product_review_rules() {
        let registry = registry();
        let reviews = registry.get("reviews").unwrap();

        let err = reviews
            .create(doc(json!({ "type": "product", "userId": 1, "restaurantId": 1, "rating": 4 })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = reviews
            .create(doc(json!({ "type": "product", "userId": 1, "restaurantId": 1, "productId": 3, "rating": 4 })))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: Product does not belong to this restaurant");

        reviews
            .create(doc(json!({ "type": "product", "userId": 1, "restaurantId": 1, "productId": 1, "rating": 4 })))
            .await
            .unwrap();
        let product = registry.get("products").unwrap().get(1).await.unwrap();
        assert_eq!(product["rating"], 4.0);
        assert_eq!(product["totalReviews"], 1);
    }

    #[tokio::test]
    async fn test_rating_out_of_range() {
        let registry = registry();
        let err = registry
            .get("reviews")
            .unwrap()
            .create(doc(json!({ "type": "restaurant", "userId": 2, "restaurantId": 2, "rating": 6 })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFields { .. }));
    }

    #[tokio::test]
    async fn test_delete_recomputes_rating() {
        let registry = registry();
        registry.get("reviews").unwrap().delete(1).await.unwrap();

        let pho = registry.get("restaurants").unwrap().get(1).await.unwrap();
        assert_eq!(pho["rating"], 4.0);
        assert_eq!(pho["totalReviews"], 1);
    }

    #[tokio::test]
    async fn test_review_target_is_immutable() {
        let registry = registry();
        let reviews = registry.get("reviews").unwrap();

        assert!(reviews.update(1, doc(json!({ "restaurantId": 2 }))).await.is_err());
        let updated = reviews.update(1, doc(json!({ "rating": 3, "restaurantId": 1 }))).await.unwrap();
        assert_eq!(updated["rating"], 3);

        let pho = registry.get("restaurants").unwrap().get(1).await.unwrap();
        assert_eq!(pho["rating"], 3.5);
    }
}
