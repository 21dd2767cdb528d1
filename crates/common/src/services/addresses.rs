//! Saved delivery addresses

use super::schema::{FieldRule, Schema};
use super::{now_iso, HookContext, ResourceHooks, ResourceService};
use crate::db::{record_id, Document, Repository};
use crate::errors::{AppError, Result};
use crate::query::{loose_eq, FilterClause};
use async_trait::async_trait;
use serde_json::{json, Value};

pub fn address_schema() -> Schema {
    Schema::new()
        .field("userId", FieldRule::number().required().references("users"))
        .field("label", FieldRule::string().length(1, 50).default_value("Home"))
        .field("address", FieldRule::string().required().length(10, 200))
        .field("recipientName", FieldRule::string().length(2, 100))
        .field("recipientPhone", FieldRule::string().length(10, 11))
        .field("latitude", FieldRule::number().min(-90.0).max(90.0))
        .field("longitude", FieldRule::number().min(-180.0).max(180.0))
        .field("isDefault", FieldRule::boolean().default_value(false))
}

/// Clear `isDefault` on a user's other addresses
async fn unset_defaults(repo: &dyn Repository, user: &Value, keep: Option<i64>) -> Result<()> {
    let clauses = [FilterClause::eq("userId", user.clone()), FilterClause::eq("isDefault", true)];
    for id in repo.find_many("addresses", &clauses).await?.iter().filter_map(record_id) {
        if Some(id) == keep {
            continue;
        }
        let mut patch = Document::new();
        patch.insert("isDefault".to_string(), json!(false));
        repo.update("addresses", id, patch).await?;
    }
    Ok(())
}

fn wants_default(doc: &Document) -> bool {
    doc.get("isDefault") == Some(&Value::Bool(true))
}

/// A user has at most one default address
pub struct AddressHooks;

#[async_trait]
impl ResourceHooks for AddressHooks {
    async fn before_create(&self, ctx: &HookContext, data: Document) -> Result<Document> {
        if wants_default(&data) {
            if let Some(user) = data.get("userId") {
                unset_defaults(ctx.repo(), user, None).await?;
            }
        }
        Ok(data)
    }

    async fn before_update(&self, ctx: &HookContext, existing: &Document, patch: Document) -> Result<Document> {
        if wants_default(&patch) {
            if let Some(user) = existing.get("userId") {
                unset_defaults(ctx.repo(), user, record_id(existing)).await?;
            }
        }
        Ok(patch)
    }
}

async fn owned_address(addresses: &ResourceService, user_id: i64, id: i64) -> Result<Document> {
    let address = addresses.get(id).await?;
    let owned = address.get("userId").is_some_and(|owner| loose_eq(owner, &json!(user_id)));
    if !owned {
        return Err(AppError::Forbidden {
            message: "Not authorized".to_string(),
        });
    }
    Ok(address)
}

pub async fn user_addresses(addresses: &ResourceService, user_id: i64) -> Result<Vec<Document>> {
    addresses
        .repo()
        .find_many(addresses.collection(), &[FilterClause::eq("userId", user_id)])
        .await
}

pub async fn default_address(addresses: &ResourceService, user_id: i64) -> Result<Document> {
    addresses
        .repo()
        .find_one(
            addresses.collection(),
            &[FilterClause::eq("userId", user_id), FilterClause::eq("isDefault", true)],
        )
        .await?
        .ok_or_else(|| AppError::not_found("default address", user_id))
}

/// Make one address the default, clearing the flag on the rest
pub async fn set_default_address(addresses: &ResourceService, user_id: i64, id: i64) -> Result<Document> {
    owned_address(addresses, user_id, id).await?;
    let mut patch = Document::new();
    patch.insert("isDefault".to_string(), json!(true));
    addresses.update(id, patch).await
}

pub async fn delete_address(addresses: &ResourceService, user_id: i64, id: i64) -> Result<Document> {
    owned_address(addresses, user_id, id).await?;
    addresses.delete(id).await
}

/// Delete every address except the default one
pub async fn clear_non_default(addresses: &ResourceService, user_id: i64) -> Result<usize> {
    let mut cleared = 0;
    for address in user_addresses(addresses, user_id).await? {
        if wants_default(&address) {
            continue;
        }
        if let Some(id) = record_id(&address) {
            addresses.repo().delete(addresses.collection(), id).await?;
            cleared += 1;
        }
    }
    tracing::debug!(user_id, cleared, "Non-default addresses cleared");
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{doc, registry};

    fn defaults(list: &[Document]) -> Vec<i64> {
        list.iter().filter(|a| wants_default(a)).filter_map(record_id).collect()
    }

    #[tokio::test]
    async fn test_new_default_replaces_old_one() {
        let registry = registry();
        let addresses = registry.get("addresses").unwrap();

        let created = addresses
            .create(doc(json!({ "userId": 1, "label": "Gym", "address": "77 Pasteur, District 3", "isDefault": true })))
            .await
            .unwrap();
        let id = record_id(&created).unwrap();

        let list = user_addresses(addresses, 1).await.unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(defaults(&list), vec![id]);
        assert_eq!(record_id(&default_address(addresses, 1).await.unwrap()), Some(id));
    }

    #[tokio::test]
    async fn test_set_default_checks_owner() {
        let registry = registry();
        let addresses = registry.get("addresses").unwrap();

        assert!(matches!(set_default_address(addresses, 2, 2).await, Err(AppError::Forbidden { .. })));
        assert!(matches!(set_default_address(addresses, 1, 42).await, Err(AppError::NotFound { .. })));

        let updated = set_default_address(addresses, 1, 2).await.unwrap();
        assert_eq!(updated["isDefault"], true);
        assert_eq!(defaults(&user_addresses(addresses, 1).await.unwrap()), vec![2]);
    }

    #[tokio::test]
    async fn test_default_lookup_and_clearing() {
        let registry = registry();
        let addresses = registry.get("addresses").unwrap();

        assert!(matches!(default_address(addresses, 2).await, Err(AppError::NotFound { .. })));
        assert!(matches!(delete_address(addresses, 2, 1).await, Err(AppError::Forbidden { .. })));

        assert_eq!(clear_non_default(addresses, 1).await.unwrap(), 1);
        let left = user_addresses(addresses, 1).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(record_id(&left[0]), Some(1));

        delete_address(addresses, 1, 1).await.unwrap();
        assert!(user_addresses(addresses, 1).await.unwrap().is_empty());
    }
}
