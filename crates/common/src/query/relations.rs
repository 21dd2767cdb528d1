//! Relation catalog and batched enrichment
//!
//! A relation names a related collection and the pair of fields that join
//! it to the source record. Enrichment issues one batched lookup per
//! relation for a whole page of records, never one lookup per record.
//!
//! The catalog also knows which fields of a collection must never leave
//! the engine, so attached documents are stripped the same way as the
//! records a query returns.

use super::value::{value_key, ValueKey};
use crate::db::{Document, Repository, ID_FIELD};
use crate::errors::Result;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// How many related records a relation attaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Attach an array (`[]` when nothing matches)
    Many,
    /// Attach a single object (`null` when nothing matches)
    One,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub target: String,
    pub local_field: String,
    pub foreign_field: String,
    pub cardinality: Cardinality,
}

impl RelationDescriptor {
    /// Children of the source: `target.foreign_field == source.id`
    pub fn many(target: impl Into<String>, foreign_field: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            local_field: ID_FIELD.to_string(),
            foreign_field: foreign_field.into(),
            cardinality: Cardinality::Many,
        }
    }

    /// Parent of the source: `target.id == source.local_field`
    pub fn one(target: impl Into<String>, local_field: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            local_field: local_field.into(),
            foreign_field: ID_FIELD.to_string(),
            cardinality: Cardinality::One,
        }
    }
}

/// One relation asked for by a caller
///
/// `_embed` names resolve only against [`Cardinality::Many`] relations and
/// `_expand` names only against [`Cardinality::One`] relations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationRequest {
    pub name: String,
    pub cardinality: Cardinality,
}

impl RelationRequest {
    /// Children, as requested by `_embed`
    pub fn embed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::Many,
        }
    }

    /// Parent, as requested by `_expand`
    pub fn expand(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::One,
        }
    }
}

/// Relations available per source collection, keyed by relation name
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    by_source: HashMap<String, HashMap<String, RelationDescriptor>>,
    hidden: HashMap<String, Vec<String>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(mut self, source: &str, name: &str, descriptor: RelationDescriptor) -> Self {
        self.register(source, name, descriptor);
        self
    }

    pub fn register(&mut self, source: &str, name: &str, descriptor: RelationDescriptor) {
        self.by_source
            .entry(source.to_string())
            .or_default()
            .insert(name.to_string(), descriptor);
    }

    pub fn get(&self, source: &str, name: &str) -> Option<&RelationDescriptor> {
        self.by_source.get(source)?.get(name)
    }

    /// Mark a field of `collection` as never returned
    pub fn hide(mut self, collection: &str, field: &str) -> Self {
        let fields = self.hidden.entry(collection.to_string()).or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
        self
    }

    /// Hidden fields of a collection
    pub fn hidden(&self, collection: &str) -> &[String] {
        self.hidden.get(collection).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_hidden(&self, collection: &str, field: &str) -> bool {
        self.hidden(collection).iter().any(|f| f == field)
    }

    /// Remove the hidden fields of `collection` from `doc`
    pub fn strip_hidden(&self, collection: &str, doc: &mut Document) {
        for field in self.hidden(collection) {
            doc.remove(field);
        }
    }

    /// Names of the relations registered for a collection, sorted
    pub fn names(&self, source: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_source
            .get(source)
            .map(|relations| relations.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Attach the requested relations to every record of `records`
    ///
    /// Names unknown for `source`, or registered with the other
    /// cardinality, are ignored. Each relation costs one `find_where_in`
    /// call regardless of how many records are enriched.
    pub async fn attach(
        &self,
        repo: &dyn Repository,
        source: &str,
        records: &mut [Document],
        requests: &[RelationRequest],
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let relations: Vec<(&str, &RelationDescriptor)> = requests
            .iter()
            .filter_map(|request| match self.get(source, &request.name) {
                Some(descriptor) if descriptor.cardinality == request.cardinality => {
                    Some((request.name.as_str(), descriptor))
                }
                _ => {
                    tracing::debug!(
                        collection = %source,
                        relation = %request.name,
                        cardinality = ?request.cardinality,
                        "Ignoring unknown relation"
                    );
                    None
                }
            })
            .filter(|(name, _)| seen.insert(*name))
            .collect();

        if relations.is_empty() || records.is_empty() {
            return Ok(());
        }

        let view: &[Document] = records;
        let lookups = relations.iter().map(|(_, descriptor)| {
            let keys = distinct_values(view, &descriptor.local_field);
            async move {
                repo.find_where_in(&descriptor.target, &descriptor.foreign_field, &keys)
                    .await
            }
        });
        let fetched = try_join_all(lookups).await?;

        for ((name, descriptor), mut related) in relations.into_iter().zip(fetched) {
            for doc in &mut related {
                self.strip_hidden(&descriptor.target, doc);
            }
            let grouped = group_by_field(related, &descriptor.foreign_field);

            for record in records.iter_mut() {
                let matches = record
                    .get(&descriptor.local_field)
                    .and_then(value_key)
                    .and_then(|key| grouped.get(&key));

                let attached = match descriptor.cardinality {
                    Cardinality::Many => Value::Array(
                        matches
                            .map(|docs| docs.iter().cloned().map(Value::Object).collect())
                            .unwrap_or_default(),
                    ),
                    Cardinality::One => matches
                        .and_then(|docs| docs.first())
                        .cloned()
                        .map(Value::Object)
                        .unwrap_or(Value::Null),
                };
                record.insert(name.to_string(), attached);
            }
        }

        Ok(())
    }
}

fn distinct_values(records: &[Document], field: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record.get(field))
        .filter(|value| value_key(value).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

fn group_by_field(docs: Vec<Document>, field: &str) -> HashMap<ValueKey, Vec<Document>> {
    let mut grouped: HashMap<ValueKey, Vec<Document>> = HashMap::new();
    for doc in docs {
        if let Some(key) = doc.get(field).and_then(value_key) {
            grouped.entry(key).or_default().push(doc);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{JsonRepository, Repository};
    use crate::errors::AppError;
    use crate::query::FilterClause;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Repository wrapper that counts batched lookups
    struct CountingRepo {
        inner: JsonRepository,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl Repository for CountingRepo {
        async fn collections(&self) -> Vec<String> {
            self.inner.collections().await
        }
        async fn snapshot(&self, c: &str) -> Result<Vec<Document>> {
            self.inner.snapshot(c).await
        }
        async fn find_by_id(&self, c: &str, id: i64) -> Result<Option<Document>> {
            self.inner.find_by_id(c, id).await
        }
        async fn find_where_in(&self, c: &str, f: &str, v: &[Value]) -> Result<Vec<Document>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_where_in(c, f, v).await
        }
        async fn find_many(&self, c: &str, clauses: &[FilterClause]) -> Result<Vec<Document>> {
            self.inner.find_many(c, clauses).await
        }
        async fn insert(&self, c: &str, doc: Document) -> Result<Document> {
            self.inner.insert(c, doc).await
        }
        async fn update(&self, c: &str, id: i64, patch: Document) -> Result<Option<Document>> {
            self.inner.update(c, id, patch).await
        }
        async fn delete(&self, c: &str, id: i64) -> Result<Option<Document>> {
            self.inner.delete(c, id).await
        }
        async fn increment(&self, c: &str, id: i64, f: &str, by: f64) -> Result<Option<Document>> {
            self.inner.increment(c, id, f, by).await
        }
    }

    fn repo() -> CountingRepo {
        let inner = JsonRepository::from_value(
            json!({
                "restaurants": [
                    { "id": 1, "name": "Pho 24" },
                    { "id": 2, "name": "Com Nha" }
                ],
                "products": [
                    { "id": 1, "name": "Pho Bo", "restaurantId": 1 },
                    { "id": 2, "name": "Pho Ga", "restaurantId": 1 },
                    { "id": 3, "name": "Com Suon", "restaurantId": 2 }
                ],
                "users": [
                    { "id": 1, "name": "An", "password": "$argon2id$v=19$secret" }
                ],
                "reviews": [
                    { "id": 1, "userId": 1, "restaurantId": 1, "rating": 5 }
                ]
            }),
            &[],
        )
        .unwrap();
        CountingRepo {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    fn registry() -> RelationRegistry {
        RelationRegistry::new()
            .with("restaurants", "products", RelationDescriptor::many("products", "restaurantId"))
            .with("products", "restaurant", RelationDescriptor::one("restaurants", "restaurantId"))
            .with("products", "broken", RelationDescriptor::one("widgets", "widgetId"))
            .with("reviews", "user", RelationDescriptor::one("users", "userId"))
            .with("users", "reviews", RelationDescriptor::many("reviews", "userId"))
            .hide("users", "password")
    }

    #[tokio::test]
    async fn test_embed_children_with_one_lookup() {
        let repo = repo();
        let mut records = repo.snapshot("restaurants").await.unwrap();
        registry()
            .attach(&repo, "restaurants", &mut records, &[RelationRequest::embed("products")])
            .await
            .unwrap();

        assert_eq!(records[0]["products"].as_array().unwrap().len(), 2);
        assert_eq!(records[1]["products"][0]["name"], "Com Suon");
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expand_parent_and_missing_parent() {
        let repo = repo();
        let mut records = repo.snapshot("products").await.unwrap();
        records.push(json!({ "id": 9, "name": "Orphan" }).as_object().cloned().unwrap());

        registry()
            .attach(&repo, "products", &mut records, &[RelationRequest::expand("restaurant")])
            .await
            .unwrap();

        assert_eq!(records[0]["restaurant"]["name"], "Pho 24");
        assert_eq!(records[2]["restaurant"]["id"], 2);
        assert_eq!(records[3]["restaurant"], Value::Null);
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_relation_is_ignored() {
        let repo = repo();
        let mut records = repo.snapshot("products").await.unwrap();
        registry()
            .attach(&repo, "products", &mut records, &[RelationRequest::expand("nonexistent")])
            .await
            .unwrap();

        assert!(!records[0].contains_key("nonexistent"));
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_target_collection_is_an_error() {
        let repo = repo();
        let mut records = repo.snapshot("products").await.unwrap();
        let err = registry()
            .attach(&repo, "products", &mut records, &[RelationRequest::expand("broken")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownCollection { .. }));
    }

    #[tokio::test]
    async fn test_embed_and_expand_only_match_their_own_kind() {
        let repo = repo();
        let mut products = repo.snapshot("products").await.unwrap();
        registry()
            .attach(&repo, "products", &mut products, &[RelationRequest::embed("restaurant")])
            .await
            .unwrap();
        assert!(!products[0].contains_key("restaurant"));

        let mut restaurants = repo.snapshot("restaurants").await.unwrap();
        registry()
            .attach(&repo, "restaurants", &mut restaurants, &[RelationRequest::expand("products")])
            .await
            .unwrap();
        assert!(!restaurants[0].contains_key("products"));
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 0);

        let requests = [RelationRequest::embed("restaurant"), RelationRequest::expand("restaurant")];
        registry()
            .attach(&repo, "products", &mut products, &requests)
            .await
            .unwrap();
        assert!(products[0]["restaurant"].is_object());
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attached_documents_lose_hidden_fields() {
        let repo = repo();
        let mut reviews = repo.snapshot("reviews").await.unwrap();
        registry()
            .attach(&repo, "reviews", &mut reviews, &[RelationRequest::expand("user")])
            .await
            .unwrap();

        assert_eq!(reviews[0]["user"]["name"], "An");
        assert!(reviews[0]["user"].get("password").is_none());
    }

    #[test]
    fn test_hidden_fields_per_collection() {
        let registry = registry().hide("users", "password");
        assert_eq!(registry.hidden("users").to_vec(), vec!["password".to_string()]);
        assert!(registry.is_hidden("users", "password"));
        assert!(!registry.is_hidden("products", "password"));
        assert!(registry.hidden("orders").is_empty());
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = registry();
        assert_eq!(registry.names("products"), vec!["broken", "restaurant"]);
        assert!(registry.names("orders").is_empty());
    }
}
