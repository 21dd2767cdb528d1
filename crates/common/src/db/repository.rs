//! JSON document repository
//!
//! Holds every collection in memory behind a single read-write lock and,
//! when a data file is configured, writes the whole database back to it
//! after each mutation (json-server layout: `{ "<collection>": [ ... ] }`).
//!
//! Writers queue on one mutex for the whole mutate-then-persist sequence.
//! A mutation whose file write fails is undone before the error returns.

use crate::config::StoreConfig;
use crate::db::{record_id, Document, Repository, ID_FIELD};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::query::{as_number, value_key, FilterClause, ValueKey};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

type Collections = BTreeMap<String, Vec<Document>>;

/// How to reverse a mutation that could not be persisted
enum Undo {
    Insert { id: i64 },
    Update { id: i64, previous: Document },
    Delete { index: usize, removed: Document },
}

impl Undo {
    fn apply(self, docs: &mut Vec<Document>) {
        match self {
            Undo::Insert { id } => docs.retain(|doc| record_id(doc) != Some(id)),
            Undo::Update { id, previous } => {
                if let Some(doc) = docs.iter_mut().find(|doc| record_id(doc) == Some(id)) {
                    *doc = previous;
                }
            }
            Undo::Delete { index, removed } => {
                let index = index.min(docs.len());
                docs.insert(index, removed);
            }
        }
    }
}

/// In-process document store with optional file persistence
pub struct JsonRepository {
    collections: RwLock<Collections>,
    path: Option<PathBuf>,
    persist_on_write: bool,
    write_lock: Mutex<()>,
}

impl JsonRepository {
    /// Create an empty, memory-only repository with the given collections
    pub fn in_memory<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections = names
            .into_iter()
            .map(|name| (name.into(), Vec::new()))
            .collect();

        Self {
            collections: RwLock::new(collections),
            path: None,
            persist_on_write: false,
            write_lock: Mutex::new(()),
        }
    }

    /// Build a memory-only repository from a json-server style value
    ///
    /// Collections named in `names` but absent from `value` start empty.
    pub fn from_value(value: Value, names: &[&str]) -> Result<Self> {
        let mut collections = parse_database(value)?;
        for name in names {
            collections.entry((*name).to_string()).or_default();
        }

        Ok(Self {
            collections: RwLock::new(collections),
            path: None,
            persist_on_write: false,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the repository described by `config`
    ///
    /// A configured but missing file is created on the first write.
    pub async fn open(config: &StoreConfig, names: &[&str]) -> Result<Self> {
        let Some(path) = config.data_file.clone() else {
            tracing::info!("No data file configured, using in-memory store");
            return Ok(Self::in_memory(names.iter().copied()));
        };

        let mut repo = if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read_to_string(&path).await?;
            let value: Value = serde_json::from_str(&raw)?;
            Self::from_value(value, names)?
        } else {
            tracing::warn!(path = %path.display(), "Data file not found, starting empty");
            Self::in_memory(names.iter().copied())
        };

        repo.path = Some(path);
        repo.persist_on_write = config.persist_on_write;

        let counts = repo.counts().await;
        tracing::info!(collections = ?counts, "Document store loaded");

        Ok(repo)
    }

    /// Record count per collection
    pub async fn counts(&self) -> BTreeMap<String, usize> {
        self.collections
            .read()
            .await
            .iter()
            .map(|(name, docs)| (name.clone(), docs.len()))
            .collect()
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the whole database to the backing file
    pub async fn flush(&self) -> Result<()> {
        let _writer = self.write_lock.lock().await;
        self.persist().await
    }

    /// Caller must hold `write_lock`
    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let body = {
            let collections = self.collections.read().await;
            serde_json::to_string_pretty(&*collections)?
        };

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::debug!(path = %path.display(), "Document store flushed");
        Ok(())
    }

    /// Persist a mutation already applied in memory, undoing it on failure
    ///
    /// Caller must hold `write_lock`.
    async fn commit(&self, collection: &str, op: &str, undo: Undo) -> Result<()> {
        if self.persist_on_write {
            if let Err(err) = self.persist().await {
                tracing::error!(collection = %collection, op, error = %err, "Write not persisted, rolling back");
                let mut collections = self.collections.write().await;
                if let Some(docs) = collections.get_mut(collection) {
                    undo.apply(docs);
                }
                return Err(err);
            }
        }

        metrics::record_store_write(collection, op);
        Ok(())
    }
}

fn parse_database(value: Value) -> Result<Collections> {
    let Value::Object(root) = value else {
        return Err(AppError::Configuration {
            message: "database file must contain a JSON object".to_string(),
        });
    };

    let mut collections = Collections::new();
    for (name, entries) in root {
        let Value::Array(items) = entries else {
            tracing::warn!(collection = %name, "Skipping non-array collection");
            continue;
        };

        let docs = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(doc) => Some(doc),
                _ => None,
            })
            .collect();
        collections.insert(name, docs);
    }

    Ok(collections)
}

fn collection<'a>(collections: &'a Collections, name: &str) -> Result<&'a Vec<Document>> {
    collections
        .get(name)
        .ok_or_else(|| AppError::UnknownCollection { name: name.to_string() })
}

fn collection_mut<'a>(collections: &'a mut Collections, name: &str) -> Result<&'a mut Vec<Document>> {
    collections
        .get_mut(name)
        .ok_or_else(|| AppError::UnknownCollection { name: name.to_string() })
}

#[async_trait]
impl Repository for JsonRepository {
    async fn collections(&self) -> Vec<String> {
        self.collections.read().await.keys().cloned().collect()
    }

    async fn snapshot(&self, name: &str) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collection(&collections, name)?.clone())
    }

    async fn find_by_id(&self, name: &str, id: i64) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collection(&collections, name)?
            .iter()
            .find(|doc| record_id(doc) == Some(id))
            .cloned())
    }

    async fn find_where_in(&self, name: &str, field: &str, values: &[Value]) -> Result<Vec<Document>> {
        let wanted: HashSet<ValueKey> = values.iter().filter_map(value_key).collect();
        let collections = self.collections.read().await;
        let docs = collection(&collections, name)?;

        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        Ok(docs
            .iter()
            .filter(|doc| {
                doc.get(field)
                    .and_then(value_key)
                    .is_some_and(|key| wanted.contains(&key))
            })
            .cloned()
            .collect())
    }

    async fn find_many(&self, name: &str, clauses: &[FilterClause]) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collection(&collections, name)?
            .iter()
            .filter(|doc| clauses.iter().all(|clause| clause.matches(*doc)))
            .cloned()
            .collect())
    }

    async fn insert(&self, name: &str, mut doc: Document) -> Result<Document> {
        let _writer = self.write_lock.lock().await;
        let (id, created) = {
            let mut collections = self.collections.write().await;
            let docs = collection_mut(&mut collections, name)?;

            let next_id = docs.iter().filter_map(record_id).max().unwrap_or(0) + 1;
            doc.remove(ID_FIELD);

            let mut record = Document::new();
            record.insert(ID_FIELD.to_string(), Value::from(next_id));
            record.extend(doc);

            docs.push(record.clone());
            (next_id, record)
        };

        self.commit(name, "insert", Undo::Insert { id }).await?;
        tracing::debug!(collection = %name, id, "Inserted document");
        Ok(created)
    }

    async fn update(&self, name: &str, id: i64, patch: Document) -> Result<Option<Document>> {
        let _writer = self.write_lock.lock().await;
        let changed = {
            let mut collections = self.collections.write().await;
            let docs = collection_mut(&mut collections, name)?;

            docs.iter_mut().find(|doc| record_id(doc) == Some(id)).map(|doc| {
                let previous = doc.clone();
                for (key, value) in patch {
                    if key != ID_FIELD {
                        doc.insert(key, value);
                    }
                }
                (previous, doc.clone())
            })
        };

        let Some((previous, updated)) = changed else {
            return Ok(None);
        };
        self.commit(name, "update", Undo::Update { id, previous }).await?;
        Ok(Some(updated))
    }

    async fn increment(&self, name: &str, id: i64, field: &str, by: f64) -> Result<Option<Document>> {
        let _writer = self.write_lock.lock().await;
        let changed = {
            let mut collections = self.collections.write().await;
            let docs = collection_mut(&mut collections, name)?;

            docs.iter_mut().find(|doc| record_id(doc) == Some(id)).map(|doc| {
                let previous = doc.clone();
                let current = doc.get(field).and_then(as_number).unwrap_or(0.0);
                let next = current + by;
                let value = if next.fract() == 0.0 && next.abs() < i64::MAX as f64 {
                    Value::from(next as i64)
                } else {
                    Value::from(next)
                };
                doc.insert(field.to_string(), value);
                (previous, doc.clone())
            })
        };

        let Some((previous, updated)) = changed else {
            return Ok(None);
        };
        self.commit(name, "increment", Undo::Update { id, previous }).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, name: &str, id: i64) -> Result<Option<Document>> {
        let _writer = self.write_lock.lock().await;
        let removed = {
            let mut collections = self.collections.write().await;
            let docs = collection_mut(&mut collections, name)?;

            docs.iter()
                .position(|doc| record_id(doc) == Some(id))
                .map(|index| (index, docs.remove(index)))
        };

        let Some((index, removed)) = removed else {
            return Ok(None);
        };
        self.commit(name, "delete", Undo::Delete { index, removed: removed.clone() }).await?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterOp;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> JsonRepository {
        JsonRepository::from_value(
            json!({
                "products": [
                    { "id": 1, "name": "Pho", "restaurantId": 1 },
                    { "id": 4, "name": "Banh mi", "restaurantId": 2 },
                    { "id": 2, "name": "Com tam", "restaurantId": "1" }
                ]
            }),
            &["products", "reviews"],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_max_plus_one_and_ignores_caller_id() {
        let repo = seeded();
        let created = repo
            .insert("products", doc(json!({ "id": 99, "name": "Bun cha" })))
            .await
            .unwrap();

        assert_eq!(created["id"], 5);
        assert_eq!(created.keys().next().map(String::as_str), Some("id"));

        let empty = repo.insert("reviews", doc(json!({ "rating": 5 }))).await.unwrap();
        assert_eq!(empty["id"], 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_keeps_id() {
        let repo = seeded();
        let updated = repo
            .update("products", 4, doc(json!({ "id": 100, "price": 25000 })))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated["id"], 4);
        assert_eq!(updated["name"], "Banh mi");
        assert_eq!(updated["price"], 25000);

        assert!(repo.update("products", 42, Document::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_returns_removed_record() {
        let repo = seeded();
        let removed = repo.delete("products", 1).await.unwrap().unwrap();
        assert_eq!(removed["name"], "Pho");
        assert!(repo.find_by_id("products", 1).await.unwrap().is_none());
        assert!(repo.delete("products", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_where_in_matches_loosely() {
        let repo = seeded();
        let found = repo
            .find_where_in("products", "restaurantId", &[json!(1)])
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(repo.find_where_in("products", "restaurantId", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_many_and_find_one() {
        let repo = seeded();
        let clause = FilterClause::new("name", FilterOp::Like, json!("BAN"));
        let found = repo.find_many("products", &[clause.clone()]).await.unwrap();
        assert_eq!(found.len(), 1);

        let one = repo.find_one("products", &[clause]).await.unwrap().unwrap();
        assert_eq!(one["id"], 4);
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let repo = seeded();
        let err = repo.snapshot("widgets").await.unwrap_err();
        assert!(matches!(err, AppError::UnknownCollection { .. }));
    }

    #[tokio::test]
    async fn test_open_and_flush_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("funfood-store-{}.json", std::process::id()));
        let config = StoreConfig {
            data_file: Some(path.clone()),
            persist_on_write: true,
        };

        let repo = JsonRepository::open(&config, &["categories"]).await.unwrap();
        repo.insert("categories", doc(json!({ "name": "Drinks" }))).await.unwrap();

        let reopened = JsonRepository::open(&config, &["categories"]).await.unwrap();
        let docs = reopened.snapshot("categories").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["name"], "Drinks");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_every_write() {
        let missing_dir = std::env::temp_dir().join(format!("funfood-missing-{}", std::process::id()));
        let mut repo = seeded();
        repo.path = Some(missing_dir.join("db.json"));
        repo.persist_on_write = true;

        let err = repo.insert("products", doc(json!({ "name": "Bun cha" }))).await.unwrap_err();
        assert!(matches!(err, AppError::Storage { .. }));
        assert_eq!(repo.snapshot("products").await.unwrap().len(), 3);

        assert!(repo.update("products", 4, doc(json!({ "price": 25000 }))).await.is_err());
        let unchanged = repo.find_by_id("products", 4).await.unwrap().unwrap();
        assert!(!unchanged.contains_key("price"));

        assert!(repo.increment("products", 4, "sold", 1.0).await.is_err());
        assert!(!repo.find_by_id("products", 4).await.unwrap().unwrap().contains_key("sold"));

        assert!(repo.delete("products", 1).await.is_err());
        let ids: Vec<_> = repo
            .snapshot("products")
            .await
            .unwrap()
            .iter()
            .filter_map(record_id)
            .collect();
        assert_eq!(ids, vec![1, 4, 2]);
    }

    #[tokio::test]
    async fn test_increment_is_not_lost_under_concurrency() {
        let repo = std::sync::Arc::new(
            JsonRepository::from_value(json!({ "promotions": [{ "id": 1, "usageCount": 3 }] }), &[]).unwrap(),
        );

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.increment("promotions", 1, "usageCount", 1.0).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let promotion = repo.find_by_id("promotions", 1).await.unwrap().unwrap();
        assert_eq!(promotion["usageCount"], 23);
        assert!(repo.increment("promotions", 9, "usageCount", 1.0).await.unwrap().is_none());
    }

    #[test]
    fn test_snapshot_is_a_detached_copy() {
        let repo = seeded();
        tokio_test::block_on(async {
            let mut copy = repo.snapshot("products").await.unwrap();
            copy[0].insert("name".to_string(), json!("changed"));
            copy.clear();

            let fresh = repo.snapshot("products").await.unwrap();
            assert_eq!(fresh.len(), 3);
            assert_eq!(fresh[0]["name"], "Pho");
        });
    }

    #[test]
    fn test_rejects_non_object_database() {
        assert!(JsonRepository::from_value(json!([1, 2]), &[]).is_err());
    }
}
