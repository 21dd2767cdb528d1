//! Generic collection query engine
//!
//! One pipeline serves every list endpoint:
//!
//! 1. snapshot the collection
//! 2. full-text search (`q`)
//! 3. field filters (AND)
//! 4. multi-key stable sort
//! 5. pagination metadata over the filtered total
//! 6. slice the requested page
//! 7. attach `_embed` / `_expand` relations to the page only
//!
//! Steps 2 to 6 are pure and work on any [`Record`]; step 7 needs the
//! repository. Fields the relation catalog hides can be neither filtered
//! nor sorted on, and are stripped from every returned document.

mod filter;
mod pagination;
mod params;
mod relations;
mod search;
mod sort;
mod value;

pub use filter::{matches_all, FilterClause, FilterOp};
pub use pagination::{paginate, PageRequest, Pagination, DEFAULT_LIMIT};
pub use params::RESERVED_KEYS;
pub use relations::{Cardinality, RelationDescriptor, RelationRegistry, RelationRequest};
pub use search::matches_search;
pub use sort::{compare_records, parse_sort, sort_records, SortKey, SortOrder};
pub use value::{as_number, loose_eq, parse_timestamp, value_key, ValueKey};

use crate::db::{Document, Repository};
use crate::errors::{AppError, Result};
use crate::metrics;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Anything the pipeline can read fields from
pub trait Record {
    fn field(&self, name: &str) -> Option<&Value>;
}

impl Record for Document {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Record for Value {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Everything a list request can ask for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Vec<FilterClause>,
    pub q: Option<String>,
    pub sort: Vec<SortKey>,
    pub page: PageRequest,
    pub embed: Vec<String>,
    pub expand: Vec<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter from a possibly suffixed key, e.g. `price_gte`
    pub fn filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filter.push(FilterClause::parse(key, value.into()));
        self
    }

    pub fn clause(mut self, clause: FilterClause) -> Self {
        self.filter.push(clause);
        self
    }

    pub fn search(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn paged(mut self, page: usize, limit: usize) -> Self {
        self.page = PageRequest::new(page, limit);
        self
    }

    pub fn embed(mut self, relation: impl Into<String>) -> Self {
        self.embed.push(relation.into());
        self
    }

    pub fn expand(mut self, relation: impl Into<String>) -> Self {
        self.expand.push(relation.into());
        self
    }

    /// Requested relations, embeds first
    pub fn relations(&self) -> Vec<RelationRequest> {
        self.embed
            .iter()
            .map(RelationRequest::embed)
            .chain(self.expand.iter().map(RelationRequest::expand))
            .collect()
    }
}

/// One page of results plus its metadata
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult<R = Document> {
    pub data: Vec<R>,
    pub pagination: Pagination,
}

/// Run the pure part of the pipeline (search, filter, sort, paginate)
pub fn execute<R, S>(records: Vec<R>, options: &QueryOptions, search_fields: &[S]) -> QueryResult<R>
where
    R: Record,
    S: AsRef<str>,
{
    let q = options.q.as_deref().unwrap_or("");
    let mut matched: Vec<R> = records
        .into_iter()
        .filter(|record| matches_search(record, q, search_fields))
        .filter(|record| matches_all(record, &options.filter))
        .collect();

    sort_records(&mut matched, &options.sort);

    let (data, pagination) = paginate(matched, options.page);
    QueryResult { data, pagination }
}

/// Query engine bound to a repository and a relation catalog
#[derive(Clone)]
pub struct QueryEngine {
    repo: Arc<dyn Repository>,
    relations: Arc<RelationRegistry>,
    search_fields: Arc<[String]>,
}

impl QueryEngine {
    pub fn new(repo: Arc<dyn Repository>, relations: RelationRegistry) -> Self {
        Self {
            repo,
            relations: Arc::new(relations),
            search_fields: Arc::from(vec!["name".to_string(), "description".to_string()]),
        }
    }

    pub fn with_search_fields(mut self, fields: Vec<String>) -> Self {
        self.search_fields = Arc::from(fields);
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub fn relations(&self) -> &RelationRegistry {
        &self.relations
    }

    pub fn search_fields(&self) -> &[String] {
        &self.search_fields
    }

    /// Filter, search, sort, paginate and enrich one collection
    pub async fn find_all_advanced(&self, collection: &str, options: &QueryOptions) -> Result<QueryResult> {
        let start = Instant::now();
        let records = self.repo.snapshot(collection).await?;
        self.run(collection, records, options, start).await
    }

    /// Same pipeline over records the caller already holds
    ///
    /// Used when a caller derives extra fields before querying, such as a
    /// computed distance.
    pub async fn find_in(&self, collection: &str, records: Vec<Document>, options: &QueryOptions) -> Result<QueryResult> {
        self.run(collection, records, options, Instant::now()).await
    }

    async fn run(&self, collection: &str, records: Vec<Document>, options: &QueryOptions, start: Instant) -> Result<QueryResult> {
        self.reject_hidden(collection, options)?;

        let search_fields: Vec<&String> = self
            .search_fields
            .iter()
            .filter(|field| !self.relations.is_hidden(collection, field))
            .collect();

        let scanned = records.len();
        let mut result = execute(records, options, &search_fields[..]);
        self.enrich(collection, &mut result.data, &options.relations()).await?;
        for doc in &mut result.data {
            self.relations.strip_hidden(collection, doc);
        }

        let elapsed = start.elapsed();
        metrics::record_query(elapsed.as_secs_f64(), collection, result.pagination.total);
        tracing::debug!(
            collection = %collection,
            scanned,
            matched = result.pagination.total,
            returned = result.data.len(),
            latency_ms = elapsed.as_millis() as u64,
            "Query executed"
        );

        Ok(result)
    }

    /// Hidden fields may not drive filtering or ordering
    fn reject_hidden(&self, collection: &str, options: &QueryOptions) -> Result<()> {
        let filtered = options.filter.iter().map(|clause| (&clause.field, "filter"));
        let sorted = options.sort.iter().map(|key| (&key.field, "sort"));

        for (field, action) in filtered.chain(sorted) {
            if self.relations.is_hidden(collection, field) {
                return Err(AppError::Validation {
                    message: format!("Cannot {action} on field '{field}'"),
                    field: Some(field.clone()),
                });
            }
        }
        Ok(())
    }

    /// Attach relations to already-fetched records
    pub async fn enrich(&self, collection: &str, records: &mut [Document], relations: &[RelationRequest]) -> Result<()> {
        if relations.is_empty() {
            return Ok(());
        }
        self.relations
            .attach(self.repo.as_ref(), collection, records, relations)
            .await
    }

    /// Fetch one record by id with relations attached
    pub async fn find_one_expanded(
        &self,
        collection: &str,
        id: i64,
        relations: &[RelationRequest],
    ) -> Result<Option<Document>> {
        let Some(record) = self.repo.find_by_id(collection, id).await? else {
            return Ok(None);
        };

        let mut records = [record];
        self.enrich(collection, &mut records, relations).await?;
        let [mut record] = records;
        self.relations.strip_hidden(collection, &mut record);
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::JsonRepository;
    use proptest::prelude::*;
    use serde_json::json;

    fn engine() -> QueryEngine {
        let products: Vec<Value> = (1..=25)
            .map(|i| {
                let name = if i % 5 == 0 { format!("Pho dac biet {i}") } else { format!("Com tam {i}") };
                json!({
                    "id": i,
                    "name": name,
                    "price": 10000 + (i % 7) * 5000,
                    "restaurantId": if i % 2 == 0 { 1 } else { 2 },
                })
            })
            .collect();
        let repo = JsonRepository::from_value(
            json!({
                "products": products,
                "restaurants": [{ "id": 1, "name": "Pho 24" }, { "id": 2, "name": "Com Nha" }],
                "users": [
                    { "id": 1, "name": "An", "password": "$argon2id$v=19$m=19456,t=2,p=1$abc" },
                    { "id": 2, "name": "Binh", "password": "$argon2id$v=19$m=19456,t=2,p=1$def" }
                ],
            }),
            &[],
        )
        .unwrap();

        let relations = RelationRegistry::new()
            .with("products", "restaurant", RelationDescriptor::one("restaurants", "restaurantId"))
            .with("restaurants", "products", RelationDescriptor::many("products", "restaurantId"))
            .hide("users", "password");
        QueryEngine::new(Arc::new(repo), relations).with_search_fields(vec!["name".into(), "password".into()])
    }

    #[tokio::test]
    async fn test_second_page_of_unfiltered_collection() {
        let result = engine()
            .find_all_advanced("products", &QueryOptions::new().paged(2, 10))
            .await
            .unwrap();

        let ids: Vec<_> = result.data.iter().map(|d| d["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, (11..=20).collect::<Vec<_>>());
        assert_eq!(result.pagination.total, 25);
        assert_eq!(result.pagination.total_pages, 3);
        assert!(result.pagination.has_next);
        assert!(result.pagination.has_prev);
    }

    #[tokio::test]
    async fn test_search_filter_sort_together() {
        let options = QueryOptions::new()
            .search("PHO")
            .filter("restaurantId", "1")
            .sort_by(SortKey::desc("price"));
        let result = engine().find_all_advanced("products", &options).await.unwrap();

        let ids: Vec<_> = result.data.iter().map(|d| d["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![20, 10]);
        assert_eq!(result.pagination.total, 2);
    }

    #[tokio::test]
    async fn test_expand_only_touches_page() {
        let options = QueryOptions::new().paged(1, 3).expand("restaurant");
        let result = engine().find_all_advanced("products", &options).await.unwrap();

        assert_eq!(result.data.len(), 3);
        assert_eq!(result.data[0]["restaurant"]["name"], "Com Nha");
        assert_eq!(result.data[1]["restaurant"]["name"], "Pho 24");
    }

    #[tokio::test]
    async fn test_find_one_expanded() {
        let engine = engine();
        let record = engine
            .find_one_expanded("restaurants", 1, &[RelationRequest::embed("products")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["products"].as_array().unwrap().len(), 12);

        assert!(engine.find_one_expanded("restaurants", 99, &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_result_still_paginates() {
        let options = QueryOptions::new().filter("price_gte", "1000000");
        let result = engine().find_all_advanced("products", &options).await.unwrap();
        assert!(result.data.is_empty());
        assert_eq!(result.pagination.total_pages, 0);
        assert!(!result.pagination.has_next);
    }

    #[tokio::test]
    async fn test_embed_does_not_resolve_parent_relations() {
        let options = QueryOptions::new().paged(1, 2).embed("restaurant");
        let result = engine().find_all_advanced("products", &options).await.unwrap();
        assert!(result.data.iter().all(|d| !d.contains_key("restaurant")));

        let relations = QueryOptions::new().embed("products").expand("category").relations();
        assert_eq!(
            relations,
            vec![RelationRequest::embed("products"), RelationRequest::expand("category")]
        );
    }

    #[tokio::test]
    async fn test_hidden_fields_cannot_be_queried() {
        let engine = engine();

        let options = QueryOptions::new().filter("password_like", "$argon2id$");
        let err = engine.find_all_advanced("users", &options).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "password"));

        let options = QueryOptions::new().sort_by(SortKey::asc("password"));
        assert!(engine.find_all_advanced("users", &options).await.is_err());

        let searched = engine
            .find_all_advanced("users", &QueryOptions::new().search("argon2"))
            .await
            .unwrap();
        assert_eq!(searched.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_hidden_fields_are_stripped_from_results() {
        let engine = engine();
        let listed = engine.find_all_advanced("users", &QueryOptions::new()).await.unwrap();
        assert_eq!(listed.data.len(), 2);
        assert!(listed.data.iter().all(|u| !u.contains_key("password")));

        let one = engine.find_one_expanded("users", 1, &[]).await.unwrap().unwrap();
        assert_eq!(one["name"], "An");
        assert!(!one.contains_key("password"));
    }

    #[test]
    fn test_execute_over_plain_values() {
        let records = vec![
            json!({ "name": "b", "rank": 2 }),
            json!({ "name": "a", "rank": 1 }),
        ];
        let options = QueryOptions::new().sort_by(SortKey::asc("rank"));
        let result = execute(records, &options, &["name"]);
        assert_eq!(result.data[0]["name"], "a");
    }

    const TAGS: [&str; 3] = ["com", "pho", "bun"];

    fn rows(raw: &[(u8, usize, u8)]) -> Vec<Value> {
        raw.iter()
            .enumerate()
            .map(|(i, (price, tag, rating))| {
                json!({ "id": i + 1, "price": price, "tag": TAGS[*tag], "rating": rating })
            })
            .collect()
    }

    fn ids(records: &[Value]) -> Vec<u64> {
        records.iter().filter_map(|r| r["id"].as_u64()).collect()
    }

    fn unpaged() -> QueryOptions {
        QueryOptions::new().paged(1, 10_000)
    }

    proptest! {
        #[test]
        fn prop_and_filter_is_intersection_of_clauses(
            raw in prop::collection::vec((0u8..20, 0usize..3, 0u8..6), 0..60),
            min_price in 0u8..20,
            tag in 0usize..3,
        ) {
            let records = rows(&raw);
            let by_price = unpaged().filter("price_gte", min_price);
            let by_tag = unpaged().filter("tag", TAGS[tag]);
            let both = unpaged().filter("price_gte", min_price).filter("tag", TAGS[tag]);

            let price_ids = ids(&execute(records.clone(), &by_price, &["tag"]).data);
            let tag_ids = ids(&execute(records.clone(), &by_tag, &["tag"]).data);
            let expected: Vec<u64> = price_ids.into_iter().filter(|id| tag_ids.contains(id)).collect();

            prop_assert_eq!(ids(&execute(records, &both, &["tag"]).data), expected);
        }

        #[test]
        fn prop_sort_keeps_input_order_for_equal_keys(
            raw in prop::collection::vec((0u8..20, 0usize..3, 0u8..4), 0..60),
        ) {
            let options = unpaged().sort_by(SortKey::asc("rating"));
            let sorted = execute(rows(&raw), &options, &["tag"]).data;

            prop_assert_eq!(sorted.len(), raw.len());
            for pair in sorted.windows(2) {
                let (left, right) = (pair[0]["rating"].as_u64(), pair[1]["rating"].as_u64());
                prop_assert!(left <= right);
                if left == right {
                    prop_assert!(pair[0]["id"].as_u64() < pair[1]["id"].as_u64());
                }
            }
        }

        #[test]
        fn prop_query_is_idempotent(
            raw in prop::collection::vec((0u8..20, 0usize..3, 0u8..6), 0..60),
            max_price in 0u8..20,
            descending in any::<bool>(),
        ) {
            let key = if descending { SortKey::desc("price") } else { SortKey::asc("price") };
            let options = unpaged()
                .filter("price_lte", max_price)
                .sort_by(key)
                .sort_by(SortKey::asc("tag"));

            let once = execute(rows(&raw), &options, &["tag"]).data;
            let twice = execute(once.clone(), &options, &["tag"]).data;
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_pages_rebuild_the_full_result(
            raw in prop::collection::vec((0u8..20, 0usize..3, 0u8..6), 0..60),
            limit in 1usize..8,
            tag in 0usize..3,
        ) {
            let records = rows(&raw);
            let full = execute(
                records.clone(),
                &unpaged().filter("tag_ne", TAGS[tag]).sort_by(SortKey::desc("rating")),
                &["tag"],
            );

            let mut rebuilt = Vec::new();
            for page in 1..=full.pagination.total.div_ceil(limit) {
                let options = QueryOptions::new()
                    .filter("tag_ne", TAGS[tag])
                    .sort_by(SortKey::desc("rating"))
                    .paged(page, limit);
                let result = execute(records.clone(), &options, &["tag"]);
                prop_assert!(result.data.len() <= limit);
                rebuilt.extend(result.data);
            }

            prop_assert_eq!(full.pagination.total, full.data.len());
            prop_assert_eq!(ids(&rebuilt), ids(&full.data));
        }
    }
}
