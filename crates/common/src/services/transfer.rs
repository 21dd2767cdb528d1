//! Bulk import and export of JSON rows

use super::ResourceService;
use crate::db::Document;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::query::{value_key, PageRequest, QueryOptions, ValueKey};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Rows handled between progress log lines
pub const IMPORT_BATCH_SIZE: usize = 100;

/// First data row number, counting a spreadsheet header as row 1
const FIRST_ROW: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row: usize,
    pub data: Document,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
    pub inserted: Vec<Document>,
}

fn row_messages(err: AppError) -> Vec<String> {
    match err {
        AppError::InvalidFields { errors } => errors.into_iter().map(|e| e.message).collect(),
        other => vec![other.to_string()],
    }
}

/// Validate, coerce and insert rows one at a time
///
/// A failing row is reported and skipped; it never aborts the import.
pub async fn import_rows(service: &ResourceService, rows: Vec<Document>) -> Result<ImportReport> {
    if rows.is_empty() {
        return Err(AppError::validation("File is empty"));
    }

    let schema = service.schema().cloned().unwrap_or_default();
    let present: BTreeSet<&str> = rows.iter().flat_map(|row| row.keys().map(String::as_str)).collect();
    let missing: Vec<&str> = schema
        .fields()
        .filter(|(name, rule)| rule.required && rule.default.is_none() && !present.contains(name))
        .map(|(name, _)| name)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation {
            message: format!("Missing required columns: {}", missing.join(", ")),
            field: None,
        });
    }

    let mut report = ImportReport {
        total: rows.len(),
        ..ImportReport::default()
    };

    for (batch_no, batch) in rows.chunks(IMPORT_BATCH_SIZE).enumerate() {
        for (offset, row) in batch.iter().enumerate() {
            let row_no = FIRST_ROW + batch_no * IMPORT_BATCH_SIZE + offset;
            match service.create(schema.coerce_row(row)).await {
                Ok(created) => {
                    report.success += 1;
                    report.inserted.push(created);
                }
                Err(err) => {
                    report.failed += 1;
                    report.errors.push(RowError {
                        row: row_no,
                        data: service.present(row.clone()),
                        errors: row_messages(err)
                            .into_iter()
                            .map(|msg| format!("Row {row_no}: {msg}"))
                            .collect(),
                    });
                }
            }
        }

        tracing::debug!(
            collection = %service.collection(),
            batch = batch_no + 1,
            processed = report.success + report.failed,
            "Import batch processed"
        );
    }

    metrics::record_import(service.collection(), report.success, report.failed);
    tracing::info!(
        collection = %service.collection(),
        total = report.total,
        success = report.success,
        failed = report.failed,
        "Import finished"
    );

    Ok(report)
}

/// Display label of a referenced record
fn label_of(doc: &Document) -> Option<Value> {
    ["name", "title", "code", "email"]
        .iter()
        .find_map(|field| doc.get(*field).filter(|v| !v.is_null()).cloned())
}

/// Every record matching `options`, projected onto `columns`
///
/// Paging is ignored so the whole filtered set is exported. With
/// `include_relations` each foreign key column gains a `<field>_name`
/// column holding the referenced record's label.
pub async fn export_rows(
    service: &ResourceService,
    mut options: QueryOptions,
    columns: Option<Vec<String>>,
    include_relations: bool,
) -> Result<Vec<Document>> {
    options.page = PageRequest::new(1, usize::MAX);
    let records = service.find_all(options).await?.data;

    let schema = service.schema().cloned().unwrap_or_default();
    let columns: Vec<String> = columns.filter(|c| !c.is_empty()).unwrap_or_else(|| {
        std::iter::once("id")
            .chain(schema.fields().map(|(name, _)| name))
            .map(str::to_string)
            .collect()
    });

    let mut labels: HashMap<&str, HashMap<ValueKey, Value>> = HashMap::new();
    if include_relations {
        for (field, target) in schema.foreign_keys() {
            let ids: Vec<Value> = records
                .iter()
                .filter_map(|r| r.get(field).filter(|v| value_key(v).is_some()).cloned())
                .collect();
            if ids.is_empty() {
                continue;
            }
            let names = service
                .repo()
                .find_where_in(target, "id", &ids)
                .await?
                .iter()
                .filter_map(|doc| Some((doc.get("id").and_then(value_key)?, label_of(doc)?)))
                .collect();
            labels.insert(field, names);
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            let mut row = Document::new();
            for column in &columns {
                if service.hidden_fields().contains(column) {
                    continue;
                }
                row.insert(column.clone(), record.get(column).cloned().unwrap_or(Value::Null));
                if let Some(names) = labels.get(column.as_str()) {
                    let label = record
                        .get(column)
                        .and_then(value_key)
                        .and_then(|key| names.get(&key).cloned())
                        .unwrap_or(Value::Null);
                    row.insert(format!("{column}_name"), label);
                }
            }
            row
        })
        .collect();

    Ok(rows)
}

/// Import template: a row describing each column, then a blank row
pub fn template_rows(service: &ResourceService) -> Vec<Document> {
    let schema = service.schema().cloned().unwrap_or_default();

    let describe: Document = schema
        .fields()
        .map(|(name, rule)| (name.to_string(), Value::String(rule.describe())))
        .collect();
    let blank: Document = schema
        .fields()
        .map(|(name, _)| (name.to_string(), Value::String(String::new())))
        .collect();

    vec![describe, blank]
}
