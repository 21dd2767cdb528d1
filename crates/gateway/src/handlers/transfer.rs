//! Import, export and template endpoints

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Serialize;
use serde_json::Value;

use super::{into_document, query_options, ItemResponse, Resource};
use crate::AppState;
use funfood_common::{
    errors::{AppError, Result},
    services::{export_rows, import_rows, template_rows, ImportReport},
    Document,
};

/// Rows arrive either as a bare array or as `{ "rows": [...] }`
fn rows_from_body(body: Value) -> Result<Vec<Document>> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => return Err(AppError::validation("Request body must contain a rows array")),
        },
        _ => return Err(AppError::validation("Request body must be an array of rows")),
    };
    rows.into_iter().map(into_document).collect()
}

/// POST /import
pub async fn import(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Json(body): Json<Value>,
) -> Result<Json<ItemResponse<ImportReport>>> {
    let service = state.services.get(name)?;
    let report = import_rows(service, rows_from_body(body)?).await?;
    let message = format!(
        "Import completed: {} succeeded, {} failed",
        report.success, report.failed
    );
    Ok(Json(ItemResponse::with_message(report, message)))
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Document>,
}

/// GET /export?columns=a,b&includeRelations=true plus any list filters
pub async fn export(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ExportResponse>> {
    let service = state.services.get(name)?;

    let columns = pairs
        .iter()
        .find(|(key, _)| key == "columns")
        .map(|(_, value)| {
            value
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
    let include_relations = pairs
        .iter()
        .any(|(key, value)| key == "includeRelations" && matches!(value.as_str(), "true" | "1"));

    let options = query_options(&state, pairs, &["columns", "includeRelations"]);
    let data = export_rows(service, options, columns, include_relations).await?;

    Ok(Json(ExportResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// GET /template
pub async fn template(
    State(state): State<AppState>,
    Extension(Resource(name)): Extension<Resource>,
) -> Result<Json<ItemResponse<Vec<Document>>>> {
    let service = state.services.get(name)?;
    Ok(Json(ItemResponse::new(template_rows(service))))
}
