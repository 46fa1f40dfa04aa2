use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::error_json;
use crate::jalali::{offset_from_minutes, JalaliDate};
use crate::registry::{self, format_file_size, AnalysisStatus, FileQuery};
use crate::state::AppState;

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> impl IntoResponse {
    let offset = offset_from_minutes(state.config.calendar_utc_offset_minutes);
    let files = {
        let registry = state.registry.read().await;
        registry::apply(registry.records(), &query, &state.catalog, offset)
    };

    let rows: Vec<serde_json::Value> = files
        .iter()
        .map(|f| {
            serde_json::json!({
                "file": f,
                "company_name": state.catalog.company_name(&f.company_id),
                "size_label": format_file_size(f.size),
                "uploaded_on": JalaliDate::from_timestamp(&f.uploaded_at, offset)
                    .map(|d| d.to_string()),
            })
        })
        .collect();

    Json(serde_json::json!({
        "filter": query,
        "count": rows.len(),
        "files": rows,
    }))
}

pub async fn refresh_files(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.api.list_files().await {
        Ok(records) => {
            let count = records.len();
            state.registry.write().await.replace_all(records);
            tracing::info!("Registry refreshed with {} files", count);
            Json(serde_json::json!({ "status": "ok", "count": count })).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to list files from backend: {}", e);
            error_json(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

#[derive(Deserialize)]
pub struct StatusEvent {
    status: AnalysisStatus,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Status transitions pushed by the analysis backend.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    Json(event): Json<StatusEvent>,
) -> impl IntoResponse {
    let applied = state
        .registry
        .write()
        .await
        .apply_status(&file_id, event.status, event.result);

    if applied {
        Json(serde_json::json!({ "status": "ok" })).into_response()
    } else {
        error_json(StatusCode::NOT_FOUND, format!("Unknown file: {}", file_id))
    }
}
