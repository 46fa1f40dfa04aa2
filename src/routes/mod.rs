mod drafts;
mod files;

pub use drafts::*;
pub use files::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::state::{AppState, DraftSession};
use crate::wizard::WizardError;

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "message": message.into()
        })),
    )
        .into_response()
}

fn wizard_error(e: WizardError) -> Response {
    let status = match e {
        WizardError::WrongStep(_) => StatusCode::CONFLICT,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_json(status, e.to_string())
}

async fn find_session(state: &AppState, id: &str) -> Result<Arc<DraftSession>, Response> {
    state
        .session(id)
        .await
        .ok_or_else(|| error_json(StatusCode::NOT_FOUND, "Draft not found."))
}
