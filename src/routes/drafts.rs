use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{error_json, find_session, wizard_error};
use crate::registry::{AnalysisStatus, FileRecord};
use crate::state::{AppState, DraftSession};
use crate::upload::{SubmissionResult, UploadOrchestrator};
use crate::wizard::{
    Attachment, Attachments, FileBundle, Slot, SubmitError, Transition, Unmet, WizardController,
};

/// One row per year slot of a multi-year draft, in list order.
fn year_overview(wizard: &WizardController) -> Vec<serde_json::Value> {
    let Some(Attachments::MultiYear(years)) = wizard.draft().map(|d| &d.attachments) else {
        return Vec::new();
    };
    years
        .labels()
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let bundle = years.bundle(label);
            serde_json::json!({
                "index": index,
                "label": label,
                "ready": bundle.is_some_and(FileBundle::is_ready),
                "files": bundle.map_or(0, |b| b.filled().count()),
            })
        })
        .collect()
}

fn draft_view(wizard: &WizardController) -> serde_json::Value {
    let result = wizard.result();
    serde_json::json!({
        "step": wizard.step(),
        "company_id": wizard.company_id(),
        "report_type_id": wizard.report_type_id(),
        "draft": wizard.draft(),
        "years": year_overview(wizard),
        "field_errors": wizard.field_errors(),
        "result": result,
        "result_kind": result.map(SubmissionResult::kind),
        "summary": result.map(SubmissionResult::summary),
    })
}

fn transition_json(transition: Transition, wizard: &WizardController) -> Response {
    let status = match transition {
        Transition::Moved { .. } => StatusCode::OK,
        Transition::Refused { .. } => StatusCode::CONFLICT,
    };
    (
        status,
        Json(serde_json::json!({
            "transition": transition,
            "view": draft_view(wizard),
        })),
    )
        .into_response()
}

pub async fn catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.catalog.as_ref().clone())
}

pub async fn create_draft(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (id, session) = state.open_session().await;
    let wizard = session.wizard.lock().await;
    tracing::info!(draft_id = %id, "Draft opened");
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "draft_id": id,
            "view": draft_view(&wizard),
        })),
    )
}

pub async fn view_draft(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let wizard = session.wizard.lock().await;
    Json(draft_view(&wizard)).into_response()
}

pub async fn view_progress(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let progress = session.progress.read().await;
    Json(serde_json::json!({ "progress": *progress })).into_response()
}

#[derive(Deserialize)]
pub struct SelectionForm {
    company_id: Option<String>,
    report_type_id: Option<String>,
}

pub async fn select(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
    Json(form): Json<SelectionForm>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;

    if let Some(company_id) = form.company_id {
        if let Err(e) = wizard.select_company(company_id.trim()) {
            return wizard_error(e);
        }
    }
    if let Some(report_type_id) = form.report_type_id {
        if let Err(e) = wizard.select_report_type(report_type_id.trim()) {
            return wizard_error(e);
        }
    }
    Json(draft_view(&wizard)).into_response()
}

pub async fn advance(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;
    let transition = wizard.advance();
    transition_json(transition, &wizard)
}

pub async fn back(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;
    let transition = wizard.back();
    transition_json(transition, &wizard)
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;
    wizard.reset();
    session.progress.write().await.clear();
    Json(draft_view(&wizard)).into_response()
}

#[derive(Deserialize)]
pub struct YearCountForm {
    count: usize,
}

pub async fn set_year_count(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
    Json(form): Json<YearCountForm>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;
    match wizard.set_year_count(form.count) {
        Ok(_) => Json(draft_view(&wizard)).into_response(),
        Err(e) => wizard_error(e),
    }
}

#[derive(Deserialize)]
pub struct YearLabelForm {
    label: String,
}

pub async fn rename_year(
    State(state): State<Arc<AppState>>,
    Path((draft_id, index)): Path<(String, usize)>,
    Json(form): Json<YearLabelForm>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;
    match wizard.rename_year(index, &form.label) {
        Ok(()) => Json(draft_view(&wizard)).into_response(),
        Err(e) => wizard_error(e),
    }
}

/// Multipart fields: `slot`, optional `year`, and `file`.
pub async fn attach_file(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };

    let mut slot_raw = String::new();
    let mut year: Option<String> = None;
    let mut file: Option<Attachment> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "slot" => {
                if let Ok(text) = field.text().await {
                    slot_raw = text;
                }
            }
            "year" => {
                if let Ok(text) = field.text().await {
                    year = Some(text).filter(|y| !y.is_empty());
                }
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(data) => file = Some(Attachment::new(file_name, content_type, data)),
                    Err(e) => {
                        return error_json(StatusCode::BAD_REQUEST, format!("Upload interrupted: {}", e))
                    }
                }
            }
            _ => {}
        }
    }

    let slot: Slot = match slot_raw.trim().parse() {
        Ok(s) => s,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, e),
    };
    let Some(file) = file else {
        return error_json(StatusCode::BAD_REQUEST, "No file in request.");
    };

    let mut wizard = session.wizard.lock().await;
    match wizard.set_file(slot, year.as_deref(), Some(file)) {
        Ok(()) => Json(draft_view(&wizard)).into_response(),
        Err(e) => wizard_error(e),
    }
}

#[derive(Deserialize)]
pub struct YearQuery {
    year: Option<String>,
}

pub async fn detach_file(
    State(state): State<Arc<AppState>>,
    Path((draft_id, slot)): Path<(String, String)>,
    Query(query): Query<YearQuery>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let slot: Slot = match slot.parse() {
        Ok(s) => s,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, e),
    };
    let mut wizard = session.wizard.lock().await;
    match wizard.set_file(slot, query.year.as_deref(), None) {
        Ok(()) => Json(draft_view(&wizard)).into_response(),
        Err(e) => wizard_error(e),
    }
}

pub async fn set_fields(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
    Json(values): Json<BTreeMap<String, String>>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;
    for (field_id, value) in &values {
        if let Err(e) = wizard.set_field(field_id, value) {
            return wizard_error(e);
        }
    }
    Json(draft_view(&wizard)).into_response()
}

pub async fn validate_field(
    State(state): State<Arc<AppState>>,
    Path((draft_id, field_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let session = match find_session(&state, &draft_id).await {
        Ok(s) => s,
        Err(r) => return r,
    };
    let mut wizard = session.wizard.lock().await;
    match wizard.validate_field(&field_id) {
        Ok(error) => Json(serde_json::json!({
            "field_id": field_id,
            "error": error,
        }))
        .into_response(),
        Err(e) => wizard_error(e),
    }
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
) -> impl IntoResponse {
    match find_session(&state, &draft_id).await {
        Ok(session) => run_submission(&state, &draft_id, session, false).await,
        Err(r) => r,
    }
}

pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(draft_id): Path<String>,
) -> impl IntoResponse {
    match find_session(&state, &draft_id).await {
        Ok(session) => run_submission(&state, &draft_id, session, true).await,
        Err(r) => r,
    }
}

fn refused(unmet: Vec<Unmet>) -> Response {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({
            "status": "refused",
            "unmet": unmet,
        })),
    )
        .into_response()
}

async fn register_uploads(state: &AppState, result: &SubmissionResult) {
    let mut registry = state.registry.write().await;
    for outcome in &result.outcomes {
        if let Some(stored) = &outcome.stored {
            let status = if outcome.status_error.is_some() {
                AnalysisStatus::Pending
            } else {
                AnalysisStatus::Processing
            };
            registry.insert(FileRecord::from_stored(stored, status));
        }
    }
}

async fn run_submission(
    state: &AppState,
    draft_id: &str,
    session: Arc<DraftSession>,
    is_retry: bool,
) -> Response {
    // The wizard lock is held for the whole run, so a second request waits
    // here and is refused before it can touch the progress of this one.
    let mut wizard = session.wizard.lock().await;
    let unmet = if is_retry {
        wizard.retry_unmet()
    } else {
        wizard.submit_unmet()
    };
    if !unmet.is_empty() {
        return refused(unmet);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    session.progress.write().await.clear();

    let sink = session.clone();
    let drain = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            sink.progress.write().await.push(progress);
        }
    });

    let orchestrator = UploadOrchestrator::new(state.api.clone()).with_progress(tx);
    let outcome = if is_retry {
        wizard.retry(&orchestrator).await
    } else {
        wizard.submit(&orchestrator).await
    };

    let response = match outcome {
        Ok(result) => {
            tracing::info!(draft_id = %draft_id, retry = is_retry, "{}", result.summary());
            register_uploads(state, result).await;
            Json(draft_view(&wizard)).into_response()
        }
        Err(SubmitError::Refused(unmet)) => refused(unmet),
        Err(e @ SubmitError::ReferenceData(_)) => {
            tracing::error!(draft_id = %draft_id, "Submission aborted: {}", e);
            error_json(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    };

    drop(orchestrator);
    let _ = drain.await;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use crate::upload::testing::ScriptedApi;
    use crate::wizard::{sample_file, Step};
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};
    use std::time::Duration;

    const BOUNDARY: &str = "gozaresh-boundary";

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Multi-year draft (company 3, report type 1) sitting in Attach.
    async fn attach_stage(state: &Arc<AppState>) -> (String, Arc<DraftSession>) {
        let (id, session) = state.open_session().await;
        {
            let mut w = session.wizard.lock().await;
            w.select_company("3").unwrap();
            w.select_report_type("1").unwrap();
            assert_eq!(w.advance(), Transition::Moved { step: Step::Attach });
        }
        (id, session)
    }

    /// 1401 {primary, secondary} and 1402 {primary}, left in Review.
    async fn reviewed(state: &Arc<AppState>) -> (String, Arc<DraftSession>) {
        let (id, session) = attach_stage(state).await;
        {
            let mut w = session.wizard.lock().await;
            w.set_year_count(2).unwrap();
            w.rename_year(0, "1401").unwrap();
            w.rename_year(1, "1402").unwrap();
            w.set_file(Slot::Primary, Some("1401"), Some(sample_file("fs-1401.pdf")))
                .unwrap();
            w.set_file(Slot::Secondary, Some("1401"), Some(sample_file("exp-1401.pdf")))
                .unwrap();
            w.set_file(Slot::Primary, Some("1402"), Some(sample_file("fs-1402.pdf")))
                .unwrap();
            assert_eq!(w.advance(), Transition::Moved { step: Step::Describe });
            w.set_field("period", "سالانه").unwrap();
            w.set_field("year", "1402").unwrap();
            w.set_field("currency", "ریال").unwrap();
            assert_eq!(w.advance(), Transition::Moved { step: Step::Review });
        }
        (id, session)
    }

    async fn multipart_form(slot: &str, year: Option<&str>, file_name: &str) -> Multipart {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"slot\"\r\n\r\n{slot}\r\n"
        );
        if let Some(year) = year {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"year\"\r\n\r\n{year}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/pdf\r\n\r\n%PDF-1.4 statement\r\n--{BOUNDARY}--\r\n"
        ));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_attach_file_reads_slot_and_year() {
        let state = test_state(Arc::new(ScriptedApi::default()));
        let (id, session) = attach_stage(&state).await;
        session.wizard.lock().await.rename_year(0, "1401").unwrap();

        let form = multipart_form("primary", Some("1401"), "fs-1401.pdf").await;
        let response = attach_file(State(state.clone()), Path(id.clone()), form)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let view = body_json(response).await;
        assert_eq!(view["years"][0]["label"], "1401");
        assert_eq!(view["years"][0]["ready"], true);
        assert_eq!(view["years"][0]["files"], 1);
    }

    #[tokio::test]
    async fn test_attach_file_rejects_bad_slot_and_missing_year() {
        let state = test_state(Arc::new(ScriptedApi::default()));
        let (id, session) = attach_stage(&state).await;
        session.wizard.lock().await.rename_year(0, "1401").unwrap();

        let form = multipart_form("cover", Some("1401"), "fs-1401.pdf").await;
        let response = attach_file(State(state.clone()), Path(id.clone()), form)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let form = multipart_form("primary", None, "fs-1401.pdf").await;
        let response = attach_file(State(state.clone()), Path(id), form)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!session.wizard.lock().await.draft().unwrap().attachments.is_ready());
    }

    #[tokio::test]
    async fn test_submit_registers_only_uploaded_files() {
        let state = test_state(Arc::new(ScriptedApi::failing(&[2])));
        let (id, session) = reviewed(&state).await;

        let response = submit(State(state.clone()), Path(id)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(view["summary"], "2 of 3 succeeded");
        assert_eq!(view["result_kind"], "partially_failed");

        let registry = state.registry.read().await;
        let ids: Vec<&str> = registry.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["file-1", "file-3"]);
        assert!(registry
            .records()
            .iter()
            .all(|r| r.status == AnalysisStatus::Processing));

        let progress = session.progress.read().await;
        assert_eq!(progress.len(), 3);
        assert_eq!(
            progress.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_failed_status_call_registers_pending() {
        let api = ScriptedApi {
            fail_status: true,
            ..Default::default()
        };
        let state = test_state(Arc::new(api));
        let (id, _session) = reviewed(&state).await;

        let response = submit(State(state.clone()), Path(id)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let registry = state.registry.read().await;
        assert_eq!(registry.records().len(), 3);
        assert!(registry
            .records()
            .iter()
            .all(|r| r.status == AnalysisStatus::Pending));
    }

    #[tokio::test]
    async fn test_second_submit_waits_and_keeps_progress() {
        let api = Arc::new(ScriptedApi {
            latency: Duration::from_millis(100),
            ..Default::default()
        });
        let state = test_state(api.clone());
        let (id, session) = reviewed(&state).await;

        let first = tokio::spawn(submit(State(state.clone()), Path(id.clone())));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let second = submit(State(state.clone()), Path(id)).await.into_response();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = body_json(second).await;
        assert_eq!(body["unmet"][0]["condition"], "not_in_review");

        let first = first.await.unwrap().into_response();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(session.progress.read().await.len(), 3);
        assert_eq!(state.registry.read().await.records().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_only_after_full_failure() {
        let state = test_state(Arc::new(ScriptedApi::failing(&[1, 2, 3])));
        let (id, session) = reviewed(&state).await;

        let response = retry(State(state.clone()), Path(id.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = submit(State(state.clone()), Path(id.clone()))
            .await
            .into_response();
        assert_eq!(body_json(response).await["result_kind"], "fully_failed");
        assert!(state.registry.read().await.records().is_empty());

        // Attempts 4..6 go through.
        let response = retry(State(state.clone()), Path(id)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["summary"], "3 of 3 succeeded");
        assert_eq!(session.progress.read().await.len(), 3);
        assert_eq!(state.registry.read().await.records().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_draft_is_404() {
        let state = test_state(Arc::new(ScriptedApi::default()));
        let response = view_draft(State(state), Path("20260101_deadbeef".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
