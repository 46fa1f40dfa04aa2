mod catalog;
mod config;
mod jalali;
mod registry;
mod routes;
mod state;
mod upload;
mod wizard;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gozaresh=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;
    let config = Arc::new(config);

    let catalog = catalog::Catalog::load(config.catalog_path.as_deref())?;
    tracing::info!(
        companies = catalog.companies.len(),
        report_types = catalog.report_types.len(),
        "Catalog loaded"
    );

    let api = upload::HttpUploadApi::new(
        &config.backend_api_url,
        config.backend_api_token.clone(),
    )?;

    let state = Arc::new(state::AppState {
        config: config.clone(),
        catalog: Arc::new(catalog),
        api: Arc::new(api),
        sessions: Arc::new(RwLock::new(HashMap::new())),
        registry: Arc::new(RwLock::new(registry::FileRegistry::new())),
    });

    let body_limit = usize::try_from(config.max_upload_bytes).unwrap_or(usize::MAX);

    let app = Router::new()
        .route("/api/catalog", get(routes::catalog))
        .route("/api/drafts", post(routes::create_draft))
        .route("/api/drafts/:draft_id", get(routes::view_draft))
        .route("/api/drafts/:draft_id/progress", get(routes::view_progress))
        .route("/api/drafts/:draft_id/selection", post(routes::select))
        .route("/api/drafts/:draft_id/advance", post(routes::advance))
        .route("/api/drafts/:draft_id/back", post(routes::back))
        .route("/api/drafts/:draft_id/reset", post(routes::reset))
        .route("/api/drafts/:draft_id/years", put(routes::set_year_count))
        .route("/api/drafts/:draft_id/years/:index", put(routes::rename_year))
        .route("/api/drafts/:draft_id/files", post(routes::attach_file))
        .route("/api/drafts/:draft_id/files/:slot", delete(routes::detach_file))
        .route("/api/drafts/:draft_id/fields", put(routes::set_fields))
        .route(
            "/api/drafts/:draft_id/fields/:field_id/validate",
            post(routes::validate_field),
        )
        .route("/api/drafts/:draft_id/submit", post(routes::submit))
        .route("/api/drafts/:draft_id/retry", post(routes::retry))
        .route("/api/files", get(routes::list_files))
        .route("/api/files/refresh", post(routes::refresh_files))
        .route("/api/files/:file_id/status", put(routes::update_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Gozaresh listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
