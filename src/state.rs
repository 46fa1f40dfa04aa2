use crate::catalog::Catalog;
use crate::config::Config;
use crate::registry::FileRegistry;
use crate::upload::{UploadApi, UploadProgress};
use crate::wizard::WizardController;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// One wizard plus the progress it has streamed during a submission. The
/// progress list has its own lock so it can be read mid-submission.
pub struct DraftSession {
    pub wizard: Mutex<WizardController>,
    pub progress: RwLock<Vec<UploadProgress>>,
}

pub type Sessions = RwLock<HashMap<String, Arc<DraftSession>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub api: Arc<dyn UploadApi>,
    pub sessions: Arc<Sessions>,
    pub registry: Arc<RwLock<FileRegistry>>,
}

impl AppState {
    pub async fn open_session(&self) -> (String, Arc<DraftSession>) {
        let id = generate_draft_id();
        let session = Arc::new(DraftSession {
            wizard: Mutex::new(WizardController::new(
                self.catalog.clone(),
                self.config.max_upload_bytes,
            )),
            progress: RwLock::new(Vec::new()),
        });
        self.sessions
            .write()
            .await
            .insert(id.clone(), session.clone());
        (id, session)
    }

    pub async fn session(&self, id: &str) -> Option<Arc<DraftSession>> {
        self.sessions.read().await.get(id).cloned()
    }
}

pub fn generate_draft_id() -> String {
    format!(
        "{}_{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

#[cfg(test)]
pub(crate) fn test_state(api: Arc<dyn UploadApi>) -> Arc<AppState> {
    let config = Config {
        backend_api_url: "http://localhost:5000/api".to_string(),
        backend_api_token: None,
        host: "127.0.0.1".to_string(),
        port: 0,
        max_upload_bytes: 1024 * 1024,
        catalog_path: None,
        calendar_utc_offset_minutes: crate::jalali::TEHRAN_OFFSET_MINUTES,
    };
    Arc::new(AppState {
        config: Arc::new(config),
        catalog: Arc::new(Catalog::builtin()),
        api,
        sessions: Arc::new(RwLock::new(HashMap::new())),
        registry: Arc::new(RwLock::new(FileRegistry::new())),
    })
}
