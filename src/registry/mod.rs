//! Uploaded-file records as reported by the analysis backend.
//!
//! Records are created from successful uploads and only change when the
//! backend reports a status transition. Nothing here deletes a record.

mod query;

pub use query::{apply, FileQuery};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::upload::StoredFile;
use crate::wizard::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub declared_type: String,
    pub size: u64,
    pub company_id: String,
    pub report_type_id: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub analysis_result: Option<serde_json::Value>,
}

impl FileRecord {
    pub fn from_stored(stored: &StoredFile, status: AnalysisStatus) -> Self {
        Self {
            id: stored.id.clone(),
            name: stored.stored_name.clone(),
            declared_type: stored.declared_type.clone(),
            size: stored.byte_size,
            company_id: stored.company_id.clone(),
            report_type_id: stored.report_type_id.clone(),
            uploaded_at: stored.uploaded_at,
            status,
            metadata: stored.metadata.clone(),
            analysis_result: None,
        }
    }
}

/// In-memory list of known files, newest insertions last.
#[derive(Debug, Default)]
pub struct FileRegistry {
    records: Vec<FileRecord>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Adds a record, replacing one with the same id.
    pub fn insert(&mut self, record: FileRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Replaces the whole list with a fresh listing from the backend.
    pub fn replace_all(&mut self, records: Vec<FileRecord>) {
        self.records = records;
    }

    /// Applies a backend status event. Returns false for an unknown id.
    pub fn apply_status(
        &mut self,
        id: &str,
        status: AnalysisStatus,
        result: Option<serde_json::Value>,
    ) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            warn!(file_id = %id, status = status.as_str(), "Status event for unknown file");
            return false;
        };
        debug!(
            file_id = %id,
            from = record.status.as_str(),
            to = status.as_str(),
            "File status changed"
        );
        record.status = status;
        if result.is_some() {
            record.analysis_result = result;
        }
        true
    }
}

/// `0 Bytes`, `1.5 KB`, `2 MB`: binary units, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str, name: &str, uploaded_at: DateTime<Utc>) -> FileRecord {
    FileRecord {
        id: id.to_string(),
        name: name.to_string(),
        declared_type: "application/pdf".to_string(),
        size: 1024,
        company_id: "1".to_string(),
        report_type_id: "1".to_string(),
        uploaded_at,
        status: AnalysisStatus::Processing,
        metadata: Metadata::new(),
        analysis_result: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_status() {
        let mut registry = FileRegistry::new();
        registry.insert(sample_record("f1", "a.pdf", Utc::now()));

        let payload = serde_json::json!({ "summary": "ok" });
        assert!(registry.apply_status("f1", AnalysisStatus::Completed, Some(payload.clone())));
        assert_eq!(registry.records()[0].status, AnalysisStatus::Completed);
        assert_eq!(registry.records()[0].analysis_result, Some(payload));

        assert!(!registry.apply_status("nope", AnalysisStatus::Failed, None));
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut registry = FileRegistry::new();
        registry.insert(sample_record("f1", "a.pdf", Utc::now()));
        registry.insert(sample_record("f1", "renamed.pdf", Utc::now()));
        assert_eq!(registry.records().len(), 1);
        assert_eq!(registry.records()[0].name, "renamed.pdf");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
    }
}
