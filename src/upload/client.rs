use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::registry::{AnalysisStatus, FileRecord};
use crate::wizard::{Attachment, Metadata};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

/// What the backend returns for a stored upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub stored_name: String,
    pub declared_type: String,
    pub byte_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub company_id: String,
    pub report_type_id: String,
    pub metadata: Metadata,
}

/// The analysis backend as seen by the submission flow.
#[async_trait]
pub trait UploadApi: Send + Sync {
    async fn upload(
        &self,
        file: &Attachment,
        company_id: &str,
        report_type_id: &str,
        metadata: &Metadata,
    ) -> Result<StoredFile, ApiError>;

    async fn set_status(
        &self,
        file_id: &str,
        status: AnalysisStatus,
        result: Option<serde_json::Value>,
    ) -> Result<(), ApiError>;

    async fn list_files(&self) -> Result<Vec<FileRecord>, ApiError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FileData {
    file: BackendFile,
}

#[derive(Debug, Deserialize)]
struct FilesData {
    files: Vec<BackendFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendFile {
    #[serde(rename = "_id")]
    id: String,
    original_file_name: String,
    file_type: String,
    file_size: u64,
    company_id: String,
    report_type_id: String,
    upload_date: DateTime<Utc>,
    #[serde(default)]
    analysis_status: AnalysisStatus,
    #[serde(default)]
    analysis_result: Option<serde_json::Value>,
    #[serde(default)]
    form_data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl BackendFile {
    fn metadata(&self) -> Metadata {
        self.form_data
            .iter()
            .flatten()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }

    fn into_stored(self) -> StoredFile {
        StoredFile {
            metadata: self.metadata(),
            id: self.id,
            stored_name: self.original_file_name,
            declared_type: self.file_type,
            byte_size: self.file_size,
            uploaded_at: self.upload_date,
            company_id: self.company_id,
            report_type_id: self.report_type_id,
        }
    }

    fn into_record(self) -> FileRecord {
        FileRecord {
            metadata: self.metadata(),
            id: self.id,
            name: self.original_file_name,
            declared_type: self.file_type,
            size: self.file_size,
            company_id: self.company_id,
            report_type_id: self.report_type_id,
            uploaded_at: self.upload_date,
            status: self.analysis_status,
            analysis_result: self.analysis_result,
        }
    }
}

/// REST client for the analysis backend (`/files` endpoints).
#[derive(Clone, Debug)]
pub struct HttpUploadApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpUploadApi {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request and unwraps the `{ success, message, data }` envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<Option<T>, ApiError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Rejected {
                    status: status.as_u16(),
                    message: if text.is_empty() {
                        format!("HTTP {}", status)
                    } else {
                        text
                    },
                })
            }
            Err(e) => return Err(ApiError::Malformed(e.to_string())),
        };

        if !status.is_success() || !envelope.success {
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: envelope.message.unwrap_or_else(|| fallback.to_string()),
            });
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl UploadApi for HttpUploadApi {
    async fn upload(
        &self,
        file: &Attachment,
        company_id: &str,
        report_type_id: &str,
        metadata: &Metadata,
    ) -> Result<StoredFile, ApiError> {
        let form_data =
            serde_json::to_string(metadata).map_err(|e| ApiError::Malformed(e.to_string()))?;
        let part = reqwest::multipart::Part::bytes(file.data.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("companyId", company_id.to_string())
            .text("reportTypeId", report_type_id.to_string())
            .text("formData", form_data);

        let request = self.client.post(self.url("/files/upload")).multipart(form);
        let data: Option<FileData> = self.send(request, "File upload failed").await?;
        data.map(|d| d.file.into_stored())
            .ok_or_else(|| ApiError::Malformed("upload response has no file".to_string()))
    }

    async fn set_status(
        &self,
        file_id: &str,
        status: AnalysisStatus,
        result: Option<serde_json::Value>,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "analysisStatus": status.as_str(),
            "analysisResult": result,
        });
        let request = self
            .client
            .put(self.url(&format!("/files/{}/analysis", file_id)))
            .json(&body);
        let _: Option<serde_json::Value> = self.send(request, "Status update failed").await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, ApiError> {
        let request = self.client.get(self.url("/files"));
        let data: Option<FilesData> = self.send(request, "Listing files failed").await?;
        Ok(data
            .map(|d| d.files.into_iter().map(BackendFile::into_record).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_file_wire_format() {
        let raw = r#"{
            "success": true,
            "data": { "file": {
                "_id": "65f0c2",
                "originalFileName": "fs-1401.pdf",
                "fileType": "application/pdf",
                "fileSize": 2048,
                "companyId": "3",
                "reportTypeId": "1",
                "uploadDate": "2023-07-23T08:30:00Z",
                "formData": { "year": "1401", "period": 4 }
            } }
        }"#;
        let envelope: Envelope<FileData> = serde_json::from_str(raw).unwrap();
        assert!(envelope.success);

        let stored = envelope.data.unwrap().file.into_stored();
        assert_eq!(stored.id, "65f0c2");
        assert_eq!(stored.stored_name, "fs-1401.pdf");
        assert_eq!(stored.metadata.get("year").map(String::as_str), Some("1401"));
        assert_eq!(stored.metadata.get("period").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_listing_defaults_status_to_pending() {
        let raw = r#"{
            "_id": "a1", "originalFileName": "x.xlsx", "fileType": "x", "fileSize": 1,
            "companyId": "1", "reportTypeId": "2", "uploadDate": "2024-01-01T00:00:00Z"
        }"#;
        let file: BackendFile = serde_json::from_str(raw).unwrap();
        let record = file.into_record();
        assert_eq!(record.status, AnalysisStatus::Pending);
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let api = HttpUploadApi::new("http://localhost:5000/api/", None).unwrap();
        assert_eq!(api.url("/files"), "http://localhost:5000/api/files");
    }
}
