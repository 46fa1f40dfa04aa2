//! Turns a ready draft into individual uploads and runs them one by one.

mod client;

pub use client::{HttpUploadApi, StoredFile, UploadApi};

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::registry::AnalysisStatus;
use crate::wizard::{Attachment, Attachments, Metadata, Slot, SubmissionDraft};

pub const YEAR_KEY: &str = "year";
pub const FILE_TYPE_KEY: &str = "fileType";

/// One file to send, with the metadata it is sent with.
#[derive(Debug, Clone)]
pub struct UploadUnit<'a> {
    pub slot: Slot,
    pub year: Option<&'a str>,
    pub file: &'a Attachment,
    pub metadata: Metadata,
}

/// Flattens the draft's attachments in submission order: years in list
/// order, then primary, secondary, tertiary within a bundle.
pub fn linearize(draft: &SubmissionDraft) -> Vec<UploadUnit<'_>> {
    let tagged = |slot: Slot, year: Option<&str>| {
        let mut metadata = draft.metadata.clone();
        if let Some(year) = year {
            metadata.insert(YEAR_KEY.to_string(), year.to_string());
        }
        metadata.insert(FILE_TYPE_KEY.to_string(), slot.label().to_string());
        metadata
    };

    match &draft.attachments {
        Attachments::SingleFile(bundle) => bundle
            .primary
            .iter()
            .map(|file| UploadUnit {
                slot: Slot::Primary,
                year: None,
                file,
                metadata: draft.metadata.clone(),
            })
            .collect(),
        Attachments::SingleYear(bundle) => bundle
            .filled()
            .map(|(slot, file)| UploadUnit {
                slot,
                year: None,
                file,
                metadata: tagged(slot, None),
            })
            .collect(),
        Attachments::MultiYear(years) => years
            .groups()
            .into_iter()
            .flat_map(|(year, bundle)| {
                bundle.filled().map(move |(slot, file)| (year, slot, file))
            })
            .map(|(year, slot, file)| UploadUnit {
                slot,
                year: Some(year),
                file,
                metadata: tagged(slot, Some(year)),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub status: OutcomeStatus,
    pub slot: Slot,
    pub year: Option<String>,
    pub file_name: String,
    pub file_id: Option<String>,
    pub error: Option<String>,
    /// Set when the upload worked but the move to `processing` did not.
    pub status_error: Option<String>,
    pub stored: Option<StoredFile>,
}

impl UploadOutcome {
    fn base(unit: &UploadUnit<'_>, status: OutcomeStatus) -> Self {
        Self {
            status,
            slot: unit.slot,
            year: unit.year.map(str::to_string),
            file_name: unit.file.name.clone(),
            file_id: None,
            error: None,
            status_error: None,
            stored: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    FullySucceeded,
    PartiallyFailed,
    FullyFailed,
}

/// Outcomes in the order the units were planned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmissionResult {
    pub outcomes: Vec<UploadOutcome>,
}

impl SubmissionResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn kind(&self) -> ResultKind {
        match (self.succeeded(), self.failed()) {
            (0, _) => ResultKind::FullyFailed,
            (_, 0) => ResultKind::FullySucceeded,
            _ => ResultKind::PartiallyFailed,
        }
    }

    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded(), self.outcomes.len())
    }
}

/// Sent after each unit finishes.
#[derive(Debug, Clone, Serialize)]
pub struct UploadProgress {
    pub index: usize,
    pub total: usize,
    pub outcome: UploadOutcome,
}

pub struct UploadOrchestrator {
    api: Arc<dyn UploadApi>,
    progress: Option<mpsc::UnboundedSender<UploadProgress>>,
}

impl UploadOrchestrator {
    pub fn new(api: Arc<dyn UploadApi>) -> Self {
        Self {
            api,
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<UploadProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Uploads every unit of the draft, one at a time, and never fails as a
    /// whole: each unit's error lands in its own outcome.
    pub async fn run(&self, draft: &SubmissionDraft) -> SubmissionResult {
        let mut queue: VecDeque<UploadUnit<'_>> = linearize(draft).into();
        let total = queue.len();
        let mut outcomes = Vec::with_capacity(total);

        info!(
            company_id = %draft.company_id,
            report_type_id = %draft.report_type_id,
            units = total,
            "Starting submission"
        );

        while let Some(unit) = queue.pop_front() {
            let outcome = self.attempt(draft, &unit).await;
            if let Some(tx) = &self.progress {
                let _ = tx.send(UploadProgress {
                    index: outcomes.len(),
                    total,
                    outcome: outcome.clone(),
                });
            }
            outcomes.push(outcome);
        }

        let result = SubmissionResult { outcomes };
        info!("Submission finished: {}", result.summary());
        result
    }

    async fn attempt(&self, draft: &SubmissionDraft, unit: &UploadUnit<'_>) -> UploadOutcome {
        let uploaded = self
            .api
            .upload(
                unit.file,
                &draft.company_id,
                &draft.report_type_id,
                &unit.metadata,
            )
            .await;

        let stored = match uploaded {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    file = %unit.file.name,
                    year = unit.year.unwrap_or("-"),
                    "Upload failed: {}",
                    e
                );
                let mut outcome = UploadOutcome::base(unit, OutcomeStatus::Failed);
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        let mut outcome = UploadOutcome::base(unit, OutcomeStatus::Succeeded);
        if let Err(e) = self
            .api
            .set_status(&stored.id, AnalysisStatus::Processing, None)
            .await
        {
            warn!(file_id = %stored.id, "Could not mark file as processing: {}", e);
            outcome.status_error = Some(e.to_string());
        }
        outcome.file_id = Some(stored.id.clone());
        outcome.stored = Some(stored);
        outcome
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, ScriptedApi};
    use super::*;
    use crate::wizard::{sample_file, FileBundle, YearGroupManager};

    fn draft(attachments: Attachments) -> SubmissionDraft {
        let mut metadata = Metadata::new();
        metadata.insert("currency".into(), "ریال".into());
        SubmissionDraft {
            company_id: "3".into(),
            report_type_id: "1".into(),
            metadata,
            attachments,
        }
    }

    fn two_year_draft() -> SubmissionDraft {
        let mut years = YearGroupManager::new();
        years.set_year_count(2);
        years.rename_year(0, "1401").unwrap();
        years.rename_year(1, "1402").unwrap();
        years
            .set_file("1401", Slot::Primary, Some(sample_file("fs-1401.pdf")))
            .unwrap();
        years
            .set_file("1401", Slot::Secondary, Some(sample_file("exp-1401.pdf")))
            .unwrap();
        years
            .set_file("1402", Slot::Primary, Some(sample_file("fs-1402.pdf")))
            .unwrap();
        draft(Attachments::MultiYear(years))
    }

    #[test]
    fn test_multi_year_linearization_order() {
        let draft = two_year_draft();
        let units = linearize(&draft);
        let plan: Vec<(Option<&str>, Slot)> = units.iter().map(|u| (u.year, u.slot)).collect();
        assert_eq!(
            plan,
            vec![
                (Some("1401"), Slot::Primary),
                (Some("1401"), Slot::Secondary),
                (Some("1402"), Slot::Primary),
            ]
        );
        assert_eq!(units[1].metadata.get(YEAR_KEY).unwrap(), "1401");
        assert_eq!(units[1].metadata.get(FILE_TYPE_KEY).unwrap(), "هزینه ها");
        assert_eq!(units[2].metadata.get("currency").unwrap(), "ریال");
    }

    #[test]
    fn test_single_file_sends_metadata_untouched() {
        let mut bundle = FileBundle::default();
        bundle.set(Slot::Primary, Some(sample_file("audit.xlsx")));
        let draft = draft(Attachments::SingleFile(bundle));

        let units = linearize(&draft);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].metadata, draft.metadata);
    }

    #[test]
    fn test_single_year_tags_slots() {
        let mut bundle = FileBundle::default();
        bundle.set(Slot::Tertiary, Some(sample_file("budget.xlsx")));
        bundle.set(Slot::Primary, Some(sample_file("fs.pdf")));
        let draft = draft(Attachments::SingleYear(bundle));

        let units = linearize(&draft);
        let labels: Vec<&str> = units
            .iter()
            .map(|u| u.metadata.get(FILE_TYPE_KEY).unwrap().as_str())
            .collect();
        assert_eq!(labels, vec!["صورت مالی", "بودجه"]);
        assert!(units.iter().all(|u| !u.metadata.contains_key(YEAR_KEY)));
    }

    #[tokio::test]
    async fn test_each_upload_is_followed_by_status_call() {
        let api = Arc::new(ScriptedApi::default());
        let orchestrator = UploadOrchestrator::new(api.clone());

        let result = orchestrator.run(&two_year_draft()).await;
        assert_eq!(result.kind(), ResultKind::FullySucceeded);

        let calls = api.calls();
        assert_eq!(calls.len(), 6);
        assert!(matches!(&calls[0], Call::Upload { file, .. } if file == "fs-1401.pdf"));
        assert_eq!(
            calls[1],
            Call::SetStatus {
                file_id: "file-1".into(),
                status: AnalysisStatus::Processing
            }
        );
        assert!(matches!(&calls[4], Call::Upload { file, .. } if file == "fs-1402.pdf"));
    }

    #[tokio::test]
    async fn test_failed_unit_does_not_stop_the_rest() {
        let api = Arc::new(ScriptedApi::failing(&[2]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = UploadOrchestrator::new(api.clone()).with_progress(tx);

        let result = orchestrator.run(&two_year_draft()).await;
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.kind(), ResultKind::PartiallyFailed);
        assert_eq!(result.summary(), "2 of 3 succeeded");

        let failed = &result.outcomes[1];
        assert_eq!(failed.status, OutcomeStatus::Failed);
        assert_eq!(failed.year.as_deref(), Some("1401"));
        assert_eq!(failed.slot, Slot::Secondary);
        assert_eq!(failed.error.as_deref(), Some("connection reset"));
        assert_eq!(result.outcomes[2].file_id.as_deref(), Some("file-3"));

        let uploads = api
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Upload { .. }))
            .count();
        assert_eq!(uploads, 3);

        let mut seen = Vec::new();
        while let Ok(progress) = rx.try_recv() {
            seen.push((progress.index, progress.total));
        }
        assert_eq!(seen, vec![(0, 3), (1, 3), (2, 3)]);
    }

    #[tokio::test]
    async fn test_status_failure_keeps_upload_successful() {
        let api = Arc::new(ScriptedApi {
            fail_status: true,
            ..Default::default()
        });
        let orchestrator = UploadOrchestrator::new(api);

        let result = orchestrator.run(&two_year_draft()).await;
        assert_eq!(result.kind(), ResultKind::FullySucceeded);
        assert!(result.outcomes.iter().all(|o| o.status_error.is_some()));
    }

    #[tokio::test]
    async fn test_all_failed() {
        let api = Arc::new(ScriptedApi::failing(&[1, 2, 3]));
        let result = UploadOrchestrator::new(api).run(&two_year_draft()).await;
        assert_eq!(result.kind(), ResultKind::FullyFailed);
        assert_eq!(result.summary(), "0 of 3 succeeded");
    }
}
