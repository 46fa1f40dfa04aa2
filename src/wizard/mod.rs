//! The submission wizard: company and report type, attachments, metadata,
//! review, then upload.

mod bundle;
mod fields;
mod years;

pub use bundle::{Attachment, AttachmentError, FileBundle, Slot};
pub use fields::{validate_field, Metadata};
pub use years::{YearError, YearGroupManager};

#[cfg(test)]
pub(crate) use bundle::sample_file;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, ReportFamily, ReportTypeDescriptor};
use crate::upload::{ResultKind, SubmissionResult, UploadOrchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Select,
    Attach,
    Describe,
    Review,
    Submitting,
}

impl Step {
    fn previous(self) -> Step {
        match self {
            Step::Select | Step::Attach => Step::Select,
            Step::Describe => Step::Attach,
            Step::Review => Step::Describe,
            Step::Submitting => Step::Submitting,
        }
    }
}

/// A condition that kept the wizard from moving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Unmet {
    MissingCompany,
    MissingReportType,
    UnknownReportType,
    ReportTypeDisabled,
    MissingPrimaryFile,
    MissingField { field_id: String },
    /// Review is left through `submit`, not `advance`.
    SubmitFromReview,
    AlreadySubmitted,
    NotInReview,
    NothingToRetry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    Moved { step: Step },
    Refused { unmet: Vec<Unmet> },
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Not available in the {0:?} step")]
    WrongStep(Step),

    #[error("Unknown report type: {0}")]
    UnknownReportType(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("This report type takes a single file")]
    SlotNotOffered,

    #[error("Year groups only apply to multi-year report types")]
    NotMultiYear,

    #[error("Choose the year this file belongs to")]
    YearRequired,

    #[error(transparent)]
    Year(#[from] YearError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Submission refused")]
    Refused(Vec<Unmet>),

    #[error("Reference data unavailable: {0}")]
    ReferenceData(String),
}

/// Attachment shape, fixed when the wizard enters the Attach step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "files", rename_all = "snake_case")]
pub enum Attachments {
    SingleFile(FileBundle),
    SingleYear(FileBundle),
    MultiYear(YearGroupManager),
}

impl Attachments {
    fn for_family(family: ReportFamily) -> Self {
        match family {
            ReportFamily::SingleFile => Attachments::SingleFile(FileBundle::default()),
            ReportFamily::SingleYear => Attachments::SingleYear(FileBundle::default()),
            ReportFamily::MultiYear => Attachments::MultiYear(YearGroupManager::new()),
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            Attachments::SingleFile(bundle) | Attachments::SingleYear(bundle) => bundle.is_ready(),
            Attachments::MultiYear(years) => years.is_ready(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDraft {
    pub company_id: String,
    pub report_type_id: String,
    pub metadata: Metadata,
    pub attachments: Attachments,
}

/// Owns one draft and moves it through the steps.
pub struct WizardController {
    catalog: Arc<Catalog>,
    max_file_size: u64,
    step: Step,
    company_id: String,
    report_type_id: String,
    draft: Option<SubmissionDraft>,
    field_errors: BTreeMap<String, String>,
    result: Option<SubmissionResult>,
}

impl WizardController {
    pub fn new(catalog: Arc<Catalog>, max_file_size: u64) -> Self {
        Self {
            catalog,
            max_file_size,
            step: Step::Select,
            company_id: String::new(),
            report_type_id: String::new(),
            draft: None,
            field_errors: BTreeMap::new(),
            result: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn report_type_id(&self) -> &str {
        &self.report_type_id
    }

    pub fn draft(&self) -> Option<&SubmissionDraft> {
        self.draft.as_ref()
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    pub fn result(&self) -> Option<&SubmissionResult> {
        self.result.as_ref()
    }

    fn require_step(&self, step: Step) -> Result<(), WizardError> {
        if self.step == step {
            Ok(())
        } else {
            Err(WizardError::WrongStep(self.step))
        }
    }

    fn report_type(&self) -> Option<&ReportTypeDescriptor> {
        self.catalog.report_type(&self.report_type_id)
    }

    pub fn select_company(&mut self, company_id: &str) -> Result<(), WizardError> {
        self.require_step(Step::Select)?;
        self.company_id = company_id.to_string();
        Ok(())
    }

    /// Stores the choice even for a disabled report type; the guard refuses
    /// it later.
    pub fn select_report_type(&mut self, report_type_id: &str) -> Result<(), WizardError> {
        self.require_step(Step::Select)?;
        self.report_type_id = report_type_id.to_string();
        Ok(())
    }

    fn selection_unmet(&self) -> Vec<Unmet> {
        let mut unmet = Vec::new();
        if self.company_id.is_empty() {
            unmet.push(Unmet::MissingCompany);
        }
        if self.report_type_id.is_empty() {
            unmet.push(Unmet::MissingReportType);
        } else {
            match self.report_type() {
                None => unmet.push(Unmet::UnknownReportType),
                Some(rt) if rt.disabled => unmet.push(Unmet::ReportTypeDisabled),
                Some(_) => {}
            }
        }
        unmet
    }

    fn readiness_unmet(&self) -> Vec<Unmet> {
        if self.draft.as_ref().is_some_and(|d| d.attachments.is_ready()) {
            Vec::new()
        } else {
            vec![Unmet::MissingPrimaryFile]
        }
    }

    /// Runs every field's check, records the messages, and returns the ids
    /// of required fields that are still empty.
    fn describe_unmet(&mut self) -> Vec<Unmet> {
        let (Some(rt), Some(draft)) = (self.catalog.report_type(&self.report_type_id), &self.draft)
        else {
            return vec![Unmet::UnknownReportType];
        };

        self.field_errors = rt
            .fields
            .iter()
            .filter_map(|field| {
                let value = draft.metadata.get(&field.id).map(String::as_str);
                validate_field(field, value).map(|msg| (field.id.clone(), msg))
            })
            .collect();

        fields::missing_required(&rt.fields, &draft.metadata)
            .into_iter()
            .map(|field_id| Unmet::MissingField { field_id })
            .collect()
    }

    fn enter_attach(&mut self) {
        let Some(rt) = self.catalog.report_type(&self.report_type_id) else {
            return;
        };
        if let Some(draft) = self
            .draft
            .as_mut()
            .filter(|d| d.report_type_id == rt.id)
        {
            draft.company_id = self.company_id.clone();
            return;
        }

        self.field_errors.clear();
        self.draft = Some(SubmissionDraft {
            company_id: self.company_id.clone(),
            report_type_id: rt.id.clone(),
            metadata: Metadata::new(),
            attachments: Attachments::for_family(rt.family),
        });
    }

    /// Moves one step forward when the current step's guard holds.
    pub fn advance(&mut self) -> Transition {
        let unmet = match self.step {
            Step::Select => self.selection_unmet(),
            Step::Attach => self.readiness_unmet(),
            Step::Describe => self.describe_unmet(),
            Step::Review => vec![Unmet::SubmitFromReview],
            Step::Submitting => vec![Unmet::AlreadySubmitted],
        };
        if !unmet.is_empty() {
            return Transition::Refused { unmet };
        }

        let current = self.step;
        self.step = match current {
            Step::Select => {
                self.enter_attach();
                Step::Attach
            }
            Step::Attach => Step::Describe,
            Step::Describe => Step::Review,
            other => other,
        };
        Transition::Moved { step: self.step }
    }

    /// Steps back without discarding anything. A submitted draft stays put.
    pub fn back(&mut self) -> Transition {
        if self.step == Step::Submitting {
            return Transition::Refused {
                unmet: vec![Unmet::AlreadySubmitted],
            };
        }
        self.step = self.step.previous();
        Transition::Moved { step: self.step }
    }

    fn draft_in_attach(&mut self) -> Result<&mut SubmissionDraft, WizardError> {
        self.require_step(Step::Attach)?;
        self.draft.as_mut().ok_or(WizardError::WrongStep(Step::Attach))
    }

    fn years_mut(&mut self) -> Result<&mut YearGroupManager, WizardError> {
        match &mut self.draft_in_attach()?.attachments {
            Attachments::MultiYear(years) => Ok(years),
            _ => Err(WizardError::NotMultiYear),
        }
    }

    pub fn set_year_count(&mut self, n: usize) -> Result<usize, WizardError> {
        Ok(self.years_mut()?.set_year_count(n))
    }

    pub fn rename_year(&mut self, index: usize, label: &str) -> Result<(), WizardError> {
        Ok(self.years_mut()?.rename_year(index, label)?)
    }

    fn check_attachment(&self, file: &Attachment) -> Result<(), WizardError> {
        let rt = self
            .report_type()
            .ok_or_else(|| WizardError::UnknownReportType(self.report_type_id.clone()))?;
        if file.size == 0 {
            return Err(AttachmentError::Empty.into());
        }
        if file.size > self.max_file_size {
            return Err(AttachmentError::TooLarge {
                size: file.size,
                limit: self.max_file_size,
            }
            .into());
        }
        if !rt.accepts(&file.name) {
            return Err(AttachmentError::InvalidType {
                accepted: rt.accepted_extensions.join(", "),
            }
            .into());
        }
        Ok(())
    }

    /// Puts `file` into a slot, or clears the slot when `file` is `None`.
    /// Multi-year report types need the year label.
    pub fn set_file(
        &mut self,
        slot: Slot,
        year: Option<&str>,
        file: Option<Attachment>,
    ) -> Result<(), WizardError> {
        self.require_step(Step::Attach)?;
        if let Some(f) = &file {
            self.check_attachment(f)?;
        }

        let draft = self.draft_in_attach()?;
        match (&mut draft.attachments, year) {
            (Attachments::MultiYear(years), Some(label)) => years.set_file(label, slot, file)?,
            (Attachments::MultiYear(_), None) => return Err(WizardError::YearRequired),
            (Attachments::SingleFile(_), _) if slot != Slot::Primary => {
                return Err(WizardError::SlotNotOffered)
            }
            (Attachments::SingleFile(bundle) | Attachments::SingleYear(bundle), _) => {
                bundle.set(slot, file)
            }
        }
        Ok(())
    }

    /// Records a metadata value and clears that field's error.
    pub fn set_field(&mut self, field_id: &str, value: &str) -> Result<(), WizardError> {
        self.require_step(Step::Describe)?;
        let known = self
            .report_type()
            .is_some_and(|rt| rt.fields.iter().any(|f| f.id == field_id));
        if !known {
            return Err(WizardError::UnknownField(field_id.to_string()));
        }

        self.field_errors.remove(field_id);
        if let Some(draft) = self.draft.as_mut() {
            draft
                .metadata
                .insert(field_id.to_string(), value.to_string());
        }
        Ok(())
    }

    /// Checks one field as the user leaves it and records any message.
    pub fn validate_field(&mut self, field_id: &str) -> Result<Option<String>, WizardError> {
        let field = self
            .report_type()
            .and_then(|rt| rt.fields.iter().find(|f| f.id == field_id))
            .cloned()
            .ok_or_else(|| WizardError::UnknownField(field_id.to_string()))?;

        let value = self
            .draft
            .as_ref()
            .and_then(|d| d.metadata.get(field_id))
            .map(String::as_str);
        let error = validate_field(&field, value);
        match &error {
            Some(msg) => self.field_errors.insert(field.id.clone(), msg.clone()),
            None => self.field_errors.remove(&field.id),
        };
        Ok(error)
    }

    /// What keeps `submit` from running right now. Empty when it may.
    pub fn submit_unmet(&self) -> Vec<Unmet> {
        if self.step != Step::Review {
            return vec![Unmet::NotInReview];
        }
        self.readiness_unmet()
    }

    /// What keeps `retry` from running right now. Empty when it may.
    pub fn retry_unmet(&self) -> Vec<Unmet> {
        let fully_failed = self
            .result
            .as_ref()
            .is_some_and(|r| r.kind() == ResultKind::FullyFailed);
        if self.step != Step::Submitting || !fully_failed {
            return vec![Unmet::NothingToRetry];
        }
        Vec::new()
    }

    /// Leaves Review and runs the orchestrator once. Never retried here.
    pub async fn submit(
        &mut self,
        orchestrator: &UploadOrchestrator,
    ) -> Result<&SubmissionResult, SubmitError> {
        let unmet = self.submit_unmet();
        if !unmet.is_empty() {
            return Err(SubmitError::Refused(unmet));
        }
        self.run(orchestrator).await
    }

    /// Re-runs the same draft after a submission in which nothing succeeded.
    pub async fn retry(
        &mut self,
        orchestrator: &UploadOrchestrator,
    ) -> Result<&SubmissionResult, SubmitError> {
        let unmet = self.retry_unmet();
        if !unmet.is_empty() {
            return Err(SubmitError::Refused(unmet));
        }
        self.run(orchestrator).await
    }

    async fn run(
        &mut self,
        orchestrator: &UploadOrchestrator,
    ) -> Result<&SubmissionResult, SubmitError> {
        if self.report_type().is_none() {
            return Err(SubmitError::ReferenceData(format!(
                "report type {} is not in the catalog",
                self.report_type_id
            )));
        }
        let Some(draft) = self.draft.as_ref() else {
            return Err(SubmitError::Refused(vec![Unmet::MissingPrimaryFile]));
        };

        self.step = Step::Submitting;
        let result = orchestrator.run(draft).await;
        info!(
            report_type_id = %self.report_type_id,
            "Draft submitted: {}",
            result.summary()
        );
        let stored: &SubmissionResult = self.result.insert(result);
        Ok(stored)
    }

    /// Clears the draft and returns to Select.
    pub fn reset(&mut self) {
        self.step = Step::Select;
        self.company_id.clear();
        self.report_type_id.clear();
        self.draft = None;
        self.field_errors.clear();
        self.result = None;
    }
}
