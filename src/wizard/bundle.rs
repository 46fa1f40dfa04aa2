use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the three attachment positions of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Financial statement. Mandatory before submission.
    Primary,
    /// Expenses.
    Secondary,
    /// Budget.
    Tertiary,
}

impl Slot {
    /// Upload order within a bundle.
    pub const ORDER: [Slot; 3] = [Slot::Primary, Slot::Secondary, Slot::Tertiary];

    /// Human-readable label sent to the backend as `fileType`.
    pub fn label(self) -> &'static str {
        match self {
            Slot::Primary => "صورت مالی",
            Slot::Secondary => "هزینه ها",
            Slot::Tertiary => "بودجه",
        }
    }
}

impl std::str::FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Slot::Primary),
            "secondary" => Ok(Slot::Secondary),
            "tertiary" => Ok(Slot::Tertiary),
            other => Err(format!("Unknown slot: {}", other)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("File type must be one of: {accepted}")]
    InvalidType { accepted: String },

    #[error("File is too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("File is empty")]
    Empty,
}

/// A file held in a slot. The bytes stay in memory until submission.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    #[serde(skip)]
    pub data: Bytes,
}

impl Attachment {
    /// Builds an attachment, guessing the declared type from the extension
    /// when the client did not send one.
    pub fn new(name: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        let name = name.into();
        let content_type = content_type
            .filter(|t| !t.is_empty() && t != "application/octet-stream")
            .unwrap_or_else(|| {
                mime_guess::from_path(&name)
                    .first_raw()
                    .unwrap_or("application/octet-stream")
                    .to_string()
            });
        Self {
            size: data.len() as u64,
            name,
            content_type,
            data,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileBundle {
    pub primary: Option<Attachment>,
    pub secondary: Option<Attachment>,
    pub tertiary: Option<Attachment>,
}

impl FileBundle {
    pub fn get(&self, slot: Slot) -> Option<&Attachment> {
        match slot {
            Slot::Primary => self.primary.as_ref(),
            Slot::Secondary => self.secondary.as_ref(),
            Slot::Tertiary => self.tertiary.as_ref(),
        }
    }

    pub fn set(&mut self, slot: Slot, file: Option<Attachment>) {
        let target = match slot {
            Slot::Primary => &mut self.primary,
            Slot::Secondary => &mut self.secondary,
            Slot::Tertiary => &mut self.tertiary,
        };
        *target = file;
    }

    pub fn is_ready(&self) -> bool {
        self.primary.is_some()
    }

    pub fn is_empty(&self) -> bool {
        Slot::ORDER.iter().all(|slot| self.get(*slot).is_none())
    }

    /// Filled slots in upload order.
    pub fn filled(&self) -> impl Iterator<Item = (Slot, &Attachment)> + '_ {
        Slot::ORDER
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|file| (slot, file)))
    }
}

#[cfg(test)]
pub(crate) fn sample_file(name: &str) -> Attachment {
    Attachment::new(name, None, Bytes::from_static(b"report body"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_readiness_needs_primary() {
        let mut bundle = FileBundle::default();
        bundle.set(Slot::Secondary, Some(sample_file("expenses.pdf")));
        assert!(!bundle.is_ready());
        assert!(!bundle.is_empty());

        bundle.set(Slot::Primary, Some(sample_file("statement.pdf")));
        assert!(bundle.is_ready());
    }

    #[test]
    fn test_filled_follows_slot_order() {
        let mut bundle = FileBundle::default();
        bundle.set(Slot::Tertiary, Some(sample_file("budget.xlsx")));
        bundle.set(Slot::Primary, Some(sample_file("statement.pdf")));

        let slots: Vec<Slot> = bundle.filled().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![Slot::Primary, Slot::Tertiary]);
    }

    #[test]
    fn test_attachment_guesses_content_type() {
        let file = Attachment::new("report.pdf", None, Bytes::from_static(b"%PDF"));
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.size, 4);

        let declared = Attachment::new("x.bin", Some("text/plain".into()), Bytes::new());
        assert_eq!(declared.content_type, "text/plain");
    }
}
