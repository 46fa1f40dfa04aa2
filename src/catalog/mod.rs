//! Reference data: companies and report types.
//!
//! The catalog is read-only once loaded. It is either the built-in set or a
//! JSON file pointed to by `CATALOG_PATH`.

mod builtin;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog has no report types")]
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub code: String,
}

/// Attachment shape a report type asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFamily {
    /// One file, no slot or year tagging.
    SingleFile,
    /// One bundle of up to three slots.
    SingleYear,
    /// One bundle per year label.
    MultiYear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Select,
    Textarea,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTypeDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub family: ReportFamily,
    pub accepted_extensions: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub disabled: bool,
}

impl ReportTypeDescriptor {
    /// Case-insensitive extension check against the accepted list.
    pub fn accepts(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub companies: Vec<Company>,
    pub report_types: Vec<ReportTypeDescriptor>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            companies: builtin::companies(),
            report_types: builtin::report_types(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog: Catalog = serde_json::from_str(&raw)?;
        if catalog.report_types.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(catalog)
    }

    /// Loads the catalog file when configured, the built-in set otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn report_type(&self, id: &str) -> Option<&ReportTypeDescriptor> {
        self.report_types.iter().find(|rt| rt.id == id)
    }

    pub fn company(&self, id: &str) -> Option<&Company> {
        self.companies.iter().find(|c| c.id == id)
    }

    pub fn company_name(&self, id: &str) -> &str {
        self.company(id).map(|c| c.name.as_str()).unwrap_or("")
    }
}
