use chrono::FixedOffset;
use serde::de::{Deserializer, IntoDeserializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{AnalysisStatus, FileRecord};
use crate::catalog::Catalog;
use crate::jalali::{normalize_digits, JalaliDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    UploadDate,
    FileName,
    CompanyName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Filter and sort settings for the file list. Empty strings count as unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileQuery {
    pub name_contains: String,
    pub company_id: Option<String>,
    pub report_type_id: Option<String>,
    #[serde(deserialize_with = "empty_as_none")]
    pub status: Option<AnalysisStatus>,
    /// Inclusive lower bound, Persian `YYYY/MM/DD`.
    pub date_from: Option<String>,
    /// Inclusive upper bound, Persian `YYYY/MM/DD`.
    pub date_to: Option<String>,
    #[serde(deserialize_with = "empty_as_default")]
    pub sort_key: SortKey,
    #[serde(deserialize_with = "empty_as_default")]
    pub sort_direction: SortDirection,
}

/// `?status=` from a form select means "any status".
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => T::deserialize(IntoDeserializer::<'de, D::Error>::into_deserializer(raw)).map(Some),
    }
}

fn empty_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(empty_as_none(deserializer)?.unwrap_or_default())
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Zero-pads a parseable bound (`1402/1/5` becomes `1402/01/05`) so the
/// string comparison holds. Anything else is compared as typed.
fn canonical_bound(raw: &str) -> String {
    JalaliDate::parse(raw)
        .map(|d| d.to_string())
        .unwrap_or_else(|| normalize_digits(raw.trim()))
}

struct Bounds {
    from: Option<String>,
    to: Option<String>,
}

impl Bounds {
    fn new(query: &FileQuery) -> Self {
        Self {
            from: set(&query.date_from).map(canonical_bound),
            to: set(&query.date_to).map(canonical_bound),
        }
    }

    fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// String comparison on the zero-padded Persian date.
    fn contains(&self, persian: &str) -> bool {
        self.from.as_deref().map_or(true, |from| persian >= from)
            && self.to.as_deref().map_or(true, |to| persian <= to)
    }
}

fn matches(record: &FileRecord, query: &FileQuery, needle: &str, bounds: &Bounds, offset: FixedOffset) -> bool {
    if !record.name.to_lowercase().contains(needle) {
        return false;
    }
    if set(&query.company_id).is_some_and(|id| record.company_id != id) {
        return false;
    }
    if set(&query.report_type_id).is_some_and(|id| record.report_type_id != id) {
        return false;
    }
    if query.status.is_some_and(|s| record.status != s) {
        return false;
    }
    if bounds.is_open() {
        return true;
    }
    JalaliDate::from_timestamp(&record.uploaded_at, offset)
        .is_some_and(|date| bounds.contains(&date.to_string()))
}

/// Filters and sorts `records` from scratch. The sort is stable.
pub fn apply(
    records: &[FileRecord],
    query: &FileQuery,
    catalog: &Catalog,
    offset: FixedOffset,
) -> Vec<FileRecord> {
    let needle = query.name_contains.to_lowercase();
    let bounds = Bounds::new(query);

    let mut filtered: Vec<FileRecord> = records
        .iter()
        .filter(|r| matches(r, query, &needle, &bounds, offset))
        .cloned()
        .collect();

    let compare = |a: &FileRecord, b: &FileRecord| -> Ordering {
        match query.sort_key {
            SortKey::UploadDate => a.uploaded_at.cmp(&b.uploaded_at),
            SortKey::FileName => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::CompanyName => catalog
                .company_name(&a.company_id)
                .to_lowercase()
                .cmp(&catalog.company_name(&b.company_id).to_lowercase()),
        }
    };

    match query.sort_direction {
        SortDirection::Asc => filtered.sort_by(compare),
        SortDirection::Desc => filtered.sort_by(|a, b| compare(a, b).reverse()),
    }
    filtered
}
