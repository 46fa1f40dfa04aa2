use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::catalog::{FieldDescriptor, FieldKind};
use crate::jalali::{normalize_digits, JalaliDate};

/// Field id → submitted value.
pub type Metadata = BTreeMap<String, String>;

static DATE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn date_pattern() -> &'static Regex {
    DATE_PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9]{4})[/-]([0-9]{1,2})[/-]([0-9]{1,2})$").expect("date pattern compiles")
    })
}

pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Accepts Jalali dates (`1402/05/01`) and Gregorian ones (`2023-07-23`).
pub fn is_valid_date(raw: &str) -> bool {
    let normalized = normalize_digits(raw.trim());
    let Some(caps) = date_pattern().captures(&normalized) else {
        return false;
    };
    let (Ok(year), Ok(month), Ok(day)) = (
        caps[1].parse::<i32>(),
        caps[2].parse::<u32>(),
        caps[3].parse::<u32>(),
    ) else {
        return false;
    };

    if year >= 1700 {
        NaiveDate::from_ymd_opt(year, month, day).is_some()
    } else {
        JalaliDate::new(year, month, day).is_some()
    }
}

/// Finite decimal numbers only; `NaN` and `inf` are rejected.
pub fn is_valid_number(raw: &str) -> bool {
    normalize_digits(raw.trim())
        .parse::<f64>()
        .is_ok_and(f64::is_finite)
}

/// Error message for one field, or `None` when the value is acceptable.
pub fn validate_field(field: &FieldDescriptor, value: Option<&str>) -> Option<String> {
    if field.required && is_blank(value) {
        return Some(format!("{} is required", field.label));
    }
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;

    match field.kind {
        FieldKind::Number if !is_valid_number(value) => {
            Some(format!("{} must be a valid number", field.label))
        }
        FieldKind::Date if !is_valid_date(value) => {
            Some(format!("{} must be a valid date", field.label))
        }
        FieldKind::Select
            if !field.options.is_empty() && !field.options.iter().any(|o| o == value) =>
        {
            Some(format!("{} must be one of the listed options", field.label))
        }
        _ => None,
    }
}

/// Ids of required fields without a value, in descriptor order.
pub fn missing_required(fields: &[FieldDescriptor], metadata: &Metadata) -> Vec<String> {
    fields
        .iter()
        .filter(|f| f.required && is_blank(metadata.get(&f.id).map(String::as_str)))
        .map(|f| f.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: FieldKind, required: bool) -> FieldDescriptor {
        FieldDescriptor {
            id: "f".into(),
            label: "Field".into(),
            kind,
            required,
            options: vec!["A".into(), "B".into()],
            placeholder: None,
        }
    }

    #[test]
    fn test_required_field() {
        let field = descriptor(FieldKind::Text, true);
        assert!(validate_field(&field, None).is_some());
        assert!(validate_field(&field, Some("   ")).is_some());
        assert!(validate_field(&field, Some("SOX")).is_none());

        let optional = descriptor(FieldKind::Text, false);
        assert!(validate_field(&optional, None).is_none());
    }

    #[test]
    fn test_number_field() {
        let field = descriptor(FieldKind::Number, true);
        assert!(validate_field(&field, Some("1402")).is_none());
        assert!(validate_field(&field, Some("۱۴۰۳")).is_none());
        assert_eq!(
            validate_field(&field, Some("twelve")).as_deref(),
            Some("Field must be a valid number")
        );
        for raw in ["NaN", "inf", "-infinity"] {
            assert!(validate_field(&field, Some(raw)).is_some(), "{raw} accepted");
        }
    }

    #[test]
    fn test_date_field() {
        let field = descriptor(FieldKind::Date, false);
        assert!(validate_field(&field, Some("1402/05/01")).is_none());
        assert!(validate_field(&field, Some("2023-07-23")).is_none());
        assert!(validate_field(&field, Some("2023-02-30")).is_some());
        assert!(validate_field(&field, Some("1402/12/30")).is_some());
        assert!(validate_field(&field, Some("soon")).is_some());
        // Devanagari digits are not calendar input.
        assert!(!is_valid_date("१४०२/०५/०१"));
        assert!(is_valid_date("۱۴۰۲/۰۵/۰۱"));
    }

    #[test]
    fn test_select_field() {
        let field = descriptor(FieldKind::Select, true);
        assert!(validate_field(&field, Some("A")).is_none());
        assert!(validate_field(&field, Some("C")).is_some());
    }

    #[test]
    fn test_missing_required() {
        let fields = vec![
            FieldDescriptor {
                id: "period".into(),
                ..descriptor(FieldKind::Select, true)
            },
            FieldDescriptor {
                id: "notes".into(),
                ..descriptor(FieldKind::Textarea, false)
            },
            FieldDescriptor {
                id: "year".into(),
                ..descriptor(FieldKind::Number, true)
            },
        ];
        let mut metadata = Metadata::new();
        metadata.insert("year".into(), "abc".into());

        assert_eq!(missing_required(&fields, &metadata), vec!["period".to_string()]);
    }
}
