use super::{Company, FieldDescriptor, FieldKind, ReportFamily, ReportTypeDescriptor};

const COMPANIES: &[(&str, &str, &str)] = &[
    ("1", "سروش مانا فارمد", "SRM"),
    ("2", "فاران فارمد", "FRN"),
    ("3", "سرمایه گذاری دارویی گلرنگ", "GLG"),
    ("4", "آرین سلامت سینا", "ARN"),
    ("5", "ابیان دارو", "ABD"),
    ("6", "تحقیقاتی و تولیدی واریان فارمد", "VRY"),
    ("7", "فاران شیمی تویسرکان", "FRT"),
    ("8", "ابیان فارمد", "ABF"),
    ("9", "فارمد سلامت سينا", "FSH"),
    ("10", "ابيان سلامت", "ABS"),
    ("11", "هستی آریا شیمی", "HSA"),
    ("12", "گسترش هستی سلامت شیمی", "GHS"),
    ("13", "هستی بهین فارمد", "HBF"),
    ("14", "پژوهش گستران تغذیه آسان", "PGT"),
];

pub fn companies() -> Vec<Company> {
    COMPANIES
        .iter()
        .map(|(id, name, code)| Company {
            id: id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
        })
        .collect()
}

fn field(id: &str, label: &str, kind: FieldKind, required: bool) -> FieldDescriptor {
    FieldDescriptor {
        id: id.to_string(),
        label: label.to_string(),
        kind,
        required,
        options: Vec::new(),
        placeholder: None,
    }
}

fn select(id: &str, label: &str, options: &[&str]) -> FieldDescriptor {
    FieldDescriptor {
        options: options.iter().map(|o| o.to_string()).collect(),
        ..field(id, label, FieldKind::Select, true)
    }
}

fn year_field() -> FieldDescriptor {
    FieldDescriptor {
        placeholder: Some("۱۴۰۳".to_string()),
        ..field("year", "سال", FieldKind::Number, true)
    }
}

fn extensions(list: &[&str]) -> Vec<String> {
    list.iter().map(|e| e.to_string()).collect()
}

pub fn report_types() -> Vec<ReportTypeDescriptor> {
    vec![
        ReportTypeDescriptor {
            id: "1".to_string(),
            name: "صورت‌های مالی".to_string(),
            description: "گزارش‌های مالی سالانه یا فصلی".to_string(),
            family: ReportFamily::MultiYear,
            accepted_extensions: extensions(&[".pdf", ".xlsx", ".xls"]),
            fields: vec![
                select(
                    "period",
                    "دوره گزارش‌دهی",
                    &["سه‌ماهه اول", "سه‌ماهه دوم", "سه‌ماهه سوم", "سه‌ماهه چهارم", "سالانه"],
                ),
                year_field(),
                select("currency", "واحد پول", &["ریال", "دلار", "یورو", "پوند"]),
            ],
            disabled: false,
        },
        ReportTypeDescriptor {
            id: "2".to_string(),
            name: "گزارش حسابرسی(ارزیابی عملکرد)".to_string(),
            description: "گزارش حسابرسی با ارزیابی عملکرد - آپلود فایل اکسل چند برگه‌ای"
                .to_string(),
            family: ReportFamily::SingleFile,
            accepted_extensions: extensions(&[".xlsx", ".xls"]),
            fields: vec![
                select(
                    "ragAlgorithm",
                    "الگوریتم RAG",
                    &["Vector Search", "BM25", "Hybrid", "Semantic Search"],
                ),
                year_field(),
            ],
            disabled: false,
        },
        ReportTypeDescriptor {
            id: "3".to_string(),
            name: "گزارش انطباق".to_string(),
            description: "انطباق مقرراتی و ارزیابی ریسک".to_string(),
            family: ReportFamily::SingleYear,
            accepted_extensions: extensions(&[".pdf", ".xlsx", ".xls", ".docx"]),
            fields: vec![
                FieldDescriptor {
                    placeholder: Some("SOX، GDPR و غیره".to_string()),
                    ..field("regulation", "نوع مقررات", FieldKind::Text, true)
                },
                field("complianceDate", "تاریخ انطباق", FieldKind::Date, true),
                field("notes", "یادداشت‌های اضافی", FieldKind::Textarea, false),
            ],
            disabled: true,
        },
    ]
}
