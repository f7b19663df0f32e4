use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::amount::format_amount_cents;
use crate::model::ParsedBill;

/// Magnitude bounds in cents: 0.01 to 10,000,000 yuan inclusive.
pub const MIN_AMOUNT_CENTS: i64 = 1;
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000;

fn min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1990, 1, 1).expect("invalid builtin date bound")
}

fn max_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 12, 31).expect("invalid builtin date bound")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyDescription,
    AmountOutOfRange,
    DateOutOfRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    pub field: &'static str,
    pub index: usize,
}

pub fn validate_amount_cents(cents: i64) -> bool {
    let magnitude = cents.abs();
    (MIN_AMOUNT_CENTS..=MAX_AMOUNT_CENTS).contains(&magnitude)
}

pub fn validate_date(date: NaiveDate) -> bool {
    (min_date()..=max_date()).contains(&date)
}

/// Checks every bill and collects violations instead of failing. The caller
/// decides between rejecting the batch and sanitizing.
pub fn validate_bills(bills: &[ParsedBill]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (index, bill) in bills.iter().enumerate() {
        if bill.description.trim().is_empty() {
            issues.push(ValidationIssue {
                kind: IssueKind::EmptyDescription,
                message: format!("第{}条账单缺少描述", index + 1),
                field: "description",
                index,
            });
        }
        if !validate_amount_cents(bill.amount_cents) {
            issues.push(ValidationIssue {
                kind: IssueKind::AmountOutOfRange,
                message: format!(
                    "第{}条账单金额 {} 超出允许范围 [0.01, 10000000.00]",
                    index + 1,
                    format_amount_cents(bill.amount_cents)
                ),
                field: "amount",
                index,
            });
        }
        if !validate_date(bill.transaction_time.date()) {
            issues.push(ValidationIssue {
                kind: IssueKind::DateOutOfRange,
                message: format!(
                    "第{}条账单日期 {} 超出允许范围 [1990-01-01, 2030-12-31]",
                    index + 1,
                    bill.date_text()
                ),
                field: "transaction_time",
                index,
            });
        }
    }
    issues
}

fn bill_is_valid(bill: &ParsedBill) -> bool {
    !bill.description.trim().is_empty()
        && validate_amount_cents(bill.amount_cents)
        && validate_date(bill.transaction_time.date())
}

/// Partitions a batch into valid bills and dropped bills.
pub fn sanitize_bills(bills: Vec<ParsedBill>) -> (Vec<ParsedBill>, Vec<ParsedBill>) {
    bills.into_iter().partition(bill_is_valid)
}

fn script_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<script\b[^>]*/?>")
            .expect("invalid script tag regex")
    })
}

fn iframe_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<iframe\b[^>]*>.*?</iframe>|<iframe\b[^>]*/?>")
            .expect("invalid iframe tag regex")
    })
}

fn event_handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\son\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
            .expect("invalid event handler regex")
    })
}

fn javascript_uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)javascript\s*:").expect("invalid javascript uri regex"))
}

fn data_uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Consumes the whole URI including the payload; stops at whitespace,
    // quotes or tag delimiters so surrounding markup survives.
    RE.get_or_init(|| Regex::new(r#"(?i)data\s*:\s*[^\s"'<>]*"#).expect("invalid data uri regex"))
}

/// Strips script/iframe tags, inline event handlers and dangerous URI schemes
/// from free text destined for a rendering context. Image data URIs survive.
pub fn sanitize_rich_text(text: &str) -> String {
    let mut out = script_tag_re().replace_all(text, "").into_owned();
    out = iframe_tag_re().replace_all(&out, "").into_owned();
    out = event_handler_re().replace_all(&out, "").into_owned();
    out = javascript_uri_re().replace_all(&out, "").into_owned();
    out = data_uri_re()
        .replace_all(&out, |caps: &regex::Captures| {
            let matched = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            let compact: String = matched
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            if compact.starts_with("data:image/") {
                matched.to_string()
            } else {
                String::new()
            }
        })
        .into_owned();
    out
}

/// Makes a caller-supplied filename safe for storage: path separators and
/// reserved/control characters become underscores, length capped at 255.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        let mapped = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        out.push(mapped);
        if out.chars().count() >= 255 {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::parse_amount_to_cents;
    use crate::model::{bill_id, BillSource};
    use serde_json::Map;

    fn bill(desc: &str, cents: i64, date: NaiveDate) -> ParsedBill {
        let time = date.and_hms_opt(12, 0, 0).unwrap();
        ParsedBill {
            id: bill_id(BillSource::Csv, "v.csv", 1, &time, cents, desc),
            amount_cents: cents,
            description: desc.to_string(),
            transaction_time: time,
            original_data: Map::new(),
            source: BillSource::Csv,
            category: None,
            payment_method: None,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn amount_boundaries_are_inclusive() {
        assert!(validate_amount_cents(1)); // 0.01
        assert!(validate_amount_cents(-1)); // -0.01
        assert!(validate_amount_cents(MAX_AMOUNT_CENTS)); // 10,000,000.00
        assert!(!validate_amount_cents(MAX_AMOUNT_CENTS + 100)); // 10,000,001.00
        assert!(!validate_amount_cents(0));
        // 0.009 yuan truncates to zero cents and is therefore invalid.
        assert!(!validate_amount_cents(parse_amount_to_cents("0.009").unwrap()));
    }

    #[test]
    fn issues_are_collected_not_thrown() {
        let bills = vec![
            bill("正常", -5050, d(2024, 1, 1)),
            bill("  ", -5050, d(2024, 1, 1)),
            bill("金额超限", -MAX_AMOUNT_CENTS - 1, d(2024, 1, 1)),
            bill("太早", -100, d(1989, 12, 31)),
            bill("太晚", -100, d(2031, 1, 1)),
        ];
        let issues = validate_bills(&bills);
        assert_eq!(issues.len(), 4);
        assert_eq!(issues[0].kind, IssueKind::EmptyDescription);
        assert_eq!(issues[0].index, 1);
        assert_eq!(issues[1].kind, IssueKind::AmountOutOfRange);
        assert_eq!(issues[2].kind, IssueKind::DateOutOfRange);
        assert_eq!(issues[3].kind, IssueKind::DateOutOfRange);
    }

    #[test]
    fn sanitize_partitions_valid_and_dropped() {
        let bills = vec![
            bill("正常", -5050, d(2024, 1, 1)),
            bill("", -5050, d(2024, 1, 1)),
        ];
        let (valid, dropped) = sanitize_bills(bills);
        assert_eq!(valid.len(), 1);
        assert_eq!(dropped.len(), 1);
        assert_eq!(valid[0].description, "正常");
    }

    #[test]
    fn rich_text_strips_dangerous_markup() {
        let input = "备注<script>alert(1)</script>正文<iframe src=\"x\"></iframe>";
        assert_eq!(sanitize_rich_text(input), "备注正文");

        let handlers = "<img src=x onerror=\"alert(1)\">";
        let out = sanitize_rich_text(handlers);
        assert!(!out.contains("onerror"));

        assert_eq!(sanitize_rich_text("点击javascript:alert(1)"), "点击alert(1)");
    }

    #[test]
    fn image_data_uris_survive() {
        let image = "data:image/png;base64,AAAA";
        assert_eq!(sanitize_rich_text(image), image);
        // The payload goes with the scheme, no ";base64,…" residue.
        assert_eq!(sanitize_rich_text("data:text/html;base64,AAAA"), "");
        assert_eq!(
            sanitize_rich_text("<a href=\"data:text/html;base64,AAAA\">x</a>"),
            "<a href=\"\">x</a>"
        );
    }

    #[test]
    fn filenames_lose_separators_and_get_capped() {
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_filename("a:b*c?.csv"), "a_b_c_.csv");
        let long = "x".repeat(300);
        assert_eq!(sanitize_filename(&long).chars().count(), 255);
    }
}
