use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::rules::Account;

/// Closed set of bill origins. `Auto` is only valid as a declared input tag;
/// the pipeline resolves it to a concrete source before dispatching a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillSource {
    Alipay,
    Wechat,
    Bank,
    Csv,
    Auto,
}

impl BillSource {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Alipay => "alipay",
            Self::Wechat => "wechat",
            Self::Bank => "bank",
            Self::Csv => "csv",
            Self::Auto => "auto",
        }
    }

    /// Filename-substring inference, used when the caller declares `Auto`.
    pub fn infer_from_filename(name: &str) -> BillSource {
        let lower = name.to_lowercase();
        if lower.contains("alipay") || lower.contains("支付宝") {
            return Self::Alipay;
        }
        if lower.contains("wechat") || lower.contains("weixin") || lower.contains("微信") {
            return Self::Wechat;
        }
        if lower.contains("bank") || lower.contains("银行") {
            return Self::Bank;
        }
        Self::Csv
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Credit,
    Debit,
    Balance,
    Other,
}

impl PaymentKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Credit => "信用卡",
            Self::Debit => "储蓄卡",
            Self::Balance => "余额",
            Self::Other => "其他",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodInfo {
    pub bank_name: String,
    pub kind: PaymentKind,
    pub last_four: Option<String>,
    pub full_description: String,
    pub account: Account,
}

/// One normalized transaction extracted from a source file. Enriched in place
/// by the resolver/classifier stages, read-only once it reaches the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedBill {
    pub id: String,
    /// Signed cents, expense negative.
    pub amount_cents: i64,
    pub description: String,
    pub transaction_time: NaiveDateTime,
    /// Verbatim source cells keyed by header name. Audit only, never
    /// interpreted downstream.
    pub original_data: Map<String, Value>,
    pub source: BillSource,
    pub category: Option<String>,
    pub payment_method: Option<PaymentMethodInfo>,
}

impl ParsedBill {
    pub fn date_text(&self) -> String {
        self.transaction_time.format("%Y-%m-%d").to_string()
    }
}

/// Content-addressed bill id, stable across re-parses of the same row.
pub fn bill_id(
    source: BillSource,
    file_name: &str,
    row_index: usize,
    time: &NaiveDateTime,
    amount_cents: i64,
    description: &str,
) -> String {
    let seed = format!(
        "billbean:{}:{}:{}:{}:{}:{}",
        source.tag(),
        file_name,
        row_index,
        time.format("%Y-%m-%d %H:%M:%S"),
        amount_cents,
        description
    );
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes());
    let hex = digest.simple().to_string();
    format!("bill_{}", &hex[..16])
}

/// What a parser does when a row's date does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateParsePolicy {
    /// Substitute the current local timestamp (historical behavior).
    #[default]
    Now,
    /// Fail the whole file.
    Reject,
    /// Drop the row with a counted diagnostic.
    SkipRow,
}

fn normalize_date_text(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .replace('年', "-")
        .replace('月', "-")
        .replace('日', " ")
        .replace('/', "-")
        .replace('：', ":")
        .trim()
        .to_string()
}

/// Parses a locale-normalized timestamp. Accepts `YYYY-MM-DD[ HH:MM[:SS]]`,
/// CJK year/month/day glyphs and Excel serial day numbers.
pub fn parse_transaction_time(raw: &str) -> Result<NaiveDateTime, String> {
    let text = normalize_date_text(raw);
    if text.is_empty() {
        return Err("缺少日期字段".to_string());
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&text, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }

    // Excel stores dates as day counts from 1899-12-30.
    if let Ok(serial) = text.parse::<f64>() {
        if serial.is_finite() && serial > 0.0 {
            let base = NaiveDate::from_ymd_opt(1899, 12, 30)
                .ok_or_else(|| "内部日期基准错误".to_string())?;
            if let Some(d) = base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
            {
                if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                    return Ok(dt);
                }
            }
        }
    }

    Err(format!("日期格式不支持: {raw}"))
}

/// Applies the date-parse policy. `Ok(None)` means "drop this row".
pub fn resolve_transaction_time(
    raw: &str,
    policy: DateParsePolicy,
) -> Result<Option<NaiveDateTime>, String> {
    match parse_transaction_time(raw) {
        Ok(dt) => Ok(Some(dt)),
        Err(err) => match policy {
            DateParsePolicy::Now => Ok(Some(Local::now().naive_local())),
            DateParsePolicy::SkipRow => Ok(None),
            DateParsePolicy::Reject => Err(err),
        },
    }
}

/// Result of parsing one file. Row-level problems never fail the file; they
/// are counted and carried here as diagnostics.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub bills: Vec<ParsedBill>,
    pub skipped_rows: usize,
    pub row_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Advisory finding keyed by bill id or category name. Never blocks the
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub key: String,
    pub reason: String,
    pub severity: Severity,
}

/// Cooperative cancellation for external service calls.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
