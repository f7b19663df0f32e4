use std::path::Path;

use serde_json::{Map, Value};

use crate::amount::parse_amount_to_cents;
use crate::column_map::{find_header_row_heuristic, resolve_columns, ColumnMapping};
use crate::error::BillError;
use crate::model::{
    bill_id, resolve_transaction_time, BillSource, DateParsePolicy, ParseOutcome, ParsedBill,
};
use crate::tabular::{read_rows, row_get, row_is_empty};

/// Direction tokens marking outgoing money across bank export dialects.
const EXPENSE_TOKENS: &[&str] = &["支出", "付款", "消费", "借", "out", "expense", "debit"];

fn direction_is_expense(direction: &str) -> bool {
    let lower = direction.to_lowercase();
    EXPENSE_TOKENS.iter().any(|t| lower.contains(t))
}

fn original_data_for_row(header: &[String], row: &[String]) -> Map<String, Value> {
    let mut data = Map::new();
    for (idx, name) in header.iter().enumerate() {
        let key = if name.is_empty() {
            format!("col{idx}")
        } else {
            name.clone()
        };
        data.insert(
            key,
            Value::String(row.get(idx).cloned().unwrap_or_default()),
        );
    }
    data
}

/// Row loop shared by the heuristic and recognizer-assisted parsers.
///
/// With a direction column the filter keeps expense rows only and the parsed
/// magnitude is negated. Without one the filter is skipped: negative amounts
/// pass through, positive amounts are treated as expense magnitudes.
pub(crate) fn parse_with_mapping(
    rows: &[Vec<String>],
    header_idx: usize,
    mapping: &ColumnMapping,
    file_name: &str,
    source: BillSource,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    let header = &rows[header_idx];
    let mut outcome = ParseOutcome::default();

    for (offset, row) in rows[(header_idx + 1)..].iter().enumerate() {
        let line_no = header_idx + 2 + offset;
        if row_is_empty(row) {
            continue;
        }

        if let Some(dir_idx) = mapping.direction {
            let direction = row_get(row, Some(dir_idx));
            if !direction_is_expense(&direction) {
                continue;
            }
        }

        let amount_raw = row_get(row, Some(mapping.amount));
        let cents = match parse_amount_to_cents(&amount_raw) {
            Ok(v) if v != 0 => v,
            Ok(_) => {
                outcome.skipped_rows += 1;
                outcome.row_errors.push(format!("第{line_no}行: 金额为 0"));
                continue;
            }
            Err(err) => {
                outcome.skipped_rows += 1;
                outcome.row_errors.push(format!("第{line_no}行: {err}"));
                continue;
            }
        };
        let amount_cents = if mapping.direction.is_some() {
            -cents.abs()
        } else if cents > 0 {
            -cents
        } else {
            cents
        };

        let time_raw = row_get(row, Some(mapping.time));
        let time = match resolve_transaction_time(&time_raw, policy) {
            Ok(Some(t)) => t,
            Ok(None) => {
                outcome.skipped_rows += 1;
                outcome
                    .row_errors
                    .push(format!("第{line_no}行: 日期无法解析: {time_raw}"));
                continue;
            }
            Err(err) => return Err(BillError::InvalidDate(format!("第{line_no}行: {err}"))),
        };

        let mut description = row_get(row, mapping.description);
        if description.is_empty() {
            description = row_get(row, mapping.counterparty);
        }

        let id = bill_id(source, file_name, line_no, &time, amount_cents, &description);
        outcome.bills.push(ParsedBill {
            id,
            amount_cents,
            description,
            transaction_time: time,
            original_data: original_data_for_row(header, row),
            source,
            category: None,
            payment_method: None,
        });
    }

    Ok(outcome)
}

/// Generic CSV/bank parser: heuristic header location (best-effort fallback
/// to the first row), keyword-based column roles.
pub fn parse_csv_rows(
    rows: &[Vec<String>],
    file_name: &str,
    source: BillSource,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    if rows.is_empty() {
        return Ok(ParseOutcome::default());
    }
    let header_idx = find_header_row_heuristic(rows).unwrap_or(0);
    let mapping = resolve_columns(&rows[header_idx])?;
    parse_with_mapping(rows, header_idx, &mapping, file_name, source, policy)
}

pub fn parse_csv_file(
    path: &Path,
    source: BillSource,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    let rows = read_rows(path)?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    parse_csv_rows(&rows, file_name, source, policy)
}
