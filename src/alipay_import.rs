use std::path::Path;

use serde_json::{Map, Value};

use crate::amount::parse_amount_to_cents;
use crate::column_map::{find_alias_header_row, AliasSpec};
use crate::error::BillError;
use crate::model::{
    bill_id, resolve_transaction_time, BillSource, DateParsePolicy, ParseOutcome, ParsedBill,
};
use crate::payment_method::resolve_payment_method;
use crate::tabular::{read_rows, row_get, row_is_empty};

const ALIPAY_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "time",
        aliases: &["交易时间", "交易创建时间", "付款时间"],
    },
    AliasSpec {
        field: "category",
        aliases: &["交易分类", "类型"],
    },
    AliasSpec {
        field: "counterparty",
        aliases: &["交易对方", "对方"],
    },
    AliasSpec {
        field: "description",
        aliases: &["商品说明", "商品名称", "商品"],
    },
    AliasSpec {
        field: "direction",
        aliases: &["收/支", "收支"],
    },
    AliasSpec {
        field: "amount",
        aliases: &["金额", "金额（元）", "金额(元)"],
    },
    AliasSpec {
        field: "payment_method",
        aliases: &["收/付款方式", "支付方式", "付款方式"],
    },
    AliasSpec {
        field: "status",
        aliases: &["交易状态", "当前状态"],
    },
];

const REQUIRED_FIELDS: &[&str] = &["time", "amount", "direction"];

fn original_data_for_row(header: &[String], row: &[String]) -> Map<String, Value> {
    let mut data = Map::new();
    for (idx, name) in header.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        data.insert(
            name.clone(),
            Value::String(row.get(idx).cloned().unwrap_or_default()),
        );
    }
    data
}

/// Parses Alipay export rows. Only successful expense rows survive the
/// inclusion filter; malformed rows are skipped and counted, never fatal.
pub fn parse_alipay_rows(
    rows: &[Vec<String>],
    file_name: &str,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    let (header_idx, mapping) = find_alias_header_row(rows, ALIPAY_ALIAS_SPECS, REQUIRED_FIELDS)?;
    let header = &rows[header_idx];
    let mut outcome = ParseOutcome::default();

    for (offset, row) in rows[(header_idx + 1)..].iter().enumerate() {
        let line_no = header_idx + 2 + offset;
        if row_is_empty(row) {
            continue;
        }

        // Inclusion filter: successful, outgoing rows only.
        let status = row_get(row, mapping.get("status").copied());
        if !status.is_empty() && !status.contains("成功") {
            continue;
        }
        let direction = row_get(row, mapping.get("direction").copied());
        if !direction.contains("支出") {
            continue;
        }

        let amount_raw = row_get(row, mapping.get("amount").copied());
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
        let amount_cents = -cents.abs();

        let time_raw = row_get(row, mapping.get("time").copied());
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

        let mut description = row_get(row, mapping.get("description").copied());
        if description.is_empty() {
            description = row_get(row, mapping.get("counterparty").copied());
        }

        let payment_raw = row_get(row, mapping.get("payment_method").copied());
        let payment_method = if payment_raw.is_empty() {
            None
        } else {
            Some(resolve_payment_method(&payment_raw))
        };

        let id = bill_id(
            BillSource::Alipay,
            file_name,
            line_no,
            &time,
            amount_cents,
            &description,
        );
        outcome.bills.push(ParsedBill {
            id,
            amount_cents,
            description,
            transaction_time: time,
            original_data: original_data_for_row(header, row),
            source: BillSource::Alipay,
            category: None,
            payment_method,
        });
    }

    Ok(outcome)
}

pub fn parse_alipay_file(path: &Path, policy: DateParsePolicy) -> Result<ParseOutcome, BillError> {
    let rows = read_rows(path)?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    parse_alipay_rows(&rows, file_name, policy)
}
