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

const WECHAT_ALIAS_SPECS: &[AliasSpec] = &[
    AliasSpec {
        field: "time",
        aliases: &["交易时间"],
    },
    AliasSpec {
        field: "kind",
        aliases: &["交易类型"],
    },
    AliasSpec {
        field: "counterparty",
        aliases: &["交易对方"],
    },
    AliasSpec {
        field: "description",
        aliases: &["商品", "商品说明"],
    },
    AliasSpec {
        field: "direction",
        aliases: &["收/支", "收支"],
    },
    AliasSpec {
        field: "amount",
        aliases: &["金额(元)", "金额（元）", "金额"],
    },
    AliasSpec {
        field: "payment_method",
        aliases: &["支付方式"],
    },
    AliasSpec {
        field: "status",
        aliases: &["当前状态", "交易状态"],
    },
];

const REQUIRED_FIELDS: &[&str] = &["time", "amount", "direction"];

/// WeChat marks completed payments with several distinct status texts.
const SUCCESS_TOKENS: &[&str] = &[
    "成功",
    "已转账",
    "已存入零钱",
    "对方已收钱",
    "朋友已收钱",
    "已到账",
    "充值完成",
];

fn status_is_success(status: &str) -> bool {
    status.is_empty() || SUCCESS_TOKENS.iter().any(|t| status.contains(t))
}

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

/// Parses WeChat Pay export rows: successful expense rows only.
pub fn parse_wechat_rows(
    rows: &[Vec<String>],
    file_name: &str,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    let (header_idx, mapping) = find_alias_header_row(rows, WECHAT_ALIAS_SPECS, REQUIRED_FIELDS)?;
    let header = &rows[header_idx];
    let mut outcome = ParseOutcome::default();

    for (offset, row) in rows[(header_idx + 1)..].iter().enumerate() {
        let line_no = header_idx + 2 + offset;
        if row_is_empty(row) {
            continue;
        }

        let status = row_get(row, mapping.get("status").copied());
        if !status_is_success(&status) {
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

        // WeChat often leaves 商品 as "/"; fall back through the other
        // descriptive columns.
        let mut description = row_get(row, mapping.get("description").copied());
        if description.is_empty() || description == "/" {
            description = row_get(row, mapping.get("counterparty").copied());
        }
        if description.is_empty() || description == "/" {
            description = row_get(row, mapping.get("kind").copied());
        }

        let payment_raw = row_get(row, mapping.get("payment_method").copied());
        let payment_method = if payment_raw.is_empty() || payment_raw == "/" {
            None
        } else {
            Some(resolve_payment_method(&payment_raw))
        };

        let id = bill_id(
            BillSource::Wechat,
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
            source: BillSource::Wechat,
            category: None,
            payment_method,
        });
    }

    Ok(outcome)
}

pub fn parse_wechat_file(path: &Path, policy: DateParsePolicy) -> Result<ParseOutcome, BillError> {
    let rows = read_rows(path)?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    parse_wechat_rows(&rows, file_name, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PaymentKind;

    fn fixture_rows() -> Vec<Vec<String>> {
        let text = "\
微信支付账单明细
导出时间:[2024-02-01 10:00:00]
交易时间,交易类型,交易对方,商品,收/支,金额(元),支付方式,当前状态
2024-01-10 19:22:00,商户消费,瑞幸咖啡,拿铁,支出,¥18.00,零钱,支付成功
2024-01-11 09:00:00,转账,李四,/,支出,¥200.00,招商银行储蓄卡(6011),已转账
2024-01-12 12:00:00,红包,王五,/,收入,¥66.00,/,已存入零钱
2024-01-13 20:00:00,商户消费,超市,购物,支出,¥0,零钱,支付成功";
        text.lines()
            .map(|l| l.split(',').map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn filters_to_successful_expenses() {
        let outcome =
            parse_wechat_rows(&fixture_rows(), "wechat.csv", DateParsePolicy::Now).unwrap();
        assert_eq!(outcome.bills.len(), 2);
        assert_eq!(outcome.skipped_rows, 1); // zero-amount row

        let coffee = &outcome.bills[0];
        assert_eq!(coffee.amount_cents, -1800);
        assert_eq!(coffee.description, "拿铁");
        assert_eq!(coffee.source, BillSource::Wechat);
        assert_eq!(
            coffee.payment_method.as_ref().unwrap().account.as_str(),
            "Assets:Wechat:Balance"
        );
    }

    #[test]
    fn slash_description_falls_back_to_counterparty() {
        let outcome =
            parse_wechat_rows(&fixture_rows(), "wechat.csv", DateParsePolicy::Now).unwrap();
        let transfer = &outcome.bills[1];
        assert_eq!(transfer.description, "李四");
        let method = transfer.payment_method.as_ref().unwrap();
        assert_eq!(method.kind, PaymentKind::Debit);
        assert_eq!(method.account.as_str(), "Assets:Bank:CMB");
    }

    #[test]
    fn income_rows_never_survive() {
        let outcome =
            parse_wechat_rows(&fixture_rows(), "wechat.csv", DateParsePolicy::Now).unwrap();
        assert!(outcome
            .bills
            .iter()
            .all(|b| b.original_data.get("收/支").and_then(Value::as_str) == Some("支出")));
    }
}
