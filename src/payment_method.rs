use std::sync::OnceLock;

use regex::Regex;

use crate::model::{PaymentKind, PaymentMethodInfo};
use crate::rules::Account;

/// Ordered prefix table; more specific names must precede "中国".
const BANK_CODES: &[(&str, &str)] = &[
    ("招商", "CMB"),
    ("工商", "ICBC"),
    ("建设", "CCB"),
    ("农业", "ABC"),
    ("交通", "BOCOM"),
    ("汇丰", "HSBC"),
    ("浦发", "SPDB"),
    ("民生", "CMBC"),
    ("兴业", "CIB"),
    ("中信", "CITIC"),
    ("光大", "CEB"),
    ("平安", "PAB"),
    ("广发", "CGB"),
    ("邮储", "PSBC"),
    ("邮政", "PSBC"),
    ("华夏", "HXB"),
    ("北京", "BOB"),
    ("宁波", "NBCB"),
    ("中国", "BOC"),
];

fn credit_card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^（(]+?)(?:（[^）]*）|\([^)]*\))?\s*信用卡\s*[（(](\d{4})[）)]")
            .expect("invalid credit card regex")
    })
}

fn debit_card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^（(]+?)(?:（[^）]*）|\([^)]*\))?\s*储蓄卡\s*[（(](\d{4})[）)]")
            .expect("invalid debit card regex")
    })
}

fn bracket_note_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"（[^）]*）|\([^)]*\)").expect("invalid bracket regex"))
}

/// Strips bracketed notes and the trailing 银行 suffix.
fn normalize_bank_name(raw: &str) -> String {
    let stripped = bracket_note_re().replace_all(raw, "");
    stripped
        .trim()
        .trim_end_matches("银行")
        .trim()
        .to_string()
}

/// Fixed bank-name→code table; unknown banks pass through their normalized
/// Chinese name as the code.
fn bank_code(normalized: &str) -> String {
    for (name, code) in BANK_CODES {
        if normalized.contains(name) {
            return (*code).to_string();
        }
    }
    normalized.to_string()
}

fn builtin_account(path: &str) -> Account {
    Account::parse(path).expect("invalid builtin payment account")
}

fn default_info(full_description: &str) -> PaymentMethodInfo {
    PaymentMethodInfo {
        bank_name: "其他".to_string(),
        kind: PaymentKind::Other,
        last_four: None,
        full_description: full_description.to_string(),
        account: builtin_account("Assets:Cash"),
    }
}

/// Pure function from a free-text payment-method field to an asset/liability
/// identity. First matching pattern wins; empty input yields the default
/// without erroring.
pub fn resolve_payment_method(text: &str) -> PaymentMethodInfo {
    let full = text.trim();
    if full.is_empty() {
        return default_info(full);
    }

    if let Some(caps) = credit_card_re().captures(full) {
        let bank = normalize_bank_name(caps.get(1).map(|m| m.as_str()).unwrap_or_default());
        let code = bank_code(&bank);
        let last_four = caps.get(2).map(|m| m.as_str().to_string());
        if let Ok(account) = Account::parse(&format!("Liabilities:CreditCard:{code}")) {
            return PaymentMethodInfo {
                bank_name: bank,
                kind: PaymentKind::Credit,
                last_four,
                full_description: full.to_string(),
                account,
            };
        }
    }

    if let Some(caps) = debit_card_re().captures(full) {
        let bank = normalize_bank_name(caps.get(1).map(|m| m.as_str()).unwrap_or_default());
        let code = bank_code(&bank);
        let last_four = caps.get(2).map(|m| m.as_str().to_string());
        if let Ok(account) = Account::parse(&format!("Assets:Bank:{code}")) {
            return PaymentMethodInfo {
                bank_name: bank,
                kind: PaymentKind::Debit,
                last_four,
                full_description: full.to_string(),
                account,
            };
        }
    }

    if full.contains("余额宝") {
        return PaymentMethodInfo {
            bank_name: "支付宝".to_string(),
            kind: PaymentKind::Balance,
            last_four: None,
            full_description: full.to_string(),
            account: builtin_account("Assets:Alipay:Yuebao"),
        };
    }

    if full.contains("账户余额") || full.contains("支付宝余额") {
        return PaymentMethodInfo {
            bank_name: "支付宝".to_string(),
            kind: PaymentKind::Balance,
            last_four: None,
            full_description: full.to_string(),
            account: builtin_account("Assets:Alipay:Balance"),
        };
    }

    if full.contains("零钱") {
        return PaymentMethodInfo {
            bank_name: "微信".to_string(),
            kind: PaymentKind::Balance,
            last_four: None,
            full_description: full.to_string(),
            account: builtin_account("Assets:Wechat:Balance"),
        };
    }

    default_info(full)
}
