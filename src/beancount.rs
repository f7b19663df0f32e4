use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::amount::format_amount_cents;
use crate::categorize::category_account;
use crate::model::ParsedBill;
use crate::rules::{Account, AccountMapper};

#[derive(Debug, Clone, Serialize)]
pub struct Posting {
    pub account: Account,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub flag: char,
    pub payee: Option<String>,
    pub narration: String,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// Signed sum of the postings; zero for every well-formed transaction.
    pub fn posting_sum_cents(&self) -> i64 {
        self.postings.iter().map(|p| p.amount_cents).sum()
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub currency: String,
    pub include_header: bool,
    pub include_open_directives: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            currency: "CNY".to_string(),
            include_header: true,
            include_open_directives: true,
        }
    }
}

/// Rendered ledger text plus the transactions it was built from, so callers
/// can count and inspect structurally instead of re-parsing the text.
#[derive(Debug)]
pub struct GeneratedLedger {
    pub content: String,
    pub transactions: Vec<Transaction>,
}

const DASH_SEPARATORS: &[char] = &['-', '－', '—', '–'];

/// Splits `美团-外卖订单` style descriptions into payee and narration on the
/// first dash-class character. No separator means the whole text is the
/// narration.
pub fn split_payee_narration(description: &str) -> (Option<String>, String) {
    if let Some(pos) = description.find(DASH_SEPARATORS) {
        let payee = description[..pos].trim();
        let sep_len = description[pos..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(1);
        let narration = description[pos + sep_len..].trim();
        if !payee.is_empty() && !narration.is_empty() {
            return (Some(payee.to_string()), narration.to_string());
        }
    }
    (None, description.trim().to_string())
}

fn resolved_category_account(bill: &ParsedBill, mapper: &AccountMapper) -> Account {
    if let Some(category) = &bill.category {
        if let Some(account) = category_account(category) {
            return account;
        }
    }
    mapper.category_account(&bill.description, bill.amount_cents)
}

/// Builds one double-entry transaction for a bill. Expense: category debited,
/// asset credited; income the reverse. The two postings always sum to zero.
pub fn build_transaction(bill: &ParsedBill, mapper: &AccountMapper, currency: &str) -> Transaction {
    let asset_account = bill
        .payment_method
        .as_ref()
        .map(|m| m.account.clone())
        .unwrap_or_else(|| mapper.asset_account(Some(bill.source.tag())));
    let category_account = resolved_category_account(bill, mapper);

    let magnitude = bill.amount_cents.abs();
    let is_expense = bill.amount_cents < 0;
    let postings = if is_expense {
        vec![
            Posting {
                account: category_account,
                amount_cents: magnitude,
                currency: currency.to_string(),
            },
            Posting {
                account: asset_account,
                amount_cents: -magnitude,
                currency: currency.to_string(),
            },
        ]
    } else {
        vec![
            Posting {
                account: asset_account,
                amount_cents: magnitude,
                currency: currency.to_string(),
            },
            Posting {
                account: category_account,
                amount_cents: -magnitude,
                currency: currency.to_string(),
            },
        ]
    };

    let (payee, narration) = split_payee_narration(&bill.description);
    Transaction {
        date: bill.transaction_time.date(),
        flag: '*',
        payee,
        narration,
        tags: Vec::new(),
        links: Vec::new(),
        postings,
    }
}

fn escape_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn render_transaction(tx: &Transaction, out: &mut String) {
    out.push_str(&tx.date.format("%Y-%m-%d").to_string());
    out.push(' ');
    out.push(tx.flag);
    if let Some(payee) = &tx.payee {
        out.push_str(&format!(" \"{}\"", escape_quoted(payee)));
    }
    out.push_str(&format!(" \"{}\"", escape_quoted(&tx.narration)));
    for tag in &tx.tags {
        out.push_str(&format!(" #{tag}"));
    }
    for link in &tx.links {
        out.push_str(&format!(" ^{link}"));
    }
    out.push('\n');
    for posting in &tx.postings {
        out.push_str(&format!(
            "  {}  {} {}\n",
            posting.account,
            format_amount_cents(posting.amount_cents),
            posting.currency
        ));
    }
}

/// Renders the full ledger: optional header comment, optional Open directives
/// for every referenced account, then blank-line separated transactions.
pub fn generate_beancount(
    bills: &[ParsedBill],
    mapper: &AccountMapper,
    options: &GeneratorOptions,
) -> GeneratedLedger {
    let transactions: Vec<Transaction> = bills
        .iter()
        .map(|bill| build_transaction(bill, mapper, &options.currency))
        .collect();

    let mut content = String::new();
    let today = Local::now().date_naive();
    if options.include_header {
        content.push_str(&format!(
            "; 账单导入 {} 生成，共 {} 笔交易\n\n",
            today.format("%Y-%m-%d"),
            transactions.len()
        ));
    }
    if options.include_open_directives {
        let mut accounts: Vec<String> = transactions
            .iter()
            .flat_map(|tx| tx.postings.iter().map(|p| p.account.as_str().to_string()))
            .collect();
        accounts.sort();
        accounts.dedup();
        for account in &accounts {
            content.push_str(&format!(
                "{} open {} {}\n",
                today.format("%Y-%m-%d"),
                account,
                options.currency
            ));
        }
        if !accounts.is_empty() {
            content.push('\n');
        }
    }
    for (idx, tx) in transactions.iter().enumerate() {
        if idx > 0 {
            content.push('\n');
        }
        render_transaction(tx, &mut content);
    }

    GeneratedLedger {
        content,
        transactions,
    }
}
