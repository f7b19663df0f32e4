use serde::{Deserialize, Serialize};

use crate::model::CancelFlag;
use crate::rules::{Account, AccountMapper};

/// The closed classification vocabulary shared by rule-based and AI-based
/// classification. Category ids are stable; account paths are their ledger
/// projection.
pub const STANDARD_CATEGORIES: &[(&str, &str)] = &[
    ("Food-Dining", "Expenses:Food:Dining"),
    ("Food-Delivery", "Expenses:Food:Delivery"),
    ("Food-Groceries", "Expenses:Food:Groceries"),
    ("Transport-Public", "Expenses:Transport:Public"),
    ("Transport-Taxi", "Expenses:Transport:Taxi"),
    ("Shopping-Online", "Expenses:Shopping:Online"),
    ("Shopping-Retail", "Expenses:Shopping:Retail"),
    ("Entertainment", "Expenses:Entertainment"),
    ("Health-Medical", "Expenses:Health:Medical"),
    ("Education", "Expenses:Education"),
    ("Housing-Rent", "Expenses:Housing:Rent"),
    ("Utilities-Home", "Expenses:Utilities:Home"),
    ("Communication-Phone", "Expenses:Communication:Phone"),
    ("Travel", "Expenses:Travel"),
    ("Transfer-Out", "Expenses:Transfer"),
    ("Income-Refunds", "Income:Refunds"),
];

pub fn category_account(category: &str) -> Option<Account> {
    STANDARD_CATEGORIES
        .iter()
        .find(|(id, _)| *id == category)
        .and_then(|(_, path)| Account::parse(path).ok())
}

pub fn account_category(account: &Account) -> Option<&'static str> {
    STANDARD_CATEGORIES
        .iter()
        .find(|(_, path)| *path == account.as_str())
        .map(|(id, _)| *id)
}

pub fn standard_accounts() -> Vec<String> {
    STANDARD_CATEGORIES
        .iter()
        .map(|(_, path)| (*path).to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizeRequest {
    pub description: String,
    pub amount_cents: i64,
    pub available_accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizeResponse {
    pub account: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub description: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCategory {
    pub description: String,
    pub category: String,
    pub reasoning: Option<String>,
}

/// External classification service boundary. Errors are degradation signals.
pub trait BillCategorizer {
    fn categorize(&self, request: &CategorizeRequest) -> Result<CategorizeResponse, String>;

    fn categorize_batch(&self, items: &[BatchItem]) -> Result<Vec<BatchCategory>, String> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let response = self.categorize(&CategorizeRequest {
                description: item.description.clone(),
                amount_cents: item.amount_cents,
                available_accounts: standard_accounts(),
            })?;
            let category = Account::parse(&response.account)
                .ok()
                .and_then(|a| account_category(&a))
                .unwrap_or("Food-Dining")
                .to_string();
            out.push(BatchCategory {
                description: item.description.clone(),
                category,
                reasoning: response.reasoning,
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Rule,
    Service,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct CategoryDecision {
    pub account: Account,
    pub confidence: f64,
    pub source: DecisionSource,
}

/// Rules first; the external service only runs when no rule matched. Service
/// failure (after one retry) or cancellation degrades to the default expense
/// account with confidence 0 instead of propagating.
pub fn smart_categorize(
    mapper: &AccountMapper,
    categorizer: Option<&dyn BillCategorizer>,
    description: &str,
    amount_cents: i64,
    cancel: &CancelFlag,
) -> CategoryDecision {
    if amount_cents >= 0 {
        return CategoryDecision {
            account: mapper.default_income.clone(),
            confidence: 1.0,
            source: DecisionSource::Rule,
        };
    }

    if let Some(rule) = mapper.rules.match_rule(description) {
        return CategoryDecision {
            account: rule.account.clone(),
            confidence: 1.0,
            source: DecisionSource::Rule,
        };
    }

    let fallback = CategoryDecision {
        account: mapper.default_expense.clone(),
        confidence: 0.0,
        source: DecisionSource::Fallback,
    };

    let Some(categorizer) = categorizer else {
        return fallback;
    };

    let request = CategorizeRequest {
        description: description.to_string(),
        amount_cents,
        available_accounts: standard_accounts(),
    };
    for attempt in 0..2 {
        if cancel.is_cancelled() {
            log::warn!("分类服务调用已取消，使用默认支出账户");
            return fallback;
        }
        match categorizer.categorize(&request) {
            Ok(response) => match Account::parse(&response.account) {
                Ok(account) => {
                    return CategoryDecision {
                        account,
                        confidence: response.confidence,
                        source: DecisionSource::Service,
                    }
                }
                Err(err) => {
                    log::warn!("分类服务返回非法账户: {err}");
                    return fallback;
                }
            },
            Err(err) => {
                log::warn!("分类服务调用失败（第 {} 次）: {err}", attempt + 1);
            }
        }
    }
    fallback
}
