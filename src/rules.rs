use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BillError;

fn account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Colon-delimited segments, each starting with an uppercase ASCII letter
    // or a non-ASCII character (bank codes may pass through as Chinese text).
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Z]|[^\x00-\x7F])(?:[A-Za-z0-9-]|[^\x00-\x7F])*(?::(?:[A-Z]|[^\x00-\x7F])(?:[A-Za-z0-9-]|[^\x00-\x7F])*)+$")
            .expect("invalid account regex")
    })
}

/// Validated ledger account path, e.g. `Expenses:Food:Dining`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account(String);

impl Account {
    pub fn parse(raw: &str) -> Result<Account, String> {
        let text = raw.trim();
        if text.is_empty() {
            return Err("账户不能为空".to_string());
        }
        if !account_re().is_match(text) {
            return Err(format!("账户格式不合法: {text}（需形如 Expenses:Food:Dining）"));
        }
        Ok(Account(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Account {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Account::parse(&value)
    }
}

impl From<Account> for String {
    fn from(value: Account) -> Self {
        value.0
    }
}

/// Matching strategy for one category rule. Substring patterns support `|`
/// alternatives and match case-insensitively; regex patterns are compiled at
/// construction so a bad pattern fails loudly, never at match time.
#[derive(Debug, Clone)]
pub enum RulePattern {
    Regex(Regex),
    Substring(String),
}

impl RulePattern {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Regex(_) => "regex",
            Self::Substring(_) => "substring",
        }
    }

    pub fn pattern_text(&self) -> &str {
        match self {
            Self::Regex(re) => re.as_str(),
            Self::Substring(text) => text,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(text),
            Self::Substring(pattern) => {
                let target = text.to_lowercase();
                pattern
                    .split('|')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .any(|part| target.contains(&part.to_lowercase()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub pattern: RulePattern,
    pub account: Account,
    pub priority: i64,
    pub note: String,
}

impl CategoryRule {
    pub fn substring(pattern: &str, account: &str, priority: i64) -> Result<CategoryRule, BillError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(BillError::InvalidRule("pattern 不能为空".to_string()));
        }
        Ok(CategoryRule {
            pattern: RulePattern::Substring(pattern.to_string()),
            account: Account::parse(account).map_err(BillError::InvalidRule)?,
            priority,
            note: String::new(),
        })
    }

    pub fn regex(pattern: &str, account: &str, priority: i64) -> Result<CategoryRule, BillError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(BillError::InvalidRule("pattern 不能为空".to_string()));
        }
        let compiled = Regex::new(pattern)
            .map_err(|e| BillError::InvalidRule(format!("正则无法编译: {e}")))?;
        Ok(CategoryRule {
            pattern: RulePattern::Regex(compiled),
            account: Account::parse(account).map_err(BillError::InvalidRule)?,
            priority,
            note: String::new(),
        })
    }

    pub fn with_note(mut self, note: &str) -> CategoryRule {
        self.note = note.trim().to_string();
        self
    }
}

/// Serialized rule shape for import/export and transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleForm {
    pub kind: String,
    pub pattern: String,
    pub account: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub note: String,
}

impl RuleForm {
    pub fn into_rule(self) -> Result<CategoryRule, BillError> {
        let rule = match self.kind.trim().to_lowercase().as_str() {
            "regex" => CategoryRule::regex(&self.pattern, &self.account, self.priority)?,
            "substring" | "contains" => {
                CategoryRule::substring(&self.pattern, &self.account, self.priority)?
            }
            other => {
                return Err(BillError::InvalidRule(format!(
                    "kind 仅支持 regex/substring，收到: {other}"
                )))
            }
        };
        Ok(rule.with_note(&self.note))
    }

    pub fn from_rule(rule: &CategoryRule) -> RuleForm {
        RuleForm {
            kind: rule.pattern.kind().to_string(),
            pattern: rule.pattern.pattern_text().to_string(),
            account: rule.account.as_str().to_string(),
            priority: rule.priority,
            note: rule.note.clone(),
        }
    }
}

const DEFAULT_RULES: &[(&str, &str, i64)] = &[
    ("美团|外卖|饿了么", "Expenses:Food:Delivery", 10),
    ("淘宝|天猫|京东|拼多多", "Expenses:Shopping:Online", 10),
    ("滴滴|出租车|打车|高德打车", "Expenses:Transport:Taxi", 10),
    ("地铁|公交|轨道交通", "Expenses:Transport:Public", 10),
    ("超市|便利店|永辉|盒马|生鲜", "Expenses:Food:Groceries", 8),
    ("电影|影院|演出|游戏", "Expenses:Entertainment", 8),
    ("药房|药店|医院|诊所|体检", "Expenses:Health:Medical", 8),
    ("话费|流量|联通|移动|电信", "Expenses:Communication:Phone", 8),
    ("房租|物业费", "Expenses:Housing:Rent", 8),
    ("水费|电费|燃气费", "Expenses:Utilities:Home", 8),
    ("酒店|机票|火车票|12306|携程", "Expenses:Travel", 8),
    ("学费|课程|培训", "Expenses:Education", 8),
    ("餐|饭|面馆|食堂|咖啡|奶茶", "Expenses:Food:Dining", 5),
    ("转账", "Expenses:Transfer", 3),
];

/// Prioritized rule list. Kept sorted priority-descending; the stable sort
/// preserves insertion order among equal priorities.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl RuleSet {
    pub fn empty() -> RuleSet {
        RuleSet::default()
    }

    pub fn with_defaults() -> RuleSet {
        let mut set = RuleSet::default();
        for (pattern, account, priority) in DEFAULT_RULES {
            let rule = CategoryRule::substring(pattern, account, *priority)
                .expect("invalid builtin rule");
            set.rules.push(rule);
        }
        set.resort();
        set
    }

    fn resort(&mut self) {
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: CategoryRule) {
        self.rules.push(rule);
        self.resort();
    }

    /// Removes every rule whose pattern text equals `pattern`. Returns the
    /// number removed.
    pub fn remove_rule(&mut self, pattern: &str) -> usize {
        let before = self.rules.len();
        self.rules
            .retain(|r| r.pattern.pattern_text() != pattern.trim());
        before.saturating_sub(self.rules.len())
    }

    /// First rule matching `description`, in priority order.
    pub fn match_rule(&self, description: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.pattern.matches(description))
    }

    pub fn export_json(&self) -> String {
        let forms = self.rules.iter().map(RuleForm::from_rule).collect::<Vec<_>>();
        serde_json::to_string_pretty(&forms).unwrap_or_else(|_| "[]".to_string())
    }

    /// Appends rules from a JSON export. Malformed rules reject the whole
    /// import with a descriptive error; nothing is partially applied.
    pub fn import_json(&mut self, raw: &str) -> Result<usize, BillError> {
        let forms: Vec<RuleForm> = serde_json::from_str(raw)
            .map_err(|e| BillError::InvalidRule(format!("规则 JSON 无法解析: {e}")))?;
        let mut parsed = Vec::with_capacity(forms.len());
        for form in forms {
            parsed.push(form.into_rule()?);
        }
        let count = parsed.len();
        self.rules.extend(parsed);
        self.resort();
        Ok(count)
    }
}

const DEFAULT_METHOD_ACCOUNTS: &[(&str, &str)] = &[
    ("alipay", "Assets:Alipay:Balance"),
    ("支付宝", "Assets:Alipay:Balance"),
    ("wechat", "Assets:Wechat:Balance"),
    ("微信", "Assets:Wechat:Balance"),
    ("bank", "Assets:Bank:Card"),
    ("银行", "Assets:Bank:Card"),
];

/// Maps bill descriptions and payment sources to ledger accounts.
#[derive(Debug, Clone)]
pub struct AccountMapper {
    pub default_asset: Account,
    pub default_expense: Account,
    pub default_income: Account,
    method_accounts: HashMap<String, Account>,
    pub rules: RuleSet,
}

impl AccountMapper {
    pub fn new(rules: RuleSet) -> AccountMapper {
        let method_accounts = DEFAULT_METHOD_ACCOUNTS
            .iter()
            .map(|(k, v)| {
                (
                    k.to_lowercase(),
                    Account::parse(v).expect("invalid builtin method account"),
                )
            })
            .collect();
        AccountMapper {
            default_asset: Account::parse("Assets:Cash").expect("invalid builtin account"),
            default_expense: Account::parse("Expenses:Uncategorized")
                .expect("invalid builtin account"),
            default_income: Account::parse("Income:Other").expect("invalid builtin account"),
            method_accounts,
            rules,
        }
    }

    pub fn set_method_account(&mut self, method: &str, account: Account) {
        self.method_accounts
            .insert(method.trim().to_lowercase(), account);
    }

    /// Case-insensitive payment-method lookup; unknown or absent sources fall
    /// back to the default asset account.
    pub fn asset_account(&self, source: Option<&str>) -> Account {
        let key = source.unwrap_or_default().trim().to_lowercase();
        if key.is_empty() {
            return self.default_asset.clone();
        }
        self.method_accounts
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default_asset.clone())
    }

    /// Rule-based destination account. Income (non-negative) always maps to
    /// the default income account; rules apply to expenses only here.
    pub fn category_account(&self, description: &str, amount_cents: i64) -> Account {
        if amount_cents >= 0 {
            return self.default_income.clone();
        }
        self.rules
            .match_rule(description)
            .map(|r| r.account.clone())
            .unwrap_or_else(|| self.default_expense.clone())
    }
}

impl Default for AccountMapper {
    fn default() -> Self {
        AccountMapper::new(RuleSet::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_format_is_enforced() {
        assert!(Account::parse("Expenses:Food:Dining").is_ok());
        assert!(Account::parse("Liabilities:CreditCard:CMB").is_ok());
        assert!(Account::parse("Assets:Bank:招商").is_ok());
        assert!(Account::parse("expenses:food").is_err());
        assert!(Account::parse("Expenses").is_err());
        assert!(Account::parse("Expenses:").is_err());
        assert!(Account::parse("").is_err());
    }

    #[test]
    fn substring_pattern_supports_alternatives() {
        let rule = CategoryRule::substring("美团|外卖", "Expenses:Food:Delivery", 10).unwrap();
        assert!(rule.pattern.matches("美团订单"));
        assert!(rule.pattern.matches("饿了吗外卖"));
        assert!(!rule.pattern.matches("打车"));
    }

    #[test]
    fn higher_priority_rule_wins() {
        let mut set = RuleSet::empty();
        set.add_rule(CategoryRule::substring("外卖", "Expenses:Food:Dining", 5).unwrap());
        set.add_rule(CategoryRule::substring("外卖", "Expenses:Food:Delivery", 10).unwrap());
        let hit = set.match_rule("美团外卖").expect("rule should match");
        assert_eq!(hit.account.as_str(), "Expenses:Food:Delivery");
    }

    #[test]
    fn malformed_rules_are_rejected_with_reasons() {
        assert!(matches!(
            CategoryRule::substring("", "Expenses:Food:Dining", 1),
            Err(BillError::InvalidRule(_))
        ));
        assert!(matches!(
            CategoryRule::substring("外卖", "not-an-account", 1),
            Err(BillError::InvalidRule(_))
        ));
        assert!(matches!(
            CategoryRule::regex("([", "Expenses:Food:Dining", 1),
            Err(BillError::InvalidRule(_))
        ));
    }

    #[test]
    fn json_round_trip_preserves_rules() {
        let mut set = RuleSet::empty();
        set.add_rule(CategoryRule::substring("外卖", "Expenses:Food:Delivery", 10).unwrap());
        set.add_rule(CategoryRule::regex("^滴滴", "Expenses:Transport:Taxi", 8).unwrap());
        let json = set.export_json();

        let mut restored = RuleSet::empty();
        assert_eq!(restored.import_json(&json).unwrap(), 2);
        assert_eq!(
            restored.match_rule("滴滴出行").unwrap().account.as_str(),
            "Expenses:Transport:Taxi"
        );
    }

    #[test]
    fn import_rejects_bad_payload_atomically() {
        let mut set = RuleSet::empty();
        let bad = r#"[{"kind":"substring","pattern":"外卖","account":"Expenses:Food:Delivery"},
                      {"kind":"regex","pattern":"([","account":"Expenses:Transport:Taxi"}]"#;
        assert!(set.import_json(bad).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn mapper_defaults_and_method_table() {
        let mapper = AccountMapper::default();
        assert_eq!(
            mapper.asset_account(Some("Alipay")).as_str(),
            "Assets:Alipay:Balance"
        );
        assert_eq!(mapper.asset_account(Some("现金")).as_str(), "Assets:Cash");
        assert_eq!(mapper.asset_account(None).as_str(), "Assets:Cash");

        assert_eq!(
            mapper.category_account("美团外卖", -5050).as_str(),
            "Expenses:Food:Delivery"
        );
        assert_eq!(
            mapper.category_account("随便什么", -100).as_str(),
            "Expenses:Uncategorized"
        );
        // Income ignores rules.
        assert_eq!(mapper.category_account("美团外卖", 100).as_str(), "Income:Other");
    }
}
