use std::collections::HashMap;

use serde::Serialize;

use crate::amount::format_amount_cents;
use crate::model::{Anomaly, ParsedBill, Severity};

const UNCATEGORIZED: &str = "未分类";

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub count: usize,
    pub total_cents: i64,
    pub max_cents: i64,
}

impl CategoryStats {
    pub fn average_cents(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_cents as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutlierConfig {
    pub min_sample_size: usize,
    pub max_ratio: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 3,
            max_ratio: 1.5,
        }
    }
}

/// Two historical outlier conventions, kept as named policies instead of
/// silently merged: `HighOnly` flags only the max-ratio breach, while
/// `HighAndMedium` adds a medium tier above twice the category average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierPolicy {
    HighOnly,
    HighAndMedium,
}

fn category_label(bill: &ParsedBill) -> String {
    bill.category
        .clone()
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

/// Groups bills by category and aggregates magnitude statistics.
pub fn category_stats(bills: &[ParsedBill]) -> HashMap<String, CategoryStats> {
    let mut stats: HashMap<String, CategoryStats> = HashMap::new();
    for bill in bills {
        let label = category_label(bill);
        let magnitude = bill.amount_cents.abs();
        let entry = stats.entry(label.clone()).or_insert_with(|| CategoryStats {
            category: label,
            count: 0,
            total_cents: 0,
            max_cents: 0,
        });
        entry.count += 1;
        entry.total_cents += magnitude;
        entry.max_cents = entry.max_cents.max(magnitude);
    }
    stats
}

/// Flags bills whose magnitude is unusual within their category. Categories
/// with fewer samples than `min_sample_size` are skipped entirely.
pub fn detect_outliers(
    bills: &[ParsedBill],
    stats: &HashMap<String, CategoryStats>,
    policy: OutlierPolicy,
    config: &OutlierConfig,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    for bill in bills {
        let label = category_label(bill);
        let Some(stat) = stats.get(&label) else {
            continue;
        };
        if stat.count < config.min_sample_size {
            continue;
        }
        let magnitude = bill.amount_cents.abs();
        if magnitude as f64 > stat.max_cents as f64 * config.max_ratio {
            anomalies.push(Anomaly {
                key: bill.id.clone(),
                reason: format!(
                    "{label} 类别出现异常大额交易 {}，超过历史最大值 {} 的 {:.1} 倍",
                    format_amount_cents(magnitude),
                    format_amount_cents(stat.max_cents),
                    config.max_ratio
                ),
                severity: Severity::High,
            });
        } else if policy == OutlierPolicy::HighAndMedium
            && magnitude as f64 > stat.average_cents() * 2.0
        {
            anomalies.push(Anomaly {
                key: bill.id.clone(),
                reason: format!(
                    "{label} 类别交易 {} 超过平均值的 2 倍",
                    format_amount_cents(magnitude)
                ),
                severity: Severity::Medium,
            });
        }
    }
    anomalies
}

/// Compares per-category spend against configured budget limits (both in
/// cents). Advisory only.
pub fn detect_budget_overruns(
    spent: &HashMap<String, i64>,
    budgets: &HashMap<String, i64>,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    for (category, spent_cents) in spent {
        let Some(budget_cents) = budgets.get(category) else {
            continue;
        };
        if spent_cents > budget_cents {
            anomalies.push(Anomaly {
                key: category.clone(),
                reason: format!(
                    "{category} 类别支出 {} 已超出预算 {}，超支 {}",
                    format_amount_cents(*spent_cents),
                    format_amount_cents(*budget_cents),
                    format_amount_cents(spent_cents - budget_cents)
                ),
                severity: Severity::Medium,
            });
        }
    }
    anomalies.sort_by(|a, b| a.key.cmp(&b.key));
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{bill_id, BillSource};
    use chrono::NaiveDate;
    use serde_json::Map;

    fn bill(desc: &str, amount_cents: i64, category: &str) -> ParsedBill {
        let time = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        ParsedBill {
            id: bill_id(BillSource::Csv, "t.csv", 1, &time, amount_cents, desc),
            amount_cents,
            description: desc.to_string(),
            transaction_time: time,
            original_data: Map::new(),
            source: BillSource::Csv,
            category: Some(category.to_string()),
            payment_method: None,
        }
    }

    #[test]
    fn small_categories_are_trusted() {
        let bills = vec![bill("a", -1000, "餐饮"), bill("b", -90000, "餐饮")];
        let stats = category_stats(&bills);
        let anomalies = detect_outliers(
            &bills,
            &stats,
            OutlierPolicy::HighAndMedium,
            &OutlierConfig::default(),
        );
        assert!(anomalies.is_empty());
    }

    #[test]
    fn medium_tier_only_under_the_wider_policy() {
        // Average ≈23.33 yuan, max 50 yuan. The 50-yuan bill exceeds twice
        // the average but not max*1.5.
        let bills = vec![
            bill("a", -1000, "餐饮"),
            bill("b", -1000, "餐饮"),
            bill("c", -5000, "餐饮"),
        ];
        let stats = category_stats(&bills);

        let high_only = detect_outliers(
            &bills,
            &stats,
            OutlierPolicy::HighOnly,
            &OutlierConfig::default(),
        );
        assert!(high_only.is_empty());

        let both = detect_outliers(
            &bills,
            &stats,
            OutlierPolicy::HighAndMedium,
            &OutlierConfig::default(),
        );
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].severity, Severity::Medium);
    }

    #[test]
    fn max_ratio_breach_is_high_against_historical_stats() {
        let history = vec![
            bill("a", -2000, "餐饮"),
            bill("b", -3000, "餐饮"),
            bill("c", -4000, "餐饮"),
        ];
        let stats = category_stats(&history);
        let incoming = vec![bill("d", -9000, "餐饮")];
        let anomalies = detect_outliers(
            &incoming,
            &stats,
            OutlierPolicy::HighOnly,
            &OutlierConfig::default(),
        );
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[0].key, incoming[0].id);
    }

    #[test]
    fn budget_overruns_name_the_overage() {
        let spent = HashMap::from([
            ("餐饮".to_string(), 150_000),
            ("购物".to_string(), 200_000),
        ]);
        let budgets = HashMap::from([
            ("餐饮".to_string(), 100_000),
            ("购物".to_string(), 150_000),
        ]);
        let anomalies = detect_budget_overruns(&spent, &budgets);
        assert_eq!(anomalies.len(), 2);
        assert!(anomalies.iter().all(|a| a.severity == Severity::Medium));
        let dining = anomalies.iter().find(|a| a.key == "餐饮").unwrap();
        assert!(dining.reason.contains("500.00"));
    }

    #[test]
    fn under_budget_is_quiet() {
        let spent = HashMap::from([("餐饮".to_string(), 80_000)]);
        let budgets = HashMap::from([("餐饮".to_string(), 100_000)]);
        assert!(detect_budget_overruns(&spent, &budgets).is_empty());
    }
}
