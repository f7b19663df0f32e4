use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::amount::format_amount_cents;
use crate::model::ParsedBill;

/// Content hash identifying "the same economic event": calendar date, signed
/// two-decimal amount and the case/whitespace-normalized description. Source
/// file and row position deliberately do not participate.
pub fn transaction_hash(bill: &ParsedBill) -> String {
    let canonical = format!(
        "{}|{}|{}",
        bill.date_text(),
        format_amount_cents(bill.amount_cents),
        bill.description.trim().to_lowercase()
    );
    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub unique: Vec<ParsedBill>,
    pub duplicates: Vec<ParsedBill>,
}

impl DedupOutcome {
    pub fn unique_count(&self) -> usize {
        self.unique.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }
}

/// Partitions `new_bills` against `existing` history. Each accepted bill's
/// hash joins the seen-set immediately, so within-batch repeats land in
/// `duplicates` too; the first occurrence wins and that ordering is part of
/// the contract.
pub fn deduplicate_bills(new_bills: Vec<ParsedBill>, existing: &[ParsedBill]) -> DedupOutcome {
    let mut seen: HashSet<String> = existing.iter().map(transaction_hash).collect();
    let mut outcome = DedupOutcome::default();
    for bill in new_bills {
        let hash = transaction_hash(&bill);
        if seen.insert(hash) {
            outcome.unique.push(bill);
        } else {
            outcome.duplicates.push(bill);
        }
    }
    outcome
}

pub fn remove_duplicates_within_batch(bills: Vec<ParsedBill>) -> DedupOutcome {
    deduplicate_bills(bills, &[])
}

/// Groups bills sharing a hash, keeping only groups with more than one
/// member. Reporting aid, never used for filtering.
pub fn find_duplicate_groups(bills: &[ParsedBill]) -> HashMap<String, Vec<&ParsedBill>> {
    let mut groups: HashMap<String, Vec<&ParsedBill>> = HashMap::new();
    for bill in bills {
        groups.entry(transaction_hash(bill)).or_default().push(bill);
    }
    groups.retain(|_, members| members.len() > 1);
    groups
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupReport {
    pub total_new: usize,
    pub unique_count: usize,
    pub duplicate_count: usize,
    /// Percentage of the incoming batch that was duplicate, rounded to 2dp.
    pub duplicate_rate: f64,
    /// Up to five example duplicates, "date description amount".
    pub samples: Vec<String>,
}

pub fn dedup_report(outcome: &DedupOutcome) -> DedupReport {
    let total_new = outcome.unique.len() + outcome.duplicates.len();
    let duplicate_rate = if total_new == 0 {
        0.0
    } else {
        let raw = outcome.duplicates.len() as f64 / total_new as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    };
    DedupReport {
        total_new,
        unique_count: outcome.unique.len(),
        duplicate_count: outcome.duplicates.len(),
        duplicate_rate,
        samples: outcome
            .duplicates
            .iter()
            .take(5)
            .map(|b| {
                format!(
                    "{} {} {}",
                    b.date_text(),
                    b.description,
                    format_amount_cents(b.amount_cents)
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{bill_id, BillSource};
    use chrono::NaiveDate;
    use serde_json::Map;

    fn bill(source: BillSource, file: &str, row: usize, desc: &str, cents: i64) -> ParsedBill {
        let time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        ParsedBill {
            id: bill_id(source, file, row, &time, cents, desc),
            amount_cents: cents,
            description: desc.to_string(),
            transaction_time: time,
            original_data: Map::new(),
            source,
            category: None,
            payment_method: None,
        }
    }

    #[test]
    fn hash_ignores_case_whitespace_and_origin() {
        let a = bill(BillSource::Alipay, "a.csv", 3, "  美团外卖 Waimai ", -5050);
        let b = bill(BillSource::Wechat, "b.csv", 9, "美团外卖 waimai", -5050);
        assert_eq!(transaction_hash(&a), transaction_hash(&b));
        assert_eq!(transaction_hash(&a), transaction_hash(&a));
    }

    #[test]
    fn hash_separates_distinct_events() {
        let a = bill(BillSource::Csv, "a.csv", 1, "超市", -3200);
        let amount = bill(BillSource::Csv, "a.csv", 1, "超市", -3300);
        let desc = bill(BillSource::Csv, "a.csv", 1, "便利店", -3200);
        assert_ne!(transaction_hash(&a), transaction_hash(&amount));
        assert_ne!(transaction_hash(&a), transaction_hash(&desc));
    }

    #[test]
    fn partition_is_complete_and_unique_has_no_repeats() {
        let new_bills = vec![
            bill(BillSource::Csv, "a.csv", 1, "超市", -3200),
            bill(BillSource::Csv, "a.csv", 2, "打车", -2350),
            bill(BillSource::Csv, "a.csv", 3, "超市", -3200), // in-batch repeat
        ];
        let existing = vec![bill(BillSource::Csv, "old.csv", 1, "打车", -2350)];
        let total = new_bills.len();

        let outcome = deduplicate_bills(new_bills, &existing);
        assert_eq!(outcome.unique_count() + outcome.duplicate_count(), total);
        assert_eq!(outcome.unique_count(), 1);
        assert_eq!(outcome.unique[0].description, "超市");

        let hashes: HashSet<String> = outcome.unique.iter().map(transaction_hash).collect();
        assert_eq!(hashes.len(), outcome.unique.len());
    }

    #[test]
    fn same_event_from_two_files_dedupes_to_one() {
        let new_bills = vec![
            bill(BillSource::Alipay, "alipay.csv", 5, "外卖订单", -5050),
            bill(BillSource::Wechat, "wechat.csv", 8, "外卖订单", -5050),
        ];
        let outcome = deduplicate_bills(new_bills, &[]);
        assert_eq!(outcome.unique_count(), 1);
        assert_eq!(outcome.duplicate_count(), 1);
    }

    #[test]
    fn groups_keep_only_actual_repeats() {
        let bills = vec![
            bill(BillSource::Csv, "a.csv", 1, "超市", -3200),
            bill(BillSource::Csv, "b.csv", 2, "超市", -3200),
            bill(BillSource::Csv, "a.csv", 3, "打车", -2350),
        ];
        let groups = find_duplicate_groups(&bills);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.values().next().unwrap().len(), 2);
    }

    #[test]
    fn report_rounds_the_rate_and_caps_samples() {
        let mut bills = vec![bill(BillSource::Csv, "a.csv", 0, "基准", -100)];
        for row in 1..=7 {
            bills.push(bill(BillSource::Csv, "a.csv", row, "重复", -200));
        }
        let outcome = remove_duplicates_within_batch(bills);
        let report = dedup_report(&outcome);
        assert_eq!(report.total_new, 8);
        assert_eq!(report.unique_count, 2);
        assert_eq!(report.duplicate_count, 6);
        assert_eq!(report.duplicate_rate, 75.0);
        assert_eq!(report.samples.len(), 5);
        assert!(report.samples[0].contains("重复"));
    }
}
