use std::path::Path;

use crate::column_map::{
    find_header_row_heuristic, resolve_mapping_with_recognizer, ColumnRecognizer, MappingCache,
};
use crate::csv_import::parse_with_mapping;
use crate::error::BillError;
use crate::model::{BillSource, CancelFlag, DateParsePolicy, ParseOutcome};
use crate::tabular::read_rows;

/// Recognizer-assisted parser for layouts no static table covers. The header
/// row is still located heuristically; column roles come from the mapping
/// cache or the external recognizer, degrading to keyword resolution when
/// the service is unavailable.
#[allow(clippy::too_many_arguments)]
pub fn parse_universal_rows(
    rows: &[Vec<String>],
    file_name: &str,
    source: BillSource,
    cache: &mut dyn MappingCache,
    recognizer: &dyn ColumnRecognizer,
    force_reidentify: bool,
    cancel: &CancelFlag,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    let header_idx = find_header_row_heuristic(rows)
        .ok_or_else(|| BillError::HeaderNotFound("未识别到表头行".to_string()))?;
    let recognized = resolve_mapping_with_recognizer(
        cache,
        recognizer,
        source,
        &rows[header_idx],
        force_reidentify,
        cancel,
    )?;
    parse_with_mapping(
        rows,
        header_idx,
        &recognized.mapping,
        file_name,
        source,
        policy,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn parse_universal_file(
    path: &Path,
    source: BillSource,
    cache: &mut dyn MappingCache,
    recognizer: &dyn ColumnRecognizer,
    force_reidentify: bool,
    cancel: &CancelFlag,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    let rows = read_rows(path)?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    parse_universal_rows(
        &rows,
        file_name,
        source,
        cache,
        recognizer,
        force_reidentify,
        cancel,
        policy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_map::{ColumnMapping, MemoryMappingCache, RecognizedMapping};
    use std::cell::Cell;

    fn rows(text: &str) -> Vec<Vec<String>> {
        text.lines()
            .map(|l| l.split(',').map(|c| c.to_string()).collect())
            .collect()
    }

    struct FixedRecognizer {
        calls: Cell<usize>,
        mapping: Option<ColumnMapping>,
    }

    impl ColumnRecognizer for FixedRecognizer {
        fn recognize(
            &self,
            _header: &[String],
            _source: BillSource,
        ) -> Result<RecognizedMapping, String> {
            self.calls.set(self.calls.get() + 1);
            match self.mapping {
                Some(mapping) => Ok(RecognizedMapping {
                    mapping,
                    confidence: 0.95,
                }),
                None => Err("识别失败".to_string()),
            }
        }
    }

    fn odd_layout() -> Vec<Vec<String>> {
        // The amount header says 支出金额, which the recognizer understands
        // but which also resolves heuristically; the recognizer additionally
        // knows the last column is the direction.
        rows("\
对账单 2024
流水号,记账日期,商户,支出金额,资金方向
1001,2024-04-01,美团外卖,50.50,支出
1002,2024-04-02,工资入账,8000.00,收入")
    }

    #[test]
    fn recognizer_mapping_drives_the_row_loop() {
        let data = odd_layout();
        let mut cache = MemoryMappingCache::new();
        let recognizer = FixedRecognizer {
            calls: Cell::new(0),
            mapping: Some(ColumnMapping {
                time: 1,
                amount: 3,
                description: Some(2),
                direction: Some(4),
                counterparty: None,
            }),
        };
        let cancel = CancelFlag::new();

        let outcome = parse_universal_rows(
            &data,
            "custom.csv",
            BillSource::Bank,
            &mut cache,
            &recognizer,
            false,
            &cancel,
            DateParsePolicy::Now,
        )
        .unwrap();

        assert_eq!(outcome.bills.len(), 1);
        assert_eq!(outcome.bills[0].amount_cents, -5050);
        assert_eq!(outcome.bills[0].description, "美团外卖");

        // Second parse of the same layout hits the cache.
        parse_universal_rows(
            &data,
            "custom.csv",
            BillSource::Bank,
            &mut cache,
            &recognizer,
            false,
            &cancel,
            DateParsePolicy::Now,
        )
        .unwrap();
        assert_eq!(recognizer.calls.get(), 1);
    }

    #[test]
    fn recognizer_failure_degrades_to_heuristics() {
        let data = odd_layout();
        let mut cache = MemoryMappingCache::new();
        let recognizer = FixedRecognizer {
            calls: Cell::new(0),
            mapping: None,
        };
        let cancel = CancelFlag::new();

        let outcome = parse_universal_rows(
            &data,
            "custom.csv",
            BillSource::Bank,
            &mut cache,
            &recognizer,
            false,
            &cancel,
            DateParsePolicy::Now,
        )
        .unwrap();

        assert_eq!(recognizer.calls.get(), 2);
        assert_eq!(outcome.bills.len(), 1);
        assert_eq!(outcome.bills[0].amount_cents, -5050);
    }

    #[test]
    fn missing_header_is_reported() {
        let data = rows("a,b\n1,2");
        let mut cache = MemoryMappingCache::new();
        let recognizer = FixedRecognizer {
            calls: Cell::new(0),
            mapping: None,
        };
        assert!(matches!(
            parse_universal_rows(
                &data,
                "x.csv",
                BillSource::Csv,
                &mut cache,
                &recognizer,
                false,
                &CancelFlag::new(),
                DateParsePolicy::Now,
            ),
            Err(BillError::HeaderNotFound(_))
        ));
    }
}
