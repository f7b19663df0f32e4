use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::alipay_import::parse_alipay_file;
use crate::anomaly::{
    category_stats, detect_budget_overruns, detect_outliers, OutlierConfig, OutlierPolicy,
};
use crate::beancount::{generate_beancount, GeneratorOptions};
use crate::categorize::{account_category, smart_categorize, BillCategorizer};
use crate::column_map::{ColumnRecognizer, MappingCache};
use crate::csv_import::parse_csv_file;
use crate::dedup::{dedup_report, deduplicate_bills, DedupReport};
use crate::error::BillError;
use crate::model::{Anomaly, BillSource, CancelFlag, DateParsePolicy, ParseOutcome, ParsedBill};
use crate::rules::AccountMapper;
use crate::universal_import::parse_universal_file;
use crate::validate::{sanitize_bills, validate_bills};
use crate::wechat_import::parse_wechat_file;

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Declared origin; `Auto` defers to filename inference.
    pub source: BillSource,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, source: BillSource) -> SourceFile {
        SourceFile {
            path: path.into(),
            source,
        }
    }

    fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    fn resolved_source(&self) -> BillSource {
        match self.source {
            BillSource::Auto => BillSource::infer_from_filename(self.file_name()),
            declared => declared,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub date_policy: DateParsePolicy,
    pub outlier_policy: OutlierPolicy,
    pub outlier_config: OutlierConfig,
    /// Budget limits in cents, keyed like bill categories.
    pub budgets_cents: HashMap<String, i64>,
    pub generator: GeneratorOptions,
    /// Bypass mapping-cache reads for recognizer-assisted files.
    pub force_reidentify: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            date_policy: DateParsePolicy::default(),
            outlier_policy: OutlierPolicy::HighOnly,
            outlier_config: OutlierConfig::default(),
            budgets_cents: HashMap::new(),
            generator: GeneratorOptions::default(),
            force_reidentify: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversionResult {
    pub beancount_content: String,
    pub bill_count: usize,
    /// Structural count of generated transactions, not a text scan.
    pub transaction_count: usize,
    pub sources: Vec<String>,
    pub accounts_used: Vec<String>,
    pub warnings: Vec<String>,
    pub dedup_report: DedupReport,
    pub anomalies: Vec<Anomaly>,
}

impl ConversionResult {
    fn empty_with_warnings(warnings: Vec<String>, report: DedupReport) -> ConversionResult {
        ConversionResult {
            beancount_content: String::new(),
            bill_count: 0,
            transaction_count: 0,
            sources: Vec::new(),
            accounts_used: Vec::new(),
            warnings,
            dedup_report: report,
            anomalies: Vec::new(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_one(
    path: &Path,
    source: BillSource,
    cache: &mut dyn MappingCache,
    recognizer: Option<&dyn ColumnRecognizer>,
    force_reidentify: bool,
    cancel: &CancelFlag,
    policy: DateParsePolicy,
) -> Result<ParseOutcome, BillError> {
    match source {
        BillSource::Alipay => parse_alipay_file(path, policy),
        BillSource::Wechat => parse_wechat_file(path, policy),
        BillSource::Bank | BillSource::Csv => match recognizer {
            Some(recognizer) => parse_universal_file(
                path,
                source,
                cache,
                recognizer,
                force_reidentify,
                cancel,
                policy,
            ),
            None => parse_csv_file(path, source, policy),
        },
        BillSource::Auto => parse_csv_file(path, source, policy),
    }
}

/// Converts a batch of export files into one Beancount ledger.
///
/// Per-file failures become warnings and the batch continues; only
/// cancellation aborts. The stages are: parse per file, validate + sanitize,
/// dedup against history, categorize, anomaly scan, generate.
#[allow(clippy::too_many_arguments)]
pub fn convert_files(
    files: &[SourceFile],
    existing: &[ParsedBill],
    mapper: &AccountMapper,
    cache: &mut dyn MappingCache,
    recognizer: Option<&dyn ColumnRecognizer>,
    categorizer: Option<&dyn BillCategorizer>,
    cancel: &CancelFlag,
    options: &ConvertOptions,
) -> Result<ConversionResult, BillError> {
    let mut bills: Vec<ParsedBill> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut sources: Vec<String> = Vec::new();

    for file in files {
        if cancel.is_cancelled() {
            return Err(BillError::Cancelled);
        }
        let source = file.resolved_source();
        let name = file.file_name();
        match parse_one(
            &file.path,
            source,
            cache,
            recognizer,
            options.force_reidentify,
            cancel,
            options.date_policy,
        ) {
            Ok(outcome) => {
                if outcome.skipped_rows > 0 {
                    warnings.push(format!(
                        "文件 {name}: 跳过 {} 行无法解析的数据",
                        outcome.skipped_rows
                    ));
                    for err in &outcome.row_errors {
                        warnings.push(format!("文件 {name}: {err}"));
                    }
                }
                if !outcome.bills.is_empty() && !sources.contains(&source.tag().to_string()) {
                    sources.push(source.tag().to_string());
                }
                bills.extend(outcome.bills);
            }
            Err(err) => {
                log::warn!("文件 {name} 解析失败: {err}");
                warnings.push(format!("文件 {name} 解析失败: {err}"));
            }
        }
    }

    if bills.is_empty() {
        warnings.push("未从所选文件中解析到任何交易".to_string());
        return Ok(ConversionResult::empty_with_warnings(
            warnings,
            DedupReport::default(),
        ));
    }

    for issue in validate_bills(&bills) {
        warnings.push(issue.message);
    }
    let (valid, dropped) = sanitize_bills(bills);
    if !dropped.is_empty() {
        warnings.push(format!("{} 条账单未通过校验，已剔除", dropped.len()));
    }

    let outcome = deduplicate_bills(valid, existing);
    let report = dedup_report(&outcome);
    if outcome.unique.is_empty() {
        // Distinct from "zero valid records": everything was already imported.
        warnings.push(format!(
            "所有 {} 条交易均为重复导入，没有新增内容",
            report.duplicate_count
        ));
        let mut result = ConversionResult::empty_with_warnings(warnings, report);
        result.sources = sources;
        return Ok(result);
    }
    let mut unique = outcome.unique;

    for bill in &mut unique {
        let decision = smart_categorize(
            mapper,
            categorizer,
            &bill.description,
            bill.amount_cents,
            cancel,
        );
        bill.category = account_category(&decision.account).map(str::to_string);
    }

    let stats = category_stats(&unique);
    let mut anomalies = detect_outliers(
        &unique,
        &stats,
        options.outlier_policy,
        &options.outlier_config,
    );
    if !options.budgets_cents.is_empty() {
        let spent: HashMap<String, i64> = stats
            .values()
            .map(|s| (s.category.clone(), s.total_cents))
            .collect();
        anomalies.extend(detect_budget_overruns(&spent, &options.budgets_cents));
    }

    let ledger = generate_beancount(&unique, mapper, &options.generator);
    let mut accounts_used: Vec<String> = ledger
        .transactions
        .iter()
        .flat_map(|tx| tx.postings.iter().map(|p| p.account.as_str().to_string()))
        .collect();
    accounts_used.sort();
    accounts_used.dedup();

    Ok(ConversionResult {
        beancount_content: ledger.content,
        bill_count: unique.len(),
        transaction_count: ledger.transactions.len(),
        sources,
        accounts_used,
        warnings,
        dedup_report: report,
        anomalies,
    })
}
