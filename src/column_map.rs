use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::BillError;
use crate::model::{BillSource, CancelFlag};
use crate::tabular::trim_cell;

/// Header scan never looks past this many leading rows.
pub const HEADER_SCAN_WINDOW: usize = 30;

const TIME_KEYWORDS: &[&str] = &[
    "交易时间",
    "交易日期",
    "记账日期",
    "交易创建时间",
    "时间",
    "日期",
    "date",
    "time",
];
const AMOUNT_KEYWORDS: &[&str] = &[
    "金额(元)",
    "金额（元）",
    "交易金额",
    "金额",
    "发生额",
    "amount",
];
const DESCRIPTION_KEYWORDS: &[&str] = &[
    "商品说明",
    "商品名称",
    "商品",
    "交易说明",
    "摘要",
    "备注",
    "描述",
    "description",
    "memo",
];
const DIRECTION_KEYWORDS: &[&str] = &["收/支", "收支", "借贷", "方向", "direction"];
const COUNTERPARTY_KEYWORDS: &[&str] = &[
    "交易对方",
    "对方户名",
    "对方",
    "商户名称",
    "counterparty",
    "payee",
];

/// Field-name alias table for one source-specific layout.
#[derive(Debug)]
pub struct AliasSpec {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
}

fn normalize_key(key: &str) -> String {
    trim_cell(key)
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Resolves `field -> column index` from a header row via alias lookup.
pub fn resolve_alias_mapping_from_row(
    row: &[String],
    specs: &[AliasSpec],
) -> HashMap<&'static str, usize> {
    let mut normalized: HashMap<String, usize> = HashMap::new();
    for (idx, cell) in row.iter().enumerate() {
        let key = normalize_key(cell);
        if !key.is_empty() {
            normalized.entry(key).or_insert(idx);
        }
    }

    let mut mapping = HashMap::new();
    for spec in specs {
        for alias in spec.aliases {
            let key = normalize_key(alias);
            if let Some(idx) = normalized.get(&key) {
                mapping.insert(spec.field, *idx);
                break;
            }
        }
    }
    mapping
}

/// Finds the first row (within the scan window) that resolves every required
/// field through the alias table.
pub fn find_alias_header_row(
    rows: &[Vec<String>],
    specs: &[AliasSpec],
    required: &[&str],
) -> Result<(usize, HashMap<&'static str, usize>), BillError> {
    'outer: for (idx, row) in rows.iter().take(HEADER_SCAN_WINDOW).enumerate() {
        let mapping = resolve_alias_mapping_from_row(row, specs);
        for req in required {
            if !mapping.contains_key(*req) {
                continue 'outer;
            }
        }
        return Ok((idx, mapping));
    }
    Err(BillError::HeaderNotFound(required.join(", ")))
}

/// Resolved correspondence between file columns and semantic roles.
/// Indices are zero-based into the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub time: usize,
    pub amount: usize,
    pub description: Option<usize>,
    pub direction: Option<usize>,
    pub counterparty: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecognizedMapping {
    pub mapping: ColumnMapping,
    pub confidence: f64,
}

fn normalize_header_cell(cell: &str) -> String {
    trim_cell(cell).to_lowercase()
}

fn find_role(header: &[String], keywords: &[&str]) -> Option<usize> {
    for kw in keywords {
        let kw = kw.to_lowercase();
        for (idx, cell) in header.iter().enumerate() {
            if normalize_header_cell(cell).contains(&kw) {
                return Some(idx);
            }
        }
    }
    None
}

/// Scans the first rows for one whose joined text contains every marker.
/// Static-marker alternative to the alias table, for callers that know a
/// literal header fragment of their layout.
pub fn find_marker_row(rows: &[Vec<String>], markers: &[&str]) -> Result<usize, BillError> {
    for (idx, row) in rows.iter().take(HEADER_SCAN_WINDOW).enumerate() {
        let line = row.join(" ");
        if markers.iter().all(|m| line.contains(m)) {
            return Ok(idx);
        }
    }
    Err(BillError::HeaderNotFound(markers.join(", ")))
}

/// Heuristic header scan: a row qualifies with at least three cells, one
/// time-keyword cell and one amount-keyword cell. First qualifying row wins.
pub fn find_header_row_heuristic(rows: &[Vec<String>]) -> Option<usize> {
    for (idx, row) in rows.iter().take(HEADER_SCAN_WINDOW).enumerate() {
        let non_empty = row.iter().filter(|c| !trim_cell(c).is_empty()).count();
        if non_empty < 3 {
            continue;
        }
        if find_role(row, TIME_KEYWORDS).is_some() && find_role(row, AMOUNT_KEYWORDS).is_some() {
            return Some(idx);
        }
    }
    None
}

/// Resolves semantic roles against a header row. Time and amount are
/// required; the remaining roles are tolerated as absent.
pub fn resolve_columns(header: &[String]) -> Result<ColumnMapping, BillError> {
    let time = find_role(header, TIME_KEYWORDS)
        .ok_or_else(|| BillError::MissingRequiredColumn("交易时间".to_string()))?;
    let amount = find_role(header, AMOUNT_KEYWORDS)
        .ok_or_else(|| BillError::MissingRequiredColumn("金额".to_string()))?;
    Ok(ColumnMapping {
        time,
        amount,
        description: find_role(header, DESCRIPTION_KEYWORDS),
        direction: find_role(header, DIRECTION_KEYWORDS),
        counterparty: find_role(header, COUNTERPARTY_KEYWORDS),
    })
}

/// Cache key half: lowercase-trimmed headers joined by `|`.
pub fn header_signature(header: &[String]) -> String {
    header
        .iter()
        .map(|c| normalize_header_cell(c))
        .collect::<Vec<_>>()
        .join("|")
}

/// Session-scoped store for recognized column mappings, keyed by
/// `(source, header-signature)`. Injectable so the host decides persistence.
pub trait MappingCache {
    fn get(&self, source: BillSource, signature: &str) -> Option<RecognizedMapping>;
    fn set(&mut self, source: BillSource, signature: &str, recognized: RecognizedMapping);
}

#[derive(Debug, Default)]
pub struct MemoryMappingCache {
    entries: HashMap<String, RecognizedMapping>,
}

impl MemoryMappingCache {
    pub fn new() -> MemoryMappingCache {
        MemoryMappingCache::default()
    }

    fn key(source: BillSource, signature: &str) -> String {
        format!("{}:{}", source.tag(), signature)
    }
}

impl MappingCache for MemoryMappingCache {
    fn get(&self, source: BillSource, signature: &str) -> Option<RecognizedMapping> {
        self.entries.get(&Self::key(source, signature)).copied()
    }

    fn set(&mut self, source: BillSource, signature: &str, recognized: RecognizedMapping) {
        self.entries
            .insert(Self::key(source, signature), recognized);
    }
}

/// External column-recognition service boundary. Implementations own
/// transport concerns; errors here are degradation signals, not fatal.
pub trait ColumnRecognizer {
    fn recognize(
        &self,
        headers: &[String],
        source: BillSource,
    ) -> Result<RecognizedMapping, String>;
}

/// Cache-first column resolution with retry-once-then-degrade. A forced
/// re-identify bypasses the cache read but still writes a fresh result.
/// When the recognizer keeps failing, the heuristic resolver is the fallback
/// and nothing is cached.
pub fn resolve_mapping_with_recognizer(
    cache: &mut dyn MappingCache,
    recognizer: &dyn ColumnRecognizer,
    source: BillSource,
    header: &[String],
    force_reidentify: bool,
    cancel: &CancelFlag,
) -> Result<RecognizedMapping, BillError> {
    let signature = header_signature(header);
    if !force_reidentify {
        if let Some(cached) = cache.get(source, &signature) {
            return Ok(cached);
        }
    }

    let mut last_err = String::new();
    for attempt in 0..2 {
        if cancel.is_cancelled() {
            return Err(BillError::Cancelled);
        }
        match recognizer.recognize(header, source) {
            Ok(recognized) => {
                cache.set(source, &signature, recognized);
                return Ok(recognized);
            }
            Err(err) => {
                log::warn!("列识别服务调用失败（第 {} 次）: {err}", attempt + 1);
                last_err = err;
            }
        }
    }

    log::warn!("列识别服务不可用，回退启发式识别: {last_err}");
    let mapping = resolve_columns(header)?;
    Ok(RecognizedMapping {
        mapping,
        confidence: 0.0,
    })
}
