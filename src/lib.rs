//! billbean converts personal-finance export files (Alipay, WeChat Pay,
//! generic bank CSV/Excel) into Beancount double-entry ledger text.
//!
//! The pipeline: tabular decode → header/column mapping → source-specific
//! parsing → payment-method resolution → validation → deduplication →
//! rule/AI categorization → anomaly scan → Beancount generation.

pub mod alipay_import;
pub mod amount;
pub mod anomaly;
pub mod beancount;
pub mod categorize;
pub mod column_map;
pub mod csv_import;
pub mod dedup;
pub mod error;
pub mod model;
pub mod payment_method;
pub mod pipeline;
pub mod rules;
pub mod tabular;
pub mod universal_import;
pub mod validate;
pub mod wechat_import;

pub use anomaly::{OutlierConfig, OutlierPolicy};
pub use beancount::{generate_beancount, GeneratedLedger, GeneratorOptions, Transaction};
pub use categorize::{smart_categorize, BillCategorizer, STANDARD_CATEGORIES};
pub use column_map::{ColumnMapping, ColumnRecognizer, MappingCache, MemoryMappingCache};
pub use dedup::{deduplicate_bills, transaction_hash, DedupReport};
pub use error::{BillError, Result};
pub use model::{
    Anomaly, BillSource, CancelFlag, DateParsePolicy, ParseOutcome, ParsedBill, PaymentKind,
    PaymentMethodInfo, Severity,
};
pub use pipeline::{convert_files, ConversionResult, ConvertOptions, SourceFile};
pub use rules::{Account, AccountMapper, CategoryRule, RulePattern, RuleSet};
