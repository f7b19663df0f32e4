use std::io;
use thiserror::Error;

/// File-level and configuration-level failures. Row-level problems are
/// collected as message strings inside parse outcomes and never abort a file.
#[derive(Error, Debug)]
pub enum BillError {
    #[error("不支持的文件格式: .{0}（仅支持 .csv/.xlsx/.xls）")]
    UnsupportedFormat(String),

    #[error("未找到表头行: {0}")]
    HeaderNotFound(String),

    #[error("缺少必要列: {0}")]
    MissingRequiredColumn(String),

    #[error("读取文件失败: {0}")]
    Io(#[from] io::Error),

    #[error("读取工作簿失败: {0}")]
    Workbook(String),

    #[error("读取 CSV 失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("规则不合法: {0}")]
    InvalidRule(String),

    #[error("外部服务调用失败: {0}")]
    ServiceFailed(String),

    #[error("日期无法解析: {0}")]
    InvalidDate(String),

    #[error("操作已取消")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BillError>;
