use std::path::Path;

use calamine::{open_workbook_auto, Reader};

use crate::error::BillError;

pub fn trim_cell(text: &str) -> String {
    text.trim()
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

pub fn row_get(row: &[String], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i).cloned())
        .map(|s| trim_cell(&s))
        .unwrap_or_default()
}

pub fn row_is_empty(row: &[String]) -> bool {
    row.iter().all(|c| trim_cell(c).is_empty())
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>, BillError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for rec in reader.records() {
        let rec = rec?;
        rows.push(rec.iter().map(trim_cell).collect());
    }
    Ok(rows)
}

fn read_xlsx_rows(path: &Path) -> Result<Vec<Vec<String>>, BillError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| BillError::Workbook(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_owned();
    let first_sheet = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| BillError::Workbook("工作簿中未找到工作表".to_string()))?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| BillError::Workbook(e.to_string()))?;

    let rows = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| trim_cell(&cell.to_string()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    Ok(rows)
}

/// Decodes a spreadsheet-like file into trimmed text rows. Quoted-field CSV
/// semantics come from the reader; Excel files contribute their first
/// worksheet.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, BillError> {
    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match suffix.as_str() {
        "csv" => read_csv_rows(path),
        "xlsx" | "xls" => read_xlsx_rows(path),
        _ => Err(BillError::UnsupportedFormat(suffix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn create_temp_path(prefix: &str, ext: &str) -> PathBuf {
        let unique = format!("{prefix}_{}_{}.{}", std::process::id(), Uuid::new_v4(), ext);
        std::env::temp_dir().join(unique)
    }

    #[test]
    fn reads_quoted_csv_cells() {
        let path = create_temp_path("billbean_tabular", "csv");
        fs::write(&path, "a,\"b, with comma\",c\n1,\"he said \"\"hi\"\"\",3\n")
            .expect("write temp csv");

        let rows = read_rows(&path).expect("read csv rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "b, with comma");
        assert_eq!(rows[1][1], "he said \"hi\"");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rejects_unknown_extension() {
        let path = create_temp_path("billbean_tabular", "pdf");
        fs::write(&path, "whatever").expect("write temp file");
        assert!(matches!(
            read_rows(&path),
            Err(BillError::UnsupportedFormat(_))
        ));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn strips_bom_and_whitespace() {
        let path = create_temp_path("billbean_tabular", "csv");
        fs::write(&path, "\u{feff}交易时间 , 金额\n").expect("write temp csv");
        let rows = read_rows(&path).expect("read csv rows");
        assert_eq!(rows[0], vec!["交易时间".to_string(), "金额".to_string()]);
        let _ = fs::remove_file(&path);
    }
}
