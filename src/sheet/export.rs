//! Serialize a result set into a single-sheet workbook.

use crate::error::{AppError, AppResult};
use crate::models::ResultSet;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde_json::Value as JsonValue;

/// File name offered for download.
pub const RESULT_FILE_NAME: &str = "query_results.xlsx";

pub const RESULT_SHEET_NAME: &str = "Sheet1";

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Excel's hard row limit, header included.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

/// Write `result` to an in-memory `.xlsx`: a bold header row of column names
/// followed by one row per result row. Nulls become blank cells.
pub fn write_result_set(result: &ResultSet, sheet_name: &str) -> AppResult<Vec<u8>> {
    if result.columns.len() > MAX_COLUMNS {
        return Err(AppError::export(format!(
            "{} columns exceed the worksheet limit of {}",
            result.columns.len(),
            MAX_COLUMNS
        )));
    }
    if result.row_count() + 1 > MAX_ROWS {
        return Err(AppError::export(format!(
            "{} rows exceed the worksheet limit of {}",
            result.row_count(),
            MAX_ROWS - 1
        )));
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    let bold = Format::new().set_bold();
    for (col, name) in result.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &bold)?;
    }

    for (index, row) in result.rows.iter().enumerate() {
        let row_num = (index + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            write_value(worksheet, row_num, col as u16, value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_value(ws: &mut Worksheet, row: u32, col: u16, value: &JsonValue) -> AppResult<()> {
    match value {
        JsonValue::Null => {}
        JsonValue::Bool(b) => {
            ws.write_boolean(row, col, *b)?;
        }
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) => {
                ws.write_number(row, col, f)?;
            }
            None => {
                ws.write_string(row, col, n.to_string())?;
            }
        },
        JsonValue::String(s) => {
            ws.write_string(row, col, s)?;
        }
        other => {
            ws.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}
