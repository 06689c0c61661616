//! Read the key list from an uploaded workbook.

use crate::error::{AppError, AppResult};
use calamine::{Data, ExcelDateTime, Reader, Xlsx};
use std::io::Cursor;
use tracing::debug;

/// Read every value of `column` from the first worksheet of an `.xlsx` file.
///
/// The header is looked up in the first row of the used range. Empty cells
/// are skipped; all other cells are returned as strings in sheet order.
pub fn read_key_list(bytes: &[u8], column: &str) -> AppResult<Vec<String>> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::input("The uploaded workbook has no worksheet"))??;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| AppError::input("The uploaded worksheet is empty"))?;
    let index = header
        .iter()
        .position(|cell| matches!(cell, Data::String(s) if s == column))
        .ok_or_else(|| {
            AppError::input(format!(
                "The uploaded file must contain a '{}' column header",
                column
            ))
        })?;

    let mut keys = Vec::new();
    for (offset, row) in rows.enumerate() {
        let Some(cell) = row.get(index) else {
            continue;
        };
        match cell_text(cell) {
            Ok(Some(key)) => keys.push(key),
            Ok(None) => {}
            Err(detail) => {
                return Err(AppError::input(format!(
                    "Row {} of column '{}' holds an error value ({})",
                    offset + 2,
                    column,
                    detail
                )));
            }
        }
    }

    debug!(column, keys = keys.len(), "Read key list from workbook");
    Ok(keys)
}

/// Render a cell as key text. `Ok(None)` for blanks, `Err` for error cells.
fn cell_text(cell: &Data) -> Result<Option<String>, String> {
    let text = match cell {
        Data::Empty => return Ok(None),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => float_text(*f),
        Data::DateTime(dt) => date_text(dt),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => return Err(format!("{e:?}")),
        other => other.to_string(),
    };
    Ok((!text.is_empty()).then_some(text))
}

/// Dates print as `2024-01-02 00:00:00`; durations keep their serial value.
fn date_text(dt: &ExcelDateTime) -> String {
    match dt.as_datetime() {
        Some(value) if !dt.is_duration() => value.to_string(),
        _ => float_text(dt.as_f64()),
    }
}

/// Integral floats print without a fractional part (`12345.0` -> `12345`).
fn float_text(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}
