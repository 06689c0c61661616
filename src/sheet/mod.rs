//! Spreadsheet ingestion and export.

pub mod export;
pub mod ingest;

pub use export::{RESULT_FILE_NAME, RESULT_SHEET_NAME, XLSX_CONTENT_TYPE, write_result_set};
pub use ingest::read_key_list;
