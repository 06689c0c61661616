//! The upload-to-download pipeline shared by every transport.

use crate::db::{ChunkedQueryExecutor, DatabaseRegistry};
use crate::error::AppResult;
use crate::models::{KEY_COLUMN, QueryTemplate};
use crate::sheet::{RESULT_FILE_NAME, RESULT_SHEET_NAME, XLSX_CONTENT_TYPE, read_key_list, write_result_set};
use humansize::{DECIMAL, format_size};
use serde::Serialize;
use tracing::info;

/// A finished query, ready for download.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub file_name: &'static str,
    pub content_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub row_count: usize,
    pub chunk_count: usize,
    pub key_count: usize,
    pub execution_time_ms: u64,
}

/// Validates a request, runs the chunked query and exports the result.
#[derive(Debug, Clone)]
pub struct QueryService {
    registry: DatabaseRegistry,
    executor: ChunkedQueryExecutor,
    placeholder: String,
}

impl QueryService {
    pub fn new(
        registry: DatabaseRegistry,
        executor: ChunkedQueryExecutor,
        placeholder: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor,
            placeholder: placeholder.into(),
        }
    }

    pub fn registry(&self) -> &DatabaseRegistry {
        &self.registry
    }

    /// Run `sql` against `database` for every key in the uploaded workbook.
    ///
    /// Template, upload and database selection are all validated before a
    /// connection is opened.
    pub async fn run(&self, database: &str, sql: &str, upload: &[u8]) -> AppResult<QueryReport> {
        info!(
            database,
            upload_size = %format_size(upload.len(), DECIMAL),
            "Query requested"
        );

        let template = QueryTemplate::with_placeholder(sql, self.placeholder.as_str())?;
        let keys = read_key_list(upload, KEY_COLUMN)?;
        let descriptor = self.registry.descriptor(database).await?;

        let outcome = self.executor.execute(&descriptor, &template, &keys).await?;
        let bytes = write_result_set(&outcome.result, RESULT_SHEET_NAME)?;

        info!(
            database,
            keys = keys.len(),
            rows = outcome.result.row_count(),
            chunks = outcome.chunk_count,
            file_size = %format_size(bytes.len(), DECIMAL),
            "Query results exported"
        );

        Ok(QueryReport {
            file_name: RESULT_FILE_NAME,
            content_type: XLSX_CONTENT_TYPE,
            row_count: outcome.result.row_count(),
            chunk_count: outcome.chunk_count,
            key_count: keys.len(),
            execution_time_ms: outcome.execution_time_ms,
            bytes,
        })
    }
}
