//! One-shot transport: read the workbook and SQL from disk, write the results, exit.

use crate::error::{AppError, AppResult};
use crate::service::QueryService;
use crate::transport::Transport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runs a single query from files on disk.
pub struct BatchTransport {
    service: Arc<QueryService>,
    database: String,
    input: PathBuf,
    query_file: PathBuf,
    output: PathBuf,
}

impl BatchTransport {
    pub fn new(
        service: Arc<QueryService>,
        database: impl Into<String>,
        input: impl Into<PathBuf>,
        query_file: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            database: database.into(),
            input: input.into(),
            query_file: query_file.into(),
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl Transport for BatchTransport {
    async fn run(&self) -> AppResult<()> {
        let upload = read_file(&self.input).await?;
        let sql = String::from_utf8(read_file(&self.query_file).await?).map_err(|_| {
            AppError::input(format!("{} is not valid UTF-8", self.query_file.display()))
        })?;

        let report = self.service.run(&self.database, &sql, &upload).await?;

        tokio::fs::write(&self.output, &report.bytes)
            .await
            .map_err(|e| {
                AppError::export(format!("Failed to write {}: {}", self.output.display(), e))
            })?;

        info!(
            output = %self.output.display(),
            keys = report.key_count,
            rows = report.row_count,
            chunks = report.chunk_count,
            execution_time_ms = report.execution_time_ms,
            "Results written"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "run"
    }
}

async fn read_file(path: &Path) -> AppResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| AppError::input(format!("Failed to read {}: {}", path.display(), e)))
}
