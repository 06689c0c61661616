//! Error types for sheet-query.
//!
//! Every failure of the query pipeline is terminal for the current operation.
//! Variants follow the stages of the pipeline so the front end can tell the
//! user whether to fix their input, their database settings, or their SQL.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Database '{name}' is not configured")]
    DatabaseNotFound { name: String },

    #[error("Invalid input: {message}")]
    Input { message: String },

    #[error("Query execution failed{}: {message}", chunk_label(.chunk))]
    Execution {
        message: String,
        /// Driver error code, e.g. "ORA-00942" or a SQLSTATE.
        code: Option<String>,
        /// Zero-based index of the chunk that failed, when known.
        chunk: Option<usize>,
        suggestion: String,
    },

    #[error("Export failed: {message}")]
    Export { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a database not found error.
    pub fn database_not_found(name: impl Into<String>) -> Self {
        Self::DatabaseNotFound { name: name.into() }
    }

    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Create an execution error with a helpful suggestion.
    pub fn execution(
        message: impl Into<String>,
        code: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            code,
            chunk: None,
            suggestion: suggestion.into(),
        }
    }

    /// Create an export error.
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach the failing chunk index to an execution error.
    ///
    /// Other variants are returned unchanged.
    pub fn at_chunk(self, index: usize) -> Self {
        match self {
            Self::Execution {
                message,
                code,
                suggestion,
                ..
            } => Self::Execution {
                message,
                code,
                chunk: Some(index),
                suggestion,
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Execution { suggestion, .. } => Some(suggestion),
            Self::DatabaseNotFound { .. } => Some("Pick one of the configured databases"),
            Self::Configuration { .. } => {
                Some("Fill in user, password, host, service name and port for the database")
            }
            _ => None,
        }
    }

    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::DatabaseNotFound { .. } => "database_not_found",
            Self::Input { .. } => "input_error",
            Self::Execution { .. } => "execution_error",
            Self::Export { .. } => "export_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } | Self::Input { .. } => StatusCode::BAD_REQUEST,
            Self::DatabaseNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Execution { .. } => StatusCode::BAD_GATEWAY,
            Self::Export { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert sqlx errors to AppError.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => AppError::execution(
                msg.to_string(),
                None,
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                AppError::execution(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::Io(io_err) => AppError::execution(
                format!("I/O error: {}", io_err),
                None,
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => AppError::execution(
                format!("TLS error: {}", tls_err),
                None,
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => AppError::execution(
                format!("Protocol error: {}", msg),
                None,
                "Check database server compatibility",
            ),
            sqlx::Error::PoolTimedOut => AppError::execution(
                "Timed out while connecting",
                None,
                "Check that the database host is reachable",
            ),
            sqlx::Error::ColumnDecode { index, source } => AppError::execution(
                format!("Failed to decode column {}: {}", index, source),
                None,
                "Cast the column to a text or numeric type in the query",
            ),
            sqlx::Error::Decode(source) => AppError::execution(
                format!("Decode error: {}", source),
                None,
                "Cast the column to a text or numeric type in the query",
            ),
            _ => AppError::execution(
                format!("Database error: {}", err),
                None,
                "Check the database connection and query",
            ),
        }
    }
}

/// Convert Oracle client errors to AppError.
impl From<oracle::Error> for AppError {
    fn from(err: oracle::Error) -> Self {
        let message = err.to_string();
        let code = oracle_error_code(&err);
        let suggestion = match code.as_deref() {
            Some("ORA-01017") => "Check the user name and password",
            Some("ORA-12154") | Some("ORA-12514") | Some("ORA-12541") => {
                "Check the host, port and service name"
            }
            Some("ORA-01795") => "Lower the chunk size; Oracle allows at most 1000 IN-list items",
            Some("DPI-1047") => "Install the Oracle Instant Client or set ORACLE_CLIENT_LIB_DIR",
            _ => "Check the SQL syntax and referenced objects",
        };
        AppError::execution(message, code, suggestion)
    }
}

impl From<calamine::XlsxError> for AppError {
    fn from(err: calamine::XlsxError) -> Self {
        AppError::input(format!("Could not read the uploaded workbook: {}", err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        AppError::export(err.to_string())
    }
}

fn chunk_label(chunk: &Option<usize>) -> String {
    chunk
        .map(|c| format!(" on chunk {}", c + 1))
        .unwrap_or_default()
}

/// `ORA-nnnnn` for server errors, `DPI-nnnn` for client library errors.
fn oracle_error_code(err: &oracle::Error) -> Option<String> {
    err.oci_code()
        .map(|code| format!("ORA-{:05}", code))
        .or_else(|| err.dpi_code().map(|code| format!("DPI-{:04}", code)))
}

/// Result type alias for pipeline operations.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                suggestion: self.suggestion(),
            },
        };
        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":{"code":"internal_error","message":"Request failed"}}"#.to_string()
        });

        (status, [(header::CONTENT_TYPE, "application/json")], json).into_response()
    }
}
