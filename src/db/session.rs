//! Single-connection database sessions.
//!
//! Each executor invocation opens exactly one session and reuses it for every
//! chunk. Sessions are never pooled or shared between invocations.

use crate::db::oracle_client;
use crate::db::types::RowValues;
use crate::error::{AppError, AppResult};
use crate::models::{ConnectionDescriptor, DatabaseType, ResultSet};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Column, ConnectOptions, Connection, Executor};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// A connection that can run the rendered SQL of one chunk.
///
/// The executor is generic over this trait so the chunking logic does not
/// depend on a particular driver.
pub trait QuerySession: Send {
    /// Execute one statement and fetch all rows with their column names.
    fn fetch_all(&mut self, sql: &str) -> impl Future<Output = AppResult<ResultSet>> + Send;

    /// Close the session.
    fn close(self) -> impl Future<Output = AppResult<()>> + Send
    where
        Self: Sized;
}

/// Options that apply to every new session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub connect_timeout: Option<Duration>,
    /// Directory holding the Oracle client libraries, if not on the loader path.
    pub oracle_client_lib_dir: Option<PathBuf>,
    /// Let SQLite create a missing database file (used by tests and demos).
    pub sqlite_create_if_missing: bool,
}

/// Database-specific connection (one per invocation).
pub enum DbSession {
    /// The Oracle client is blocking; the connection is moved onto the
    /// blocking pool for every call and handed back afterwards.
    Oracle(Option<::oracle::Connection>),
    Postgres(PgConnection),
    MySql(MySqlConnection),
    SQLite(SqliteConnection),
}

impl std::fmt::Debug for DbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DbSession").field(&self.db_type()).finish()
    }
}

impl DbSession {
    /// Open a session for the descriptor.
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        options: &SessionOptions,
    ) -> AppResult<Self> {
        debug!(
            db_type = %descriptor.kind,
            endpoint = %descriptor.endpoint(),
            "Opening database session"
        );

        let connect = Self::open(descriptor, options);
        match options.connect_timeout {
            Some(limit) => timeout(limit, connect).await.map_err(|_| {
                AppError::execution(
                    format!("Connecting to {} timed out after {}s", descriptor.endpoint(), limit.as_secs()),
                    None,
                    "Check that the database host is reachable",
                )
            })?,
            None => connect.await,
        }
    }

    async fn open(descriptor: &ConnectionDescriptor, options: &SessionOptions) -> AppResult<Self> {
        match descriptor.kind {
            DatabaseType::Oracle => {
                let lib_dir = options.oracle_client_lib_dir.clone();
                let descriptor = descriptor.clone();
                let conn = tokio::task::spawn_blocking(move || {
                    oracle_client::init_oracle_client(lib_dir.as_deref())?;
                    oracle_client::connect(&descriptor)
                })
                .await
                .map_err(join_error)??;
                Ok(DbSession::Oracle(Some(conn)))
            }
            DatabaseType::Postgres => {
                let opts = PgConnectOptions::new()
                    .host(&descriptor.host)
                    .port(descriptor.port)
                    .username(&descriptor.user)
                    .password(&descriptor.password)
                    .database(&descriptor.service_name);
                Ok(DbSession::Postgres(opts.connect().await?))
            }
            DatabaseType::MySql => {
                let opts = MySqlConnectOptions::new()
                    .host(&descriptor.host)
                    .port(descriptor.port)
                    .username(&descriptor.user)
                    .password(&descriptor.password)
                    .database(&descriptor.service_name);
                Ok(DbSession::MySql(opts.connect().await?))
            }
            DatabaseType::SQLite => {
                let opts = SqliteConnectOptions::new()
                    .filename(&descriptor.service_name)
                    .create_if_missing(options.sqlite_create_if_missing)
                    .read_only(!options.sqlite_create_if_missing);
                Ok(DbSession::SQLite(opts.connect().await?))
            }
        }
    }

    /// Get the database type for this session.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbSession::Oracle(_) => DatabaseType::Oracle,
            DbSession::Postgres(_) => DatabaseType::Postgres,
            DbSession::MySql(_) => DatabaseType::MySql,
            DbSession::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Run a statement that returns no rows (setup scripts, tests).
    pub async fn execute(&mut self, sql: &str) -> AppResult<u64> {
        match self {
            DbSession::Oracle(slot) => {
                let conn = slot.take().ok_or_else(closed_error)?;
                let sql = sql.to_string();
                let (conn, result) = tokio::task::spawn_blocking(move || {
                    let result = conn
                        .execute(&sql, &[])
                        .and_then(|stmt| stmt.row_count())
                        .map_err(AppError::from);
                    (conn, result)
                })
                .await
                .map_err(join_error)?;
                *slot = Some(conn);
                result
            }
            DbSession::Postgres(conn) => Ok(conn.execute(sql).await?.rows_affected()),
            DbSession::MySql(conn) => Ok(conn.execute(sql).await?.rows_affected()),
            DbSession::SQLite(conn) => Ok(conn.execute(sql).await?.rows_affected()),
        }
    }
}

impl QuerySession for DbSession {
    async fn fetch_all(&mut self, sql: &str) -> AppResult<ResultSet> {
        match self {
            DbSession::Oracle(slot) => {
                let conn = slot.take().ok_or_else(closed_error)?;
                let sql = sql.to_string();
                let (conn, result) = tokio::task::spawn_blocking(move || {
                    let result = oracle_client::fetch_all(&conn, &sql);
                    (conn, result)
                })
                .await
                .map_err(join_error)?;
                *slot = Some(conn);
                result
            }
            DbSession::Postgres(conn) => {
                let rows = (&mut *conn).fetch_all(sql).await?;
                if rows.is_empty() {
                    return Ok(schema_only((&mut *conn).describe(sql).await?.columns()));
                }
                collect(rows)
            }
            DbSession::MySql(conn) => {
                let rows = (&mut *conn).fetch_all(sql).await?;
                if rows.is_empty() {
                    return Ok(schema_only((&mut *conn).describe(sql).await?.columns()));
                }
                collect(rows)
            }
            DbSession::SQLite(conn) => {
                let rows = (&mut *conn).fetch_all(sql).await?;
                if rows.is_empty() {
                    return Ok(schema_only((&mut *conn).describe(sql).await?.columns()));
                }
                collect(rows)
            }
        }
    }

    async fn close(self) -> AppResult<()> {
        match self {
            DbSession::Oracle(Some(conn)) => tokio::task::spawn_blocking(move || conn.close())
                .await
                .map_err(join_error)?
                .map_err(AppError::from),
            DbSession::Oracle(None) => Ok(()),
            DbSession::Postgres(conn) => Ok(conn.close().await?),
            DbSession::MySql(conn) => Ok(conn.close().await?),
            DbSession::SQLite(conn) => Ok(conn.close().await?),
        }
    }
}

/// Build a per-chunk result from sqlx rows.
fn collect<R: RowValues>(rows: Vec<R>) -> AppResult<ResultSet> {
    let Some(first) = rows.first() else {
        return Ok(ResultSet::default());
    };
    let mut result = ResultSet::with_columns(first.column_names());
    result.rows = rows.iter().map(RowValues::to_values).collect();
    Ok(result)
}

/// Column names of a statement that matched nothing, taken from its description.
fn schema_only<C: Column>(columns: &[C]) -> ResultSet {
    ResultSet::with_columns(columns.iter().map(|c| c.name().to_string()).collect())
}

fn join_error(err: tokio::task::JoinError) -> AppError {
    AppError::internal(format!("Database task failed: {}", err))
}

fn closed_error() -> AppError {
    AppError::internal("Database session was lost after an earlier failure")
}
